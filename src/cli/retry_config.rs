//! Retry configuration for registry operations.
//!
//! Provides configurable attempt limits for the push and verify steps,
//! allowing users to tune retry behavior based on network conditions.

/// Configuration for retry behavior across registry operation types
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Max total push attempts
    pub push_attempts: u32,

    /// Max total verification attempts
    pub verify_attempts: u32,

    /// Base backoff between attempts, in seconds
    pub backoff_base_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            push_attempts: 3,    // Uploads hit transient registry errors most
            verify_attempts: 2,  // One follow-up covers listing propagation
            backoff_base_secs: 1,
        }
    }
}

impl RetryConfig {
    /// Parse a count from an environment variable with clamping to a maximum
    ///
    /// # Arguments
    /// * `var_name` - Environment variable name (e.g., "IMAGESHIP_RETRY_PUSH")
    /// * `default` - Default value if variable is not set or invalid
    /// * `max` - Maximum allowed value (values above this are clamped)
    fn parse_env(var_name: &str, default: u64, max: u64) -> u64 {
        std::env::var(var_name)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(|v| v.min(max)) // Clamp to max
            .unwrap_or(default)
    }

    /// Create config from environment variables with fallback to defaults
    pub fn from_env() -> Self {
        Self {
            push_attempts: Self::parse_env("IMAGESHIP_RETRY_PUSH", 3, 10) as u32,
            verify_attempts: Self::parse_env("IMAGESHIP_RETRY_VERIFY", 2, 10) as u32,
            backoff_base_secs: Self::parse_env("IMAGESHIP_BACKOFF_SECS", 1, 60),
        }
    }

    /// Validate attempt counts are reasonable
    pub fn validate(&self) -> Result<(), String> {
        if self.push_attempts == 0 {
            return Err("push_attempts must be at least 1".to_string());
        }
        if self.push_attempts > 10 {
            return Err(format!(
                "push_attempts too high: {} (max: 10)",
                self.push_attempts
            ));
        }
        if self.verify_attempts == 0 {
            return Err("verify_attempts must be at least 1".to_string());
        }
        if self.verify_attempts > 10 {
            return Err(format!(
                "verify_attempts too high: {} (max: 10)",
                self.verify_attempts
            ));
        }
        if self.backoff_base_secs > 60 {
            return Err(format!(
                "backoff_base_secs too high: {} (max: 60)",
                self.backoff_base_secs
            ));
        }
        Ok(())
    }
}
