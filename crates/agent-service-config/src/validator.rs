//! Configuration validation.

use url::Url;

use crate::error::ConfigError;
use crate::schema::{Config, MIN_JOB_TIMEOUT_MS, MIN_POLL_INTERVAL_MS};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Collapse into the first error, or the warnings when valid.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error.into()),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
    missing: bool,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            missing: false,
        }
    }

    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: "is required".to_string(),
            missing: true,
        }
    }
}

impl From<ValidationError> for ConfigError {
    fn from(error: ValidationError) -> Self {
        if error.missing {
            ConfigError::MissingField(error.path)
        } else {
            ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration without modifying it.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_queue(config, &mut result);
        Self::validate_worker(config, &mut result);

        result
    }

    /// Raise timing values below their floors, reporting each adjustment.
    pub fn normalize(config: &mut Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.worker.job_timeout_ms < MIN_JOB_TIMEOUT_MS {
            warnings.push(ValidationWarning::new(
                "worker.job_timeout_ms",
                format!(
                    "{}ms is very low, using minimum of {}ms",
                    config.worker.job_timeout_ms, MIN_JOB_TIMEOUT_MS
                ),
            ));
            config.worker.job_timeout_ms = MIN_JOB_TIMEOUT_MS;
        }

        if config.worker.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            warnings.push(ValidationWarning::new(
                "worker.poll_interval_ms",
                format!(
                    "{}ms is very low, using minimum of {}ms",
                    config.worker.poll_interval_ms, MIN_POLL_INTERVAL_MS
                ),
            ));
            config.worker.poll_interval_ms = MIN_POLL_INTERVAL_MS;
        }

        warnings
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new(
                "server.port",
                "must be a valid number between 1 and 65535",
            ));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::missing("server.host"));
        }
    }

    fn validate_queue(config: &Config, result: &mut ValidationResult) {
        let queue = &config.queue;

        if queue.redis_url.is_empty() {
            result.add_error(ValidationError::missing("queue.redis_url"));
        } else {
            Self::check_url(
                "queue.redis_url",
                &queue.redis_url,
                &["redis", "rediss", "unix", "redis+unix"],
                result,
            );
        }

        if queue.command_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "queue.command_timeout_ms",
                "must be greater than zero",
            ));
        }

        if queue.reconnect.max_attempts == 0 {
            result.add_warning(ValidationWarning::new(
                "queue.reconnect.max_attempts",
                "0 attempts means the queue starts directly in memory mode",
            ));
        }

        if queue.reconnect.base_delay_ms > queue.reconnect.max_delay_ms {
            result.add_warning(ValidationWarning::new(
                "queue.reconnect.base_delay_ms",
                "exceeds max_delay_ms; every retry will wait max_delay_ms",
            ));
        }
    }

    fn validate_worker(config: &Config, result: &mut ValidationResult) {
        let worker = &config.worker;

        if worker.hub_url.is_empty() {
            result.add_error(ValidationError::missing("worker.hub_url"));
        } else {
            Self::check_url("worker.hub_url", &worker.hub_url, &["http", "https"], result);
        }

        if worker.notify_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "worker.notify_timeout_ms",
                "must be greater than zero",
            ));
        }

        if worker.max_output_bytes == 0 {
            result.add_error(ValidationError::new(
                "worker.max_output_bytes",
                "must be greater than zero",
            ));
        }
    }

    fn check_url(path: &str, value: &str, schemes: &[&str], result: &mut ValidationResult) {
        match Url::parse(value) {
            Ok(url) if schemes.contains(&url.scheme()) => {}
            Ok(url) => result.add_error(ValidationError::new(
                path,
                format!(
                    "unsupported scheme '{}', expected one of: {}",
                    url.scheme(),
                    schemes.join(", ")
                ),
            )),
            Err(e) => result.add_error(ValidationError::new(path, format!("invalid URL: {}", e))),
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
