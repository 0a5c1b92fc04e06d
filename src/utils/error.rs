use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP probe request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Failed to read env file {path}: {message}")]
    EnvFileError { path: String, message: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Failed to spawn service '{service}': {message}")]
    SpawnError { service: String, message: String },

    #[error("Init command of service '{service}' exited with code {code}")]
    InitFailed { service: String, code: i32 },

    #[error("Dependency '{dependency}' of service '{service}' failed: {reason}")]
    DependencyFailed {
        service: String,
        dependency: String,
        reason: String,
    },

    #[error("Service '{service}' is unhealthy after {attempts} probe attempts")]
    HealthcheckFailed { service: String, attempts: u32 },

    #[error("State file error: {message}")]
    StateError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Serialization,
    Io,
    Network,
    Runtime,
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl StackError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StackError::IoError(_) => ErrorCategory::Io,
            StackError::YamlError(_)
            | StackError::EnvFileError { .. }
            | StackError::ConfigValidationError { .. }
            | StackError::InvalidConfigValueError { .. }
            | StackError::MissingConfigError { .. } => ErrorCategory::Configuration,
            StackError::SerializationError(_) => ErrorCategory::Serialization,
            StackError::HttpError(_) => ErrorCategory::Network,
            StackError::SpawnError { .. }
            | StackError::InitFailed { .. }
            | StackError::DependencyFailed { .. }
            | StackError::StateError { .. } => ErrorCategory::Runtime,
            StackError::HealthcheckFailed { .. } => ErrorCategory::Health,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            StackError::IoError(_) | StackError::SpawnError { .. } => ErrorSeverity::Critical,
            StackError::YamlError(_)
            | StackError::SerializationError(_)
            | StackError::EnvFileError { .. }
            | StackError::ConfigValidationError { .. }
            | StackError::InvalidConfigValueError { .. }
            | StackError::MissingConfigError { .. }
            | StackError::InitFailed { .. }
            | StackError::DependencyFailed { .. } => ErrorSeverity::High,
            StackError::HttpError(_) | StackError::HealthcheckFailed { .. } => {
                ErrorSeverity::Medium
            }
            StackError::StateError { .. } => ErrorSeverity::Low,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            StackError::IoError(_) => {
                "Check file permissions and that the working directory exists".to_string()
            }
            StackError::YamlError(_) => {
                "Check the stack descriptor for YAML syntax errors (indentation, quoting)"
                    .to_string()
            }
            StackError::SerializationError(_) => {
                "Remove the stale state file and run 'up' again".to_string()
            }
            StackError::HttpError(_) => {
                "Check that the probed URL is reachable from this host".to_string()
            }
            StackError::EnvFileError { path, .. } => {
                format!("Check that '{}' exists and contains KEY=VALUE lines", path)
            }
            StackError::ConfigValidationError { field, .. } => {
                format!("Fix the '{}' section of the stack descriptor", field)
            }
            StackError::InvalidConfigValueError { field, .. } => {
                format!("Correct the value of '{}' in the stack descriptor", field)
            }
            StackError::MissingConfigError { field } => {
                format!("Add the required '{}' field to the stack descriptor", field)
            }
            StackError::SpawnError { service, .. } => format!(
                "Check that the command of service '{}' is installed and on PATH",
                service
            ),
            StackError::InitFailed { service, .. } => format!(
                "Run the init command of service '{}' by hand to see its output",
                service
            ),
            StackError::DependencyFailed { dependency, .. } => format!(
                "Inspect the logs of service '{}' to see why it went down",
                dependency
            ),
            StackError::HealthcheckFailed { service, .. } => format!(
                "Increase the retry budget or start period of service '{}', or probe it by hand",
                service
            ),
            StackError::StateError { .. } => {
                "Run 'up' to create a fresh state file".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            StackError::IoError(e) => format!("File system problem: {}", e),
            StackError::YamlError(e) => format!("The stack descriptor could not be parsed: {}", e),
            StackError::SerializationError(_) => {
                "The recorded stack state is unreadable".to_string()
            }
            StackError::HttpError(_) => "An HTTP health probe could not be sent".to_string(),
            StackError::EnvFileError { path, .. } => {
                format!("The env file '{}' could not be loaded", path)
            }
            StackError::ConfigValidationError { .. }
            | StackError::InvalidConfigValueError { .. }
            | StackError::MissingConfigError { .. } => {
                format!("The stack descriptor is invalid: {}", self)
            }
            StackError::SpawnError { service, .. } => {
                format!("Service '{}' could not be started", service)
            }
            StackError::InitFailed { service, code } => format!(
                "The one-shot init of service '{}' failed (exit code {})",
                service, code
            ),
            StackError::DependencyFailed {
                service,
                dependency,
                ..
            } => format!(
                "Service '{}' was not started because '{}' went down first",
                service, dependency
            ),
            StackError::HealthcheckFailed { service, attempts } => format!(
                "Service '{}' never became healthy ({} failed probes)",
                service, attempts
            ),
            StackError::StateError { message } => message.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
