//! Error types for stemmer
//!
//! All modules use `StemmerResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for stemmer operations
pub type StemmerResult<T> = Result<T, StemmerError>;

/// Broad failure classes used by the build pipeline to decide what is fatal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced platform, recipe, project or rootfs does not exist
    NotFound,
    /// A definition is missing a required field or holds an invalid value
    Config,
    /// A filesystem resource could not be allocated
    Resource,
    /// An external command failed
    Execution,
    /// Other IO failures
    Io,
    /// Bugs and serialization failures
    Internal,
}

/// All errors that can occur in stemmer
#[derive(Error, Debug)]
pub enum StemmerError {
    // Lookup errors
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Platform not found: {0}")]
    PlatformNotFound(String),

    #[error("Recipe not found: {0}")]
    RecipeNotFound(String),

    #[error("No such rootfs: {0}")]
    RootfsNotFound(PathBuf),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("{target} requires field '{field}'")]
    MissingField { target: String, field: String },

    #[error("Platform chain loops back on itself: {0}")]
    PlatformCycle(String),

    #[error("Unsupported architecture {arch}: {reason}")]
    UnsupportedArch { arch: String, reason: String },

    #[error("Invalid package {name}: {reason}")]
    InvalidPackage { name: String, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Resource errors
    #[error("Failed to create job directory {path}: {source}")]
    JobCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` exited with code {code}{}", format_output(.output))]
    CommandExecution {
        command: String,
        code: i32,
        output: String,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_output(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!(":\n{}", output)
    }
}

impl StemmerError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error (the process could not be spawned)
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error (the process exited unsuccessfully)
    pub fn command_exec(command: impl Into<String>, code: i32, output: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            code,
            output: output.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProjectNotFound(_)
            | Self::PlatformNotFound(_)
            | Self::RecipeNotFound(_)
            | Self::RootfsNotFound(_) => ErrorKind::NotFound,
            Self::ConfigInvalid { .. }
            | Self::MissingField { .. }
            | Self::PlatformCycle(_)
            | Self::UnsupportedArch { .. }
            | Self::InvalidPackage { .. }
            | Self::TomlParse(_) => ErrorKind::Config,
            Self::ConfigDirCreate { .. } | Self::JobCreate { .. } | Self::DirCreate { .. } => {
                ErrorKind::Resource
            }
            Self::CommandFailed { .. } | Self::CommandExecution { .. } => ErrorKind::Execution,
            Self::Io { .. } => ErrorKind::Io,
            Self::Json(_) | Self::TomlSerialize(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingField { field, .. } if field == "platform" => {
                Some("Add a \"platform\" entry to project.json")
            }
            Self::UnsupportedArch { .. } => {
                Some("Install qemu-user-static and binfmt-support on the build host")
            }
            Self::CommandFailed { .. } => Some("Check that the command is installed and on PATH"),
            Self::CommandExecution { command, .. } if command.starts_with("chroot") => {
                Some("chroot requires root privileges; run the build with sudo")
            }
            _ => None,
        }
    }
}
