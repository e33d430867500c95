//! Error types for duct

use std::path::PathBuf;

use crate::constants::{EXIT_COMMAND_NOT_FOUND, EXIT_NOT_EXECUTABLE};

/// duct error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid value '{value}' for {option}; expected one of: {expected}")]
    InvalidChoice {
        option: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid output prefix: {0}")]
    InvalidPrefix(String),

    #[error("Conflicting files:\n{}\nUse --clobber to overwrite conflicting files.", format_conflicts(.0))]
    ConflictingFiles(Vec<PathBuf>),

    #[error("{0}: command not found")]
    CommandNotFound(String),

    #[error("{0}: permission denied")]
    CommandNotExecutable(String),

    #[error("Process failed to start: {0}")]
    ProcessStartFailed(String),

    #[error("Monitoring task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

fn format_conflicts(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("- {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type alias for duct
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn process_start<S: Into<String>>(msg: S) -> Self {
        Error::ProcessStartFailed(msg.into())
    }

    /// Exit code the wrapper reports when it fails on its own account.
    ///
    /// Launch errors follow shell conventions (127 not found, 126 not
    /// executable); configuration problems exit with 2 before any child runs.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CommandNotFound(_) => EXIT_COMMAND_NOT_FOUND,
            Error::CommandNotExecutable(_) => EXIT_NOT_EXECUTABLE,
            Error::ConfigError(_)
            | Error::ConfigNotFound(_)
            | Error::InvalidChoice { .. }
            | Error::InvalidPrefix(_)
            | Error::ConflictingFiles(_)
            | Error::TomlError(_)
            | Error::YamlError(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CommandNotFound("nosuchcmd".to_string());
        assert_eq!(err.to_string(), "nosuchcmd: command not found");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::CommandNotFound("x".into()).exit_code(), 127);
        assert_eq!(Error::CommandNotExecutable("x".into()).exit_code(), 126);
        assert_eq!(Error::config("bad").exit_code(), 2);
    }

    #[test]
    fn test_conflicting_files_lists_paths() {
        let err = Error::ConflictingFiles(vec![
            PathBuf::from("/tmp/a_info.json"),
            PathBuf::from("/tmp/a_usage.jsonl"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("- /tmp/a_info.json"));
        assert!(msg.contains("- /tmp/a_usage.jsonl"));
        assert!(msg.contains("--clobber"));
    }
}
