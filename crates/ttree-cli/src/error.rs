use std::path::PathBuf;
use thiserror::Error;
use ttree::engine::config::ConfigError;
use ttree::engine::error::CompileError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Input template does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Cannot read configuration file '{}'", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file '{}'", path.display())]
    ConfigSyntax {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid compiler settings")]
    Config(#[from] ConfigError),

    #[error("Cannot create log file '{}'", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install logger: {0}")]
    Logger(String),
}

impl CliError {
    /// The message followed by every underlying cause, separated by `: `.
    pub fn report(self) -> String {
        format!("{:#}", anyhow::Error::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn report_includes_the_path_and_the_cause() {
        let err = CliError::LogFile {
            path: PathBuf::from("/var/log/ttree.log"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert_eq!(
            err.report(),
            "Cannot create log file '/var/log/ttree.log': permission denied"
        );
    }

    #[test]
    fn io_causes_appear_once() {
        let err = CliError::from(CompileError::from(ttree::core::io::IoError::new(
            "/lib/water.lt",
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        )));
        assert_eq!(err.report(), "cannot access \"/lib/water.lt\": no such file");
    }

    #[test]
    fn compile_errors_are_reported_as_is() {
        let err = CliError::from(CompileError::from(ConfigError::from(
            ttree::core::io::layout::LayoutError::UnknownStyle("nonsense".into()),
        )));
        assert!(err.report().contains("nonsense"));
    }
}
