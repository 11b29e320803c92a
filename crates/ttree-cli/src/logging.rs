use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Crates whose events follow `-v`; everything else stays at warnings.
const OWN_TARGETS: [&str; 2] = ["ttree", "ttree_cli"];

/// `-q` shows errors only, each `-v` opens one more level starting from warnings.
pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn targets(level: LevelFilter) -> Targets {
    OWN_TARGETS
        .iter()
        .fold(Targets::new(), |t, target| t.with_target(*target, level))
        .with_default(level.min(LevelFilter::WARN))
}

/// Installs the console logger and, when `log_file` is given, a plain-text file
/// logger that also records how long each compile phase took.
pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let filter = targets(level_for(verbosity, quiet));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer);

    let installed = match log_file {
        Some(path) => {
            let file = File::create(&path).map_err(|source| CliError::LogFile {
                path: path.clone(),
                source,
            })?;
            subscriber.with(file_layer(file)).try_init()
        }
        None => subscriber.try_init(),
    };

    installed.map_err(|e| CliError::Logger(e.to_string()))
}

fn file_layer<S>(file: File) -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tracing::{Level, debug, info_span};

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0, false), LevelFilter::WARN);
        assert_eq!(level_for(1, false), LevelFilter::INFO);
        assert_eq!(level_for(2, false), LevelFilter::DEBUG);
        assert_eq!(level_for(7, false), LevelFilter::TRACE);
        assert_eq!(level_for(3, true), LevelFilter::ERROR);
    }

    #[test]
    fn dependencies_stay_at_warnings_when_verbose() {
        let filter = targets(LevelFilter::DEBUG);
        assert!(filter.would_enable("ttree::engine::executor", &Level::DEBUG));
        assert!(filter.would_enable("ttree_cli::commands", &Level::DEBUG));
        assert!(!filter.would_enable("indicatif", &Level::INFO));
        assert!(filter.would_enable("indicatif", &Level::WARN));
    }

    #[test]
    fn quiet_silences_dependencies_too() {
        let filter = targets(LevelFilter::ERROR);
        assert!(!filter.would_enable("ttree", &Level::WARN));
        assert!(!filter.would_enable("toml", &Level::WARN));
    }

    #[test]
    #[serial]
    fn file_layer_records_span_durations() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("ttree.log");
        let subscriber =
            tracing_subscriber::registry().with(file_layer(File::create(&log_path).unwrap()));

        tracing::subscriber::with_default(subscriber, || {
            let _phase = info_span!("phase", name = "Rendering").entered();
            debug!("rendered 3 scopes");
        });

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("rendered 3 scopes"));
        assert!(content.contains("name=\"Rendering\""));
        assert!(content.contains("close"));
        assert!(!content.contains('\u{1b}'));
    }

    #[test]
    #[serial]
    fn unwritable_log_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("ttree.log");
        let result = setup_logging(0, false, Some(path.clone()));
        assert!(matches!(result, Err(CliError::LogFile { path: p, .. }) if p == path));
    }
}
