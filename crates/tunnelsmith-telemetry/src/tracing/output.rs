use std::path::PathBuf;

use snafu::ResultExt as _;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use super::{ConsoleLogFormat, InitRollingFileAppenderSnafu, Result, RotationPeriod, Tracing};

pub(super) type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log events written to stderr.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsoleOutput {
    /// Environment variable holding [`EnvFilter`] directives. Takes
    /// precedence over `default_level` when set.
    pub level_variable: &'static str,
    pub default_level: LevelFilter,
    pub format: ConsoleLogFormat,
}

impl ConsoleOutput {
    pub(super) fn layer(&self) -> BoxedLayer {
        let filter = env_filter(self.level_variable, self.default_level);
        let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

        match self.format {
            ConsoleLogFormat::Plain => layer.with_filter(filter).boxed(),
            ConsoleLogFormat::Json => layer.json().with_filter(filter).boxed(),
        }
    }
}

/// JSON log events written to rolling files in `directory`.
///
/// Files are named `<service name>.<date>.log.json`, the date part is left
/// out for [`RotationPeriod::Never`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileOutput {
    pub directory: PathBuf,
    pub level_variable: &'static str,
    pub default_level: LevelFilter,
    pub rotation_period: RotationPeriod,

    /// Older files are deleted on rotation once this many exist.
    pub max_files: Option<usize>,
}

impl FileOutput {
    pub(super) fn layer(&self, service_name: &str) -> Result<BoxedLayer> {
        let mut appender = RollingFileAppender::builder()
            .rotation(self.rotation_period.into())
            .filename_prefix(service_name)
            .filename_suffix(Tracing::FILE_LOG_SUFFIX);
        if let Some(max_files) = self.max_files {
            appender = appender.max_log_files(max_files);
        }
        let appender = appender
            .build(&self.directory)
            .context(InitRollingFileAppenderSnafu {
                directory: &self.directory,
            })?;

        Ok(tracing_subscriber::fmt::layer()
            .json()
            .with_writer(appender)
            .with_filter(env_filter(self.level_variable, self.default_level))
            .boxed())
    }
}

fn env_filter(variable: &str, default_level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(variable)
        .with_default_directive(default_level.into())
        .from_env_lossy()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn file_output(directory: PathBuf) -> FileOutput {
        FileOutput {
            directory,
            level_variable: Tracing::FILE_LOG_LEVEL,
            default_level: LevelFilter::INFO,
            rotation_period: RotationPeriod::Never,
            max_files: Some(2),
        }
    }

    #[test]
    fn file_output_opens_log_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let directory = temp_dir.path().join("logs");

        file_output(directory.clone()).layer("tunnelsmith").unwrap();

        let file_names: Vec<_> = fs::read_dir(&directory)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(file_names, ["tunnelsmith.log.json"]);
    }

    #[test]
    fn file_output_in_a_file_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let not_a_directory = temp_dir.path().join("logs");
        fs::write(&not_a_directory, b"").unwrap();

        let Err(error) = file_output(not_a_directory.clone()).layer("tunnelsmith") else {
            panic!("expected the rolling file appender to fail");
        };
        assert!(matches!(
            error,
            crate::tracing::Error::InitRollingFileAppender { directory, .. } if directory == not_a_directory
        ));
    }
}
