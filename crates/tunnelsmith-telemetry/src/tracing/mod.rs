//! Tracing subscribers for console and rolling file output.
//!
//! Console logs are written to stderr, stdout only carries command output.

use std::path::PathBuf;

use snafu::{ResultExt as _, Snafu};
use tracing::{level_filters::LevelFilter, subscriber::SetGlobalDefaultError};
use tracing_appender::rolling::{InitError, Rotation};
use tracing_subscriber::layer::SubscriberExt as _;

mod output;
pub use output::{ConsoleOutput, FileOutput};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender in {}", directory.display()))]
    InitRollingFileAppender {
        source: InitError,
        directory: PathBuf,
    },

    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber { source: SetGlobalDefaultError },
}

/// The log outputs of a service.
///
/// [`Tracing::init`] installs the outputs as the global default subscriber
/// for the rest of the process. Both outputs write synchronously, so nothing
/// needs to be flushed on exit.
///
/// ```
/// # use tunnelsmith_telemetry::{TelemetryOptions, Tracing};
/// # fn main() -> Result<(), tunnelsmith_telemetry::tracing::Error> {
/// Tracing::pre_configured("tunnelsmith", TelemetryOptions::default()).init()?;
///
/// tracing::info!("log a message");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Tracing {
    service_name: &'static str,
    console_output: Option<ConsoleOutput>,
    file_output: Option<FileOutput>,
}

impl Tracing {
    /// Environment variable with [`EnvFilter`](tracing_subscriber::EnvFilter)
    /// directives for console logs.
    pub const CONSOLE_LOG_LEVEL: &str = "TUNNELSMITH_LOG";
    /// Environment variable with [`EnvFilter`](tracing_subscriber::EnvFilter)
    /// directives for file logs.
    pub const FILE_LOG_LEVEL: &str = "TUNNELSMITH_FILE_LOG";
    pub const FILE_LOG_SUFFIX: &str = "log.json";
    pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;

    /// A service without any output.
    pub fn new(service_name: &'static str) -> Self {
        Self {
            service_name,
            console_output: None,
            file_output: None,
        }
    }

    pub fn with_console_output(self, console_output: impl Into<Option<ConsoleOutput>>) -> Self {
        Self {
            console_output: console_output.into(),
            ..self
        }
    }

    pub fn with_file_output(self, file_output: impl Into<Option<FileOutput>>) -> Self {
        Self {
            file_output: file_output.into(),
            ..self
        }
    }

    /// Outputs as selected on the command line, both at [`Self::DEFAULT_LEVEL`].
    ///
    /// File logs are only written when a directory is given, they are never
    /// rotated unless a rotation period is given as well.
    pub fn pre_configured(service_name: &'static str, options: TelemetryOptions) -> Self {
        let TelemetryOptions {
            console_log_disabled,
            console_log_format,
            file_log_directory,
            file_log_rotation_period,
            file_log_max_files,
        } = options;

        Self::new(service_name)
            .with_console_output((!console_log_disabled).then_some(ConsoleOutput {
                level_variable: Self::CONSOLE_LOG_LEVEL,
                default_level: Self::DEFAULT_LEVEL,
                format: console_log_format,
            }))
            .with_file_output(file_log_directory.map(|directory| FileOutput {
                directory,
                level_variable: Self::FILE_LOG_LEVEL,
                default_level: Self::DEFAULT_LEVEL,
                rotation_period: file_log_rotation_period.unwrap_or_default(),
                max_files: file_log_max_files,
            }))
    }

    /// Installs the configured outputs as the global default subscriber.
    ///
    /// Nothing is installed when all outputs are disabled. Fails if a global
    /// default subscriber was set before.
    pub fn init(self) -> Result<()> {
        let mut layers = Vec::new();
        if let Some(console_output) = &self.console_output {
            layers.push(console_output.layer());
        }
        if let Some(file_output) = &self.file_output {
            layers.push(file_output.layer(self.service_name)?);
        }

        if !layers.is_empty() {
            tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layers))
                .context(SetGlobalDefaultSubscriberSnafu)?;
        }

        Ok(())
    }
}

/// Log output arguments, usable with `#[command(flatten)]` when the `clap`
/// feature is enabled.
#[cfg_attr(feature = "clap", derive(clap::Args))]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TelemetryOptions {
    /// Disable console logs.
    #[cfg_attr(feature = "clap", arg(long, env = "TUNNELSMITH_CONSOLE_LOG_DISABLED"))]
    pub console_log_disabled: bool,

    /// Output FORMAT of the console logs.
    #[cfg_attr(
        feature = "clap",
        arg(
            long,
            env = "TUNNELSMITH_CONSOLE_LOG_FORMAT",
            value_name = "FORMAT",
            default_value_t
        )
    )]
    pub console_log_format: ConsoleLogFormat,

    /// Additionally write JSON logs to files in DIRECTORY.
    #[cfg_attr(
        feature = "clap",
        arg(
            long,
            env = "TUNNELSMITH_FILE_LOG_DIRECTORY",
            value_name = "DIRECTORY",
            group = "file_log"
        )
    )]
    pub file_log_directory: Option<PathBuf>,

    /// Time PERIOD after which log files are rolled over.
    #[cfg_attr(
        feature = "clap",
        arg(
            long,
            env = "TUNNELSMITH_FILE_LOG_ROTATION_PERIOD",
            value_name = "PERIOD",
            requires = "file_log"
        )
    )]
    pub file_log_rotation_period: Option<RotationPeriod>,

    /// Maximum NUMBER of log files to keep.
    #[cfg_attr(
        feature = "clap",
        arg(
            long,
            env = "TUNNELSMITH_FILE_LOG_MAX_FILES",
            value_name = "NUMBER",
            requires = "file_log"
        )
    )]
    pub file_log_max_files: Option<usize>,
}

#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ConsoleLogFormat {
    /// Human readable lines, colored unless `NO_COLOR` is set.
    #[default]
    Plain,

    /// One JSON object per event.
    Json,
}

#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum RotationPeriod {
    Minutely,
    Hourly,
    Daily,

    #[default]
    Never,
}

impl From<RotationPeriod> for Rotation {
    fn from(value: RotationPeriod) -> Self {
        match value {
            RotationPeriod::Minutely => Self::MINUTELY,
            RotationPeriod::Hourly => Self::HOURLY,
            RotationPeriod::Daily => Self::DAILY,
            RotationPeriod::Never => Self::NEVER,
        }
    }
}
