use clap::Parser as _;
use snafu::{ResultExt as _, Snafu, ensure};
use tunnelsmith::cli::{Cli, Command};
use tunnelsmith_telemetry::Tracing;

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize tracing"))]
    InitTracing {
        source: tunnelsmith_telemetry::tracing::Error,
    },

    #[snafu(display("failed to generate VPN material"))]
    Generate { source: tunnelsmith::Error },

    #[snafu(display("failed to write {failed} artifact(s), see the log for details"))]
    IncompleteMaterialization { failed: usize },
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let Cli { command, telemetry } = Cli::parse();
    Tracing::pre_configured(env!("CARGO_PKG_NAME"), telemetry)
        .init()
        .context(InitTracingSnafu)?;

    match command {
        Command::Generate(arguments) => {
            let report = tunnelsmith::generate(&arguments).context(GenerateSnafu)?;
            for path in &report.written {
                println!("{}", path.display());
            }

            ensure!(report.is_complete(), IncompleteMaterializationSnafu {
                failed: report.failures.len()
            });
        }
    }

    Ok(())
}
