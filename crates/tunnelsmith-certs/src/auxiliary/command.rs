use std::{
    ffi::OsString,
    process::{Command, Stdio},
};

use snafu::{ResultExt, ensure};
use tracing::{debug, instrument};

use super::{
    EmptyOutputSnafu, ExitStatusSnafu, ExternalToolError, MaterialGenerator, SpawnSnafu,
};

/// The default DH parameter size in bits.
pub const DEFAULT_DH_BITS: usize = 2048;

/// Runs an external program and uses its standard output as material.
#[derive(Clone, Debug)]
pub struct CommandGenerator {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandGenerator {
    pub fn new(
        program: impl Into<OsString>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `openssl dhparam <bits>`, which prints PEM-encoded DH parameters.
    pub fn openssl_dh_params(program: impl Into<OsString>, bits: usize) -> Self {
        Self::new(program, ["dhparam".to_owned(), bits.to_string()])
    }

    /// `openvpn --genkey secret /dev/stdout`, which prints an OpenVPN static
    /// key.
    pub fn openvpn_static_key(program: impl Into<OsString>) -> Self {
        Self::new(program, ["--genkey", "secret", "/dev/stdout"])
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl MaterialGenerator for CommandGenerator {
    #[instrument(name = "run_generator_command", skip(self), fields(program = %self.program_name()))]
    fn generate(&self) -> Result<Vec<u8>, ExternalToolError> {
        let program = self.program_name();
        debug!(args = ?self.args, "spawning generator");

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .context(SpawnSnafu {
                program: program.clone(),
            })?;

        ensure!(output.status.success(), ExitStatusSnafu {
            program: program.clone(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
        ensure!(
            !output.stdout.iter().all(u8::is_ascii_whitespace),
            EmptyOutputSnafu { program }
        );

        Ok(output.stdout)
    }
}
