//! Command line arguments.
//!
//! Every argument can also be set through the environment variable named
//! next to it in `--help`.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tunnelsmith_certs::{
    auxiliary::DEFAULT_DH_BITS, ca::DEFAULT_CA_VALIDITY, keys::rsa::DEFAULT_KEY_SIZE,
    leaf::DEFAULT_CERTIFICATE_VALIDITY,
    store::{DEFAULT_RUN_NAME, TrustStoreConfig},
};
use tunnelsmith_shared::time::Duration;
use tunnelsmith_telemetry::tracing::TelemetryOptions;

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(name = "tunnelsmith", author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub telemetry: TelemetryOptions,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Issue certificates and render the server and client configs.
    Generate(GenerateArguments),
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct GenerateArguments {
    /// JSON template describing the server and client configs.
    #[arg(long, short, value_name = "FILE", env = "TUNNELSMITH_TEMPLATE")]
    pub template: PathBuf,

    /// Name of the client, used for its certificate, key and config files.
    #[arg(long, short, default_value = DEFAULT_RUN_NAME, env = "TUNNELSMITH_NAME")]
    pub name: String,

    /// Directory holding the trust store and the rendered configs.
    #[arg(
        long,
        short,
        value_name = "DIR",
        default_value = ".",
        env = "TUNNELSMITH_OUTPUT_DIR"
    )]
    pub output_dir: PathBuf,

    /// Size of newly generated RSA keys, 2048 to 8192 bits.
    #[arg(long, value_name = "BITS", default_value_t = DEFAULT_KEY_SIZE, env = "TUNNELSMITH_KEY_SIZE")]
    pub key_size: usize,

    /// Validity of a newly created certificate authority, e.g. `3650d` or `90d12h`.
    #[arg(long, default_value_t = DEFAULT_CA_VALIDITY, env = "TUNNELSMITH_CA_VALIDITY")]
    pub ca_validity: Duration,

    /// Validity of newly issued server and client certificates.
    #[arg(long, default_value_t = DEFAULT_CERTIFICATE_VALIDITY, env = "TUNNELSMITH_CERT_VALIDITY")]
    pub cert_validity: Duration,

    /// Common name of a newly created certificate authority. Defaults to `CA-<uuid>`.
    #[arg(long, env = "TUNNELSMITH_CA_COMMON_NAME")]
    pub ca_common_name: Option<String>,

    /// Common name of a newly issued server certificate. Defaults to `server-<uuid>`.
    #[arg(long, env = "TUNNELSMITH_SERVER_COMMON_NAME")]
    pub server_common_name: Option<String>,

    /// Common name of the client certificate. Defaults to `client-<uuid>`.
    #[arg(long, env = "TUNNELSMITH_CLIENT_COMMON_NAME")]
    pub client_common_name: Option<String>,

    /// Size of newly generated DH parameters.
    #[arg(long, value_name = "BITS", default_value_t = DEFAULT_DH_BITS, env = "TUNNELSMITH_DH_BITS")]
    pub dh_bits: usize,

    /// How a missing tls-auth key is generated.
    #[arg(long, value_enum, default_value_t, env = "TUNNELSMITH_AUTH_KEY_GENERATOR")]
    pub auth_key_generator: AuthKeyGenerator,

    /// The openssl executable used to generate DH parameters.
    #[arg(
        long,
        value_name = "PROGRAM",
        default_value = "openssl",
        env = "TUNNELSMITH_OPENSSL_BIN"
    )]
    pub openssl_bin: PathBuf,

    /// The openvpn executable used to generate the tls-auth key.
    #[arg(
        long,
        value_name = "PROGRAM",
        default_value = "openvpn",
        env = "TUNNELSMITH_OPENVPN_BIN"
    )]
    pub openvpn_bin: PathBuf,
}

impl GenerateArguments {
    pub fn trust_store_config(&self) -> TrustStoreConfig {
        TrustStoreConfig {
            directory: self.output_dir.clone(),
            name: self.name.clone(),
            key_size: self.key_size,
            ca_validity: self.ca_validity,
            certificate_validity: self.cert_validity,
            ca_common_name: self.ca_common_name.clone(),
            server_common_name: self.server_common_name.clone(),
            client_common_name: self.client_common_name.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AuthKeyGenerator {
    /// Run `openvpn --genkey secret`.
    #[default]
    Openvpn,

    /// Generate the key without any external program.
    Builtin,
}
