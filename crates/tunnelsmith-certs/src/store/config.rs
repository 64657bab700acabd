use std::path::{Path, PathBuf};

use snafu::{Snafu, ensure};
use tunnelsmith_shared::time::Duration;

use crate::{
    ca::DEFAULT_CA_VALIDITY, keys::rsa::DEFAULT_KEY_SIZE, leaf::DEFAULT_CERTIFICATE_VALIDITY,
};

/// The run name used when none is given.
pub const DEFAULT_RUN_NAME: &str = "client";

/// Run names whose client files would replace the CA or server pair.
const RESERVED_RUN_NAMES: &[&str] = &["ca", "server"];

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum InvalidRunNameError {
    #[snafu(display("the run name must not be empty"))]
    Empty,

    #[snafu(display("the run name {name:?} must be a plain file name"))]
    NotAFileName { name: String },

    #[snafu(display("the run name {name:?} is reserved for the {reserved} files"))]
    Reserved { name: String, reserved: &'static str },
}

/// Everything a [`TrustStore`](super::TrustStore) needs to know to resolve and
/// persist material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustStoreConfig {
    /// The directory holding all trust-store files.
    pub directory: PathBuf,

    /// Name of the run, which names the client certificate, key and config.
    pub name: String,

    pub key_size: usize,
    pub ca_validity: Duration,
    pub certificate_validity: Duration,

    pub ca_common_name: Option<String>,
    pub server_common_name: Option<String>,
    pub client_common_name: Option<String>,
}

impl Default for TrustStoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            name: DEFAULT_RUN_NAME.to_owned(),
            key_size: DEFAULT_KEY_SIZE,
            ca_validity: DEFAULT_CA_VALIDITY,
            certificate_validity: DEFAULT_CERTIFICATE_VALIDITY,
            ca_common_name: None,
            server_common_name: None,
            client_common_name: None,
        }
    }
}

/// The logical role of each file in the trust store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum FileRole {
    CaCertificate,
    CaPrivateKey,
    ServerCertificate,
    ServerPrivateKey,
    ClientCertificate,
    ClientPrivateKey,
    DhParams,
    AuthKey,
    ServerConfig,
    ClientConfig,
}

impl FileRole {
    /// Secret files are only readable by the owner.
    pub const fn is_secret(self) -> bool {
        matches!(
            self,
            Self::CaPrivateKey
                | Self::ServerPrivateKey
                | Self::ClientPrivateKey
                | Self::AuthKey
                | Self::ClientConfig
                | Self::ServerConfig
        )
    }
}

/// Maps each [`FileRole`] to its path. Only the client files depend on the
/// run name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustStorePaths {
    directory: PathBuf,
    name: String,
}

impl TrustStorePaths {
    pub fn new(
        directory: impl Into<PathBuf>,
        name: impl Into<String>,
    ) -> Result<Self, InvalidRunNameError> {
        let name = name.into();
        ensure!(!name.is_empty(), EmptySnafu);
        ensure!(
            name != "." && name != ".." && !name.contains(['/', '\\']),
            NotAFileNameSnafu { name }
        );
        // Compared case-insensitively for case-insensitive file systems
        if let Some(reserved) = RESERVED_RUN_NAMES
            .iter()
            .find(|reserved| reserved.eq_ignore_ascii_case(&name))
        {
            return ReservedSnafu { name, reserved: *reserved }.fail();
        }

        Ok(Self {
            directory: directory.into(),
            name,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file name of `role`, relative to [`Self::directory`].
    pub fn file_name(&self, role: FileRole) -> String {
        match role {
            FileRole::CaCertificate => "ca.crt".to_owned(),
            FileRole::CaPrivateKey => "ca.key".to_owned(),
            FileRole::ServerCertificate => "server.crt".to_owned(),
            FileRole::ServerPrivateKey => "server.key".to_owned(),
            FileRole::ClientCertificate => format!("{}.crt", self.name),
            FileRole::ClientPrivateKey => format!("{}.key", self.name),
            FileRole::DhParams => "dh.pem".to_owned(),
            FileRole::AuthKey => "ta.pem".to_owned(),
            FileRole::ServerConfig => "server.conf".to_owned(),
            FileRole::ClientConfig => format!("{}.ovpn", self.name),
        }
    }

    pub fn path(&self, role: FileRole) -> PathBuf {
        self.directory.join(self.file_name(role))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(FileRole::CaCertificate, "/etc/vpn/ca.crt")]
    #[case(FileRole::CaPrivateKey, "/etc/vpn/ca.key")]
    #[case(FileRole::ServerCertificate, "/etc/vpn/server.crt")]
    #[case(FileRole::ServerPrivateKey, "/etc/vpn/server.key")]
    #[case(FileRole::ClientCertificate, "/etc/vpn/alice.crt")]
    #[case(FileRole::ClientPrivateKey, "/etc/vpn/alice.key")]
    #[case(FileRole::DhParams, "/etc/vpn/dh.pem")]
    #[case(FileRole::AuthKey, "/etc/vpn/ta.pem")]
    #[case(FileRole::ServerConfig, "/etc/vpn/server.conf")]
    #[case(FileRole::ClientConfig, "/etc/vpn/alice.ovpn")]
    fn layout(#[case] role: FileRole, #[case] expected: &str) {
        let paths = TrustStorePaths::new("/etc/vpn", "alice").unwrap();
        assert_eq!(paths.path(role), Path::new(expected));
    }

    #[rstest]
    #[case("", InvalidRunNameError::Empty)]
    #[case("..", InvalidRunNameError::NotAFileName { name: "..".into() })]
    #[case("a/b", InvalidRunNameError::NotAFileName { name: "a/b".into() })]
    #[case("ca", InvalidRunNameError::Reserved { name: "ca".into(), reserved: "ca" })]
    #[case("server", InvalidRunNameError::Reserved { name: "server".into(), reserved: "server" })]
    #[case("Server", InvalidRunNameError::Reserved { name: "Server".into(), reserved: "server" })]
    fn invalid_run_names(#[case] name: &str, #[case] expected: InvalidRunNameError) {
        assert_eq!(TrustStorePaths::new(".", name).unwrap_err(), expected);
    }

    #[test]
    fn default_config() {
        let config = TrustStoreConfig::default();
        assert_eq!(config.directory, Path::new("."));
        assert_eq!(config.name, "client");
        assert_eq!(config.key_size, 4096);
        assert_eq!(config.ca_validity.as_secs(), 3650 * 24 * 60 * 60);
    }
}
