//! JSON templates describing the server and client configs.
//!
//! A template has a required `server` and `client` object holding the
//! directives of each config, and an optional `meta` object:
//!
//! ```json
//! {
//!   "meta": { "embedkeys": true, "tls-auth": true, "host": "vpn.example.com", "port": "1194" },
//!   "server": { "proto": "udp", "dev": "tun", "persist-key": true },
//!   "client": { "client": true, "proto": "udp", "dev": "tun" }
//! }
//! ```
use std::{fs, io, path::Path};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use snafu::{ResultExt, Snafu};
use tracing::{debug, instrument};
use tunnelsmith_certs::store::{ConnectionOptions, DEFAULT_HOST, DEFAULT_PORT};

mod render;
pub use render::*;

/// Directives in template order.
pub type Directives = IndexMap<String, Value>;

/// Directives written by the renderer itself, which templates must not set.
const MANAGED_SERVER_DIRECTIVES: &[&str] =
    &["port", "ca", "cert", "key", "dh", "tls-auth", "key-direction"];
const MANAGED_CLIENT_DIRECTIVES: &[&str] =
    &["remote", "ca", "cert", "key", "tls-auth", "key-direction"];

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read template"))]
    Read { source: io::Error },

    #[snafu(display("failed to deserialize template"))]
    Deserialize { source: serde_json::Error },

    #[snafu(display("template is invalid"))]
    Validate { source: ValidationError },
}

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ValidationError {
    #[snafu(display(
        "{section}.{key} must be a scalar or an array of scalars, objects and nested arrays are not supported"
    ))]
    UnsupportedValue { section: Section, key: String },

    #[snafu(display("{section}.{key} is written by tunnelsmith and must not be set"))]
    ManagedDirective { section: Section, key: String },
}

/// The two configs a template describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Section {
    Server,
    Client,
}

impl Section {
    fn managed_directives(self) -> &'static [&'static str] {
        match self {
            Self::Server => MANAGED_SERVER_DIRECTIVES,
            Self::Client => MANAGED_CLIENT_DIRECTIVES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub meta: TemplateMeta,
    pub server: Directives,
    pub client: Directives,
}

impl Template {
    #[instrument]
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).context(ReadSnafu)?;
        let template = Self::from_json(&contents)?;
        debug!(
            server.directives = template.server.len(),
            client.directives = template.client.len(),
            "loaded template"
        );

        Ok(template)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        let template: Self = serde_json::from_str(json).context(DeserializeSnafu)?;
        template.validate().context(ValidateSnafu)?;

        Ok(template)
    }

    pub fn directives(&self, section: Section) -> &Directives {
        match section {
            Section::Server => &self.server,
            Section::Client => &self.client,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for section in [Section::Server, Section::Client] {
            for (key, value) in self.directives(section) {
                snafu::ensure!(
                    !section.managed_directives().contains(&key.as_str()),
                    ManagedDirectiveSnafu { section, key }
                );

                let supported = match value {
                    Value::Object(_) => false,
                    Value::Array(items) => items
                        .iter()
                        .all(|item| !matches!(item, Value::Object(_) | Value::Array(_))),
                    _ => true,
                };
                snafu::ensure!(supported, UnsupportedValueSnafu { section, key });
            }
        }

        Ok(())
    }
}

/// Connection parameters and material handling of a [`Template`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TemplateMeta {
    /// Embed the material inline instead of referencing the trust-store
    /// files.
    #[serde(rename = "embedkeys")]
    pub embed_keys: bool,

    #[serde(rename = "tls-auth")]
    pub tls_auth: bool,

    pub host: String,

    /// Accepts both `"1194"` and `1194`.
    #[serde(deserialize_with = "deserialize_port")]
    pub port: String,
}

impl Default for TemplateMeta {
    fn default() -> Self {
        Self {
            embed_keys: true,
            tls_auth: true,
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT.to_owned(),
        }
    }
}

impl From<&TemplateMeta> for ConnectionOptions {
    fn from(meta: &TemplateMeta) -> Self {
        Self {
            embed_keys: meta.embed_keys,
            tls_auth: meta.tls_auth,
            host: meta.host.clone(),
            port: meta.port.clone(),
        }
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u16),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Text(port) => port,
        Port::Number(port) => port.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    #[test]
    fn meta_defaults() {
        let template = Template::from_json(r#"{"server": {}, "client": {}}"#).unwrap();
        assert_eq!(template.meta, TemplateMeta::default());
        assert_eq!(
            ConnectionOptions::from(&template.meta),
            ConnectionOptions::default()
        );
    }

    #[test]
    fn keeps_directive_order() {
        let template = Template::from_json(indoc! {r#"
            {
              "meta": { "embedkeys": false, "tls-auth": false, "host": "vpn.example.com", "port": 1194 },
              "server": { "proto": "udp", "dev": "tun", "cipher": "AES-256-GCM" },
              "client": { "nobind": true }
            }
        "#})
        .unwrap();

        assert_eq!(template.meta, TemplateMeta {
            embed_keys: false,
            tls_auth: false,
            host: "vpn.example.com".to_owned(),
            port: "1194".to_owned(),
        });
        assert_eq!(
            template.server.keys().collect::<Vec<_>>(),
            ["proto", "dev", "cipher"]
        );
    }

    #[rstest]
    #[case::missing_client(r#"{"server": {}}"#)]
    #[case::server_not_an_object(r#"{"server": [], "client": {}}"#)]
    #[case::embedkeys_not_a_bool(r#"{"meta": {"embedkeys": "yes"}, "server": {}, "client": {}}"#)]
    #[case::port_out_of_range(r#"{"meta": {"port": 70000}, "server": {}, "client": {}}"#)]
    fn rejects_malformed_templates(#[case] json: &str) {
        assert!(matches!(
            Template::from_json(json),
            Err(Error::Deserialize { .. })
        ));
    }

    #[rstest]
    #[case(
        r#"{"server": {"push": {"route": "10.0.0.0"}}, "client": {}}"#,
        ValidationError::UnsupportedValue { section: Section::Server, key: "push".to_owned() }
    )]
    #[case(
        r#"{"server": {}, "client": {"route": [["a"]]}}"#,
        ValidationError::UnsupportedValue { section: Section::Client, key: "route".to_owned() }
    )]
    #[case(
        r#"{"server": {"port": 1194}, "client": {}}"#,
        ValidationError::ManagedDirective { section: Section::Server, key: "port".to_owned() }
    )]
    #[case(
        r#"{"server": {}, "client": {"remote": "localhost"}}"#,
        ValidationError::ManagedDirective { section: Section::Client, key: "remote".to_owned() }
    )]
    fn rejects_invalid_directives(#[case] json: &str, #[case] expected: ValidationError) {
        match Template::from_json(json) {
            Err(Error::Validate { source }) => assert_eq!(source, expected),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn loads_bundled_templates() {
        let templates = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");
        for name in ["udp.json", "tcp.json"] {
            Template::from_file(&templates.join(name)).unwrap();
        }
    }
}
