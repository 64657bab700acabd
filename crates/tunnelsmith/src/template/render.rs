use std::convert::Infallible;

use serde_json::Value;
use tunnelsmith_certs::store::{ConfigRenderer, FileRole, MaterialBundle, RenderedConfigs};

use super::{Directives, Section, Template};

/// Key direction of the server side of a tls-auth key. Clients use the
/// opposite direction.
const SERVER_KEY_DIRECTION: u8 = 0;
const CLIENT_KEY_DIRECTION: u8 = 1;

/// Directives taking exactly one argument, which is quoted when it contains
/// whitespace.
const SINGLE_ARGUMENT_DIRECTIVES: &[&str] = &["push"];

/// Renders OpenVPN configs from a [`Template`].
///
/// The directives of a section come first, in template order. The renderer
/// then appends the connection endpoint and the material, either inline as
/// `<ca>`-style blocks or as references to the trust-store files.
#[derive(Clone, Copy, Debug)]
pub struct TemplateRenderer<'a> {
    template: &'a Template,
}

impl<'a> TemplateRenderer<'a> {
    pub fn new(template: &'a Template) -> Self {
        Self { template }
    }

    fn render_server(&self, bundle: &MaterialBundle) -> String {
        let mut config = ConfigWriter::default();
        config.directives(self.template.directives(Section::Server));
        config.line(format!("port {}", bundle.server_port));

        config.material(bundle, FileRole::CaCertificate, "ca", &bundle.ca_certificate_pem);
        config.material(
            bundle,
            FileRole::ServerCertificate,
            "cert",
            &bundle.server_certificate_pem,
        );
        config.material(
            bundle,
            FileRole::ServerPrivateKey,
            "key",
            &bundle.server_private_key_pem,
        );
        if let Some(dh_params_pem) = &bundle.dh_params_pem {
            config.material(bundle, FileRole::DhParams, "dh", dh_params_pem);
        }
        if let Some(auth_key_pem) = &bundle.auth_key_pem {
            config.auth_key(bundle, auth_key_pem, SERVER_KEY_DIRECTION);
        }

        config.finish()
    }

    fn render_client(&self, bundle: &MaterialBundle) -> String {
        let mut config = ConfigWriter::default();
        config.directives(self.template.directives(Section::Client));
        config.line(format!(
            "remote {} {}",
            bundle.client_host, bundle.server_port
        ));

        config.material(bundle, FileRole::CaCertificate, "ca", &bundle.ca_certificate_pem);
        config.material(
            bundle,
            FileRole::ClientCertificate,
            "cert",
            &bundle.client_certificate_pem,
        );
        config.material(
            bundle,
            FileRole::ClientPrivateKey,
            "key",
            &bundle.client_private_key_pem,
        );
        if let Some(auth_key_pem) = &bundle.auth_key_pem {
            config.auth_key(bundle, auth_key_pem, CLIENT_KEY_DIRECTION);
        }

        config.finish()
    }
}

impl ConfigRenderer for TemplateRenderer<'_> {
    type Error = Infallible;

    fn render(&self, bundle: &MaterialBundle) -> Result<RenderedConfigs, Self::Error> {
        Ok(RenderedConfigs {
            server: self.render_server(bundle),
            client: self.render_client(bundle),
        })
    }
}

#[derive(Default)]
struct ConfigWriter {
    lines: Vec<String>,
}

impl ConfigWriter {
    fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn directives(&mut self, directives: &Directives) {
        for (key, value) in directives {
            match value {
                Value::Array(items) => {
                    for item in items {
                        self.directive(key, item);
                    }
                }
                value => self.directive(key, value),
            }
        }
    }

    fn directive(&mut self, key: &str, value: &Value) {
        match value {
            Value::String(value) if value.is_empty() => self.line(key),
            Value::String(value) if SINGLE_ARGUMENT_DIRECTIVES.contains(&key) => {
                self.line(format!("{key} {}", quote_argument(value)));
            }
            Value::String(value) => self.line(format!("{key} {value}")),
            Value::Number(value) => self.line(format!("{key} {value}")),
            Value::Bool(true) => self.line(key),
            // Validation rejects nested values
            Value::Bool(false) | Value::Null | Value::Array(_) | Value::Object(_) => {}
        }
    }

    fn material(&mut self, bundle: &MaterialBundle, role: FileRole, tag: &str, pem: &str) {
        if bundle.embed_keys {
            self.line(format!("<{tag}>"));
            self.line(pem.trim_end());
            self.line(format!("</{tag}>"));
        } else {
            self.line(format!("{tag} {}", bundle.paths.file_name(role)));
        }
    }

    fn auth_key(&mut self, bundle: &MaterialBundle, pem: &str, key_direction: u8) {
        if bundle.embed_keys {
            self.material(bundle, FileRole::AuthKey, "tls-auth", pem);
            self.line(format!("key-direction {key_direction}"));
        } else {
            self.line(format!(
                "tls-auth {} {key_direction}",
                bundle.paths.file_name(FileRole::AuthKey)
            ));
        }
    }

    fn finish(self) -> String {
        let mut config = self.lines.join("\n");
        config.push('\n');
        config
    }
}

/// Quotes `argument` if it contains whitespace and is not quoted already.
fn quote_argument(argument: &str) -> String {
    let quoted = argument.len() >= 2 && argument.starts_with('"') && argument.ends_with('"');
    if quoted || !argument.contains(char::is_whitespace) {
        return argument.to_owned();
    }

    let escaped = argument.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::{fixture, rstest};
    use tunnelsmith_certs::store::TrustStorePaths;
    use zeroize::Zeroizing;

    use super::*;

    #[fixture]
    fn template() -> Template {
        Template::from_json(indoc! {r#"
            {
              "server": {
                "proto": "udp",
                "dev": "tun",
                "server": "10.8.0.0 255.255.255.0",
                "push": ["redirect-gateway def1", "dhcp-option DNS 10.8.0.1"],
                "persist-key": true,
                "duplicate-cn": false,
                "comp-lzo": null,
                "verb": 3,
                "client-to-client": ""
              },
              "client": { "client": true, "proto": "udp", "dev": "tun" }
            }
        "#})
        .unwrap()
    }

    fn bundle(embed_keys: bool, tls_auth: bool) -> MaterialBundle {
        MaterialBundle {
            ca_certificate_pem: "CA CERT\n".to_owned(),
            server_certificate_pem: "SERVER CERT\n".to_owned(),
            server_private_key_pem: Zeroizing::new("SERVER KEY\n".to_owned()),
            client_certificate_pem: "CLIENT CERT\n".to_owned(),
            client_private_key_pem: Zeroizing::new("CLIENT KEY\n".to_owned()),
            dh_params_pem: Some("DH PARAMS\n".to_owned()),
            auth_key_pem: tls_auth.then(|| Zeroizing::new("AUTH KEY\n".to_owned())),
            server_port: "1194".to_owned(),
            client_host: "vpn.example.com".to_owned(),
            embed_keys,
            paths: TrustStorePaths::new("/etc/openvpn", "alice").unwrap(),
        }
    }

    #[rstest]
    fn renders_embedded_material(template: Template) {
        let configs = TemplateRenderer::new(&template)
            .render(&bundle(true, true))
            .unwrap();

        assert_eq!(configs.server, indoc! {r#"
            proto udp
            dev tun
            server 10.8.0.0 255.255.255.0
            push "redirect-gateway def1"
            push "dhcp-option DNS 10.8.0.1"
            persist-key
            verb 3
            client-to-client
            port 1194
            <ca>
            CA CERT
            </ca>
            <cert>
            SERVER CERT
            </cert>
            <key>
            SERVER KEY
            </key>
            <dh>
            DH PARAMS
            </dh>
            <tls-auth>
            AUTH KEY
            </tls-auth>
            key-direction 0
        "#});
        assert_eq!(configs.client, indoc! {"
            client
            proto udp
            dev tun
            remote vpn.example.com 1194
            <ca>
            CA CERT
            </ca>
            <cert>
            CLIENT CERT
            </cert>
            <key>
            CLIENT KEY
            </key>
            <tls-auth>
            AUTH KEY
            </tls-auth>
            key-direction 1
        "});
    }

    #[rstest]
    #[case("route-gateway dhcp", r#""route-gateway dhcp""#)]
    #[case("block-outside-dns", "block-outside-dns")]
    #[case(r#""redirect-gateway def1""#, r#""redirect-gateway def1""#)]
    #[case(r#"setenv NAME "a b""#, r#""setenv NAME \"a b\"""#)]
    fn quotes_single_argument_directives(#[case] value: &str, #[case] expected: &str) {
        assert_eq!(quote_argument(value), expected);
    }

    #[test]
    fn renders_bundled_template_pushes() {
        let template = Template::from_file(
            &std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("templates/udp.json"),
        )
        .unwrap();
        let configs = TemplateRenderer::new(&template)
            .render(&bundle(true, true))
            .unwrap();

        assert!(configs.server.contains(indoc! {r#"
            server 10.8.0.0 255.255.255.0
            ifconfig-pool-persist ipp.txt
            push "redirect-gateway def1 bypass-dhcp"
            push "dhcp-option DNS 1.1.1.1"
            keepalive 10 120
        "#}));
    }

    #[rstest]
    fn references_files_when_not_embedding(template: Template) {
        let configs = TemplateRenderer::new(&template)
            .render(&bundle(false, true))
            .unwrap();

        assert!(configs.server.ends_with(indoc! {"
            port 1194
            ca ca.crt
            cert server.crt
            key server.key
            dh dh.pem
            tls-auth ta.pem 0
        "}));
        assert!(configs.client.ends_with(indoc! {"
            remote vpn.example.com 1194
            ca ca.crt
            cert alice.crt
            key alice.key
            tls-auth ta.pem 1
        "}));
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn omits_auth_key_without_tls_auth(template: Template, #[case] embed_keys: bool) {
        let configs = TemplateRenderer::new(&template)
            .render(&bundle(embed_keys, false))
            .unwrap();

        for config in [configs.server, configs.client] {
            assert!(!config.contains("tls-auth"));
            assert!(!config.contains("key-direction"));
        }
    }
}
