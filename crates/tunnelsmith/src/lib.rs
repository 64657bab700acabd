//! Issues a VPN certificate authority together with server and client
//! certificates, and renders OpenVPN configs from a JSON [`template`].
use std::path::PathBuf;

use snafu::{ResultExt, Snafu};
use tracing::instrument;
use tunnelsmith_certs::{
    auxiliary::{CommandGenerator, MaterialGenerator, StaticKeyGenerator},
    store::{self, AuxiliaryGenerators, ConnectionOptions, MaterializeReport, TrustStore},
};

use crate::{
    cli::{AuthKeyGenerator, GenerateArguments},
    template::{Template, TemplateRenderer},
};

pub mod cli;
pub mod template;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to load template {path:?}"))]
    LoadTemplate {
        source: template::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to open trust store"))]
    OpenTrustStore { source: store::Error },

    #[snafu(display("failed to issue and materialize VPN material"))]
    Materialize { source: store::Error },
}

/// Runs `tunnelsmith generate` with the external generators selected by
/// `arguments`.
#[instrument(skip_all, fields(template = %arguments.template.display()))]
pub fn generate(arguments: &GenerateArguments) -> Result<MaterializeReport, Error> {
    let template = Template::from_file(&arguments.template).context(LoadTemplateSnafu {
        path: &arguments.template,
    })?;
    let trust_store =
        TrustStore::new(arguments.trust_store_config()).context(OpenTrustStoreSnafu)?;

    let dh_params = CommandGenerator::openssl_dh_params(&arguments.openssl_bin, arguments.dh_bits);
    let auth_key: Box<dyn MaterialGenerator> = match arguments.auth_key_generator {
        AuthKeyGenerator::Openvpn => {
            Box::new(CommandGenerator::openvpn_static_key(&arguments.openvpn_bin))
        }
        AuthKeyGenerator::Builtin => Box::new(StaticKeyGenerator),
    };

    generate_with(&trust_store, &template, AuxiliaryGenerators {
        dh_params: &dh_params,
        auth_key: auth_key.as_ref(),
    })
}

/// Runs a complete trust-store pass for `template` using the given
/// generators.
pub fn generate_with(
    trust_store: &TrustStore,
    template: &Template,
    generators: AuxiliaryGenerators<'_>,
) -> Result<MaterializeReport, Error> {
    let options = ConnectionOptions::from(&template.meta);
    let renderer = TemplateRenderer::new(template);

    trust_store
        .run(&options, generators, &renderer)
        .context(MaterializeSnafu)
}
