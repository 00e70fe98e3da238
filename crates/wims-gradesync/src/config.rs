//! The service configuration object supplied by the host application.

use crate::identity::LoginPolicy;
use serde::Deserialize;
use url::Url;

/// Connection and policy settings for one WIMS service binding.
///
/// Mirrors the admin settings of the host application; the whole object is
/// handed in opaquely, there is no environment or file surface here.
#[derive(Debug, Clone, Deserialize)]
pub struct WimsConfig {
    /// URL of the `adm/raw` endpoint, e.g.
    /// `https://wims.example.org/wims/wims.cgi`.
    pub server_url: Url,
    /// Shared secret matching the `ident_password` the server holds for
    /// this service identity.
    pub service_password: String,
    /// Accept self-signed TLS certificates.
    #[serde(default)]
    pub allow_self_signed: bool,
    /// Build readable remote logins from user names instead of opaque ids.
    #[serde(default)]
    pub use_name_in_login: bool,
    /// Default language for newly created classes and issued sessions.
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_lang() -> String {
    "en".to_string()
}

impl WimsConfig {
    pub fn login_policy(&self) -> LoginPolicy {
        if self.use_name_in_login {
            LoginPolicy::Readable
        } else {
            LoginPolicy::Opaque
        }
    }
}
