//! Contains the WimsClient struct for communicating with a WIMS server.

pub mod adm_raw;

use crate::error::WimsError;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use reqwest::blocking::Client;
use std::sync::{Arc, Mutex};
use url::Url;

/// A client bound to one WIMS server, holding the shared service secret.
/// Uses an `Arc` internally so it is cheap to clone.
#[derive(Clone)]
pub struct WimsClient(Arc<WimsCore>);

struct WimsCore {
    http: Client,
    server_url: Url,
    service_password: String,
    ident: String,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl WimsClient {
    /// Creates a new client for the `adm/raw` endpoint at `server_url`
    /// (typically `https://host/wims/wims.cgi`).
    ///
    /// `service_password` must match the `ident_password` configured on the
    /// server for this service identity. `allow_self_signed` disables TLS
    /// certificate verification for servers with self-signed certificates.
    pub fn new(
        server_url: Url,
        service_password: String,
        allow_self_signed: bool,
    ) -> Result<Self, WimsError> {
        Self::with_rng(
            server_url,
            service_password,
            allow_self_signed,
            Box::new(StdRng::from_entropy()),
        )
    }

    /// Creates a new client drawing correlation codes and throwaway
    /// passwords from the given generator instead of system entropy.
    pub fn with_rng(
        server_url: Url,
        service_password: String,
        allow_self_signed: bool,
        rng: Box<dyn RngCore + Send>,
    ) -> Result<Self, WimsError> {
        let http = Client::builder()
            .user_agent("Moodle")
            .danger_accept_invalid_certs(allow_self_signed)
            .build()
            .map_err(WimsError::HttpClient)?;
        // The service identity carries an https suffix when talking TLS, so
        // the server can tell the two connection routes apart.
        let ident = match server_url.scheme() {
            "https" => "moodlejsonhttps",
            _ => "moodlejson",
        };
        Ok(WimsClient(Arc::new(WimsCore {
            http,
            server_url,
            service_password,
            ident: ident.to_string(),
            rng: Mutex::new(rng),
        })))
    }

    /// The configured `adm/raw` endpoint.
    pub fn server_url(&self) -> &Url {
        &self.0.server_url
    }

    /// Draws a fresh 3-digit correlation code for one request.
    fn next_code(&self) -> String {
        let mut rng = self.0.rng.lock().expect("rng mutex poisoned");
        (100 + rng.next_u32() % 900).to_string()
    }

    /// Draws a random value in `[low, high)` for throwaway passwords.
    fn next_secret(&self, low: u32, high: u32) -> u32 {
        let mut rng = self.0.rng.lock().expect("rng mutex poisoned");
        low + rng.next_u32() % (high - low)
    }
}
