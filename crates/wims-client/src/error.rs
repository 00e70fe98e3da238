//! The client error type.

use crate::request::Job;
use thiserror::Error;

/// The main error type for wims-client.
///
/// `Comms` covers the transport (connection refused, timeout, non-2xx);
/// `ProtocolBreak` a response body that is not JSON at all, which means an
/// incompatible server rather than a transient problem; everything else is a
/// well-formed response the server used to refuse the job.
#[derive(Debug, Error)]
pub enum WimsError {
    #[error("Failed to construct the HTTP client")]
    HttpClient(#[source] reqwest::Error),
    #[error("Connection error sending job {job} to the WIMS server")]
    Comms {
        job: Job,
        #[source]
        source: reqwest::Error,
    },
    #[error("The response to job {job} is not valid JSON; the server is probably incompatible")]
    ProtocolBreak {
        job: Job,
        #[source]
        source: serde_json::Error,
    },
    #[error("Correlation code mismatch on job {job}: sent {sent}, received {received}")]
    CodeMismatch {
        job: Job,
        sent: String,
        received: String,
    },
    #[error(
        "This service is not allowed to run job {job} on the WIMS server. \
         Ask the WIMS administrator to enable the job for this identity"
    )]
    NotAllowed { job: Job },
    #[error("The WIMS server rejected job {job}: {message}")]
    Rejected { job: Job, message: String },
    #[error("The response to job {job} is missing the {field} field")]
    MissingField { job: Job, field: &'static str },
    #[error("Failed to deserialize the response payload of job {job}")]
    Payload {
        job: Job,
        #[source]
        source: serde_json::Error,
    },
}

impl WimsError {
    /// True for transport-level failures, as opposed to logical refusals.
    pub fn is_comms(&self) -> bool {
        matches!(self, WimsError::Comms { .. })
    }

    /// The free-text message of a logical rejection, if there is one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            WimsError::Rejected { message, .. } => Some(message),
            _ => None,
        }
    }
}
