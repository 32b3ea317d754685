//! OpenStack backend error types

use clusternet_cloud::{CloudError, ResourceKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenstackError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status}: {message}")]
    Status { status: u16, message: String },

    #[error("Keystone response carried no X-Subject-Token header")]
    MissingToken,

    #[error("no {service} endpoint for region {region} in the service catalog")]
    EndpointNotFound { service: String, region: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OpenstackError>;

impl OpenstackError {
    /// Map onto the provider error taxonomy
    ///
    /// `kind` and `name` describe the resource the request was about, used
    /// when the API answers 404.
    pub fn into_cloud_error(self, kind: ResourceKind, name: &str) -> CloudError {
        match self {
            OpenstackError::Status { status, message } => match status {
                401 | 403 => CloudError::Authentication(format!("{}: {}", status, message)),
                404 => CloudError::not_found(kind, name),
                500..=599 => CloudError::Transient(format!("{}: {}", status, message)),
                _ => CloudError::Api(format!("{}: {}", status, message)),
            },
            OpenstackError::Http(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                CloudError::Transient(e.to_string())
            }
            OpenstackError::Http(e) => CloudError::Api(e.to_string()),
            OpenstackError::MissingToken => CloudError::Authentication(self.to_string()),
            OpenstackError::EndpointNotFound { .. } => CloudError::Configuration(self.to_string()),
            OpenstackError::Json(e) => CloudError::Api(format!("unexpected response body: {}", e)),
        }
    }
}

/// Turn a non-success response into [`OpenstackError::Status`]
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(OpenstackError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pull the message out of a Neutron or Keystone error body
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/NeutronError/message")
                .or_else(|| v.pointer("/error/message"))
        })
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Conversion for calls that are not about a single named resource
impl From<OpenstackError> for CloudError {
    fn from(err: OpenstackError) -> Self {
        err.into_cloud_error(ResourceKind::Network, "*")
    }
}
