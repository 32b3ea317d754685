//! Keystone v3 password authentication
//!
//! Issues a project scoped token and resolves the network service endpoint
//! for the datacenter's region from the token's service catalog.

use crate::error::{OpenstackError, Result, check_status};
use clusternet_cloud::OpenstackCredentials;
use clusternet_config::OpenstackDatacenter;
use serde::{Deserialize, Serialize};

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const NETWORK_SERVICE: &str = "network";
const PUBLIC_INTERFACE: &str = "public";

/// An authenticated session
#[derive(Clone)]
pub struct Session {
    pub token: String,
    /// Neutron base URL, without the `/v2.0` suffix
    pub network_endpoint: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("network_endpoint", &self.network_endpoint)
            .finish()
    }
}

/// `<auth_url>/auth/tokens`, accepting auth URLs with or without `/v3`
pub fn tokens_url(auth_url: &str) -> String {
    let base = auth_url.trim_end_matches('/');
    if base.ends_with("/v3") {
        format!("{}/auth/tokens", base)
    } else {
        format!("{}/v3/auth/tokens", base)
    }
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    auth: Auth<'a>,
}

#[derive(Serialize)]
struct Auth<'a> {
    identity: Identity<'a>,
    scope: Scope<'a>,
}

#[derive(Serialize)]
struct Identity<'a> {
    methods: [&'static str; 1],
    password: PasswordMethod<'a>,
}

#[derive(Serialize)]
struct PasswordMethod<'a> {
    user: User<'a>,
}

#[derive(Serialize)]
struct User<'a> {
    name: &'a str,
    domain: Named<'a>,
    password: &'a str,
}

#[derive(Serialize)]
struct Scope<'a> {
    project: Project<'a>,
}

#[derive(Serialize)]
struct Project<'a> {
    name: &'a str,
    domain: Named<'a>,
}

#[derive(Serialize)]
struct Named<'a> {
    name: &'a str,
}

impl<'a> AuthRequest<'a> {
    fn password(credentials: &'a OpenstackCredentials) -> Self {
        Self {
            auth: Auth {
                identity: Identity {
                    methods: ["password"],
                    password: PasswordMethod {
                        user: User {
                            name: &credentials.username,
                            domain: Named {
                                name: &credentials.domain,
                            },
                            password: &credentials.password,
                        },
                    },
                },
                scope: Scope {
                    project: Project {
                        name: &credentials.tenant,
                        domain: Named {
                            name: &credentials.domain,
                        },
                    },
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Token,
}

#[derive(Debug, Deserialize)]
struct Token {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    interface: String,
    #[serde(default)]
    region_id: Option<String>,
    #[serde(default)]
    region: Option<String>,
    url: String,
}

impl Endpoint {
    fn in_region(&self, region: &str) -> bool {
        self.region_id.as_deref() == Some(region) || self.region.as_deref() == Some(region)
    }
}

fn network_endpoint(catalog: &[CatalogEntry], region: &str) -> Result<String> {
    catalog
        .iter()
        .filter(|entry| entry.service_type == NETWORK_SERVICE)
        .flat_map(|entry| entry.endpoints.iter())
        .find(|ep| ep.interface == PUBLIC_INTERFACE && ep.in_region(region))
        .map(|ep| ep.url.trim_end_matches('/').to_string())
        .ok_or_else(|| OpenstackError::EndpointNotFound {
            service: NETWORK_SERVICE.to_string(),
            region: region.to_string(),
        })
}

/// Authenticate with a password and resolve the network endpoint
pub async fn authenticate(
    http: &reqwest::Client,
    datacenter: &OpenstackDatacenter,
    credentials: &OpenstackCredentials,
) -> Result<Session> {
    let url = tokens_url(&datacenter.auth_url);
    tracing::debug!(url = %url, user = %credentials.username, "Requesting Keystone token");

    let response = http
        .post(&url)
        .json(&AuthRequest::password(credentials))
        .send()
        .await?;
    let response = check_status(response).await?;

    let token = response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(OpenstackError::MissingToken)?;

    let body: TokenResponse = response.json().await?;
    let network_endpoint = network_endpoint(&body.token.catalog, &datacenter.region)?;

    tracing::debug!(endpoint = %network_endpoint, "Resolved network endpoint");
    Ok(Session {
        token,
        network_endpoint,
    })
}
