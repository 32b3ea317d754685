//! Cloud provider error types

use std::time::Duration;
use thiserror::Error;

/// Kind of cloud resource an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Network,
    Subnet,
    Router,
    SecurityGroup,
    FloatingIpPool,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Network => write!(f, "network"),
            ResourceKind::Subnet => write!(f, "subnet"),
            ResourceKind::Router => write!(f, "router"),
            ResourceKind::SecurityGroup => write!(f, "security group"),
            ResourceKind::FloatingIpPool => write!(f, "floating ip pool"),
        }
    }
}

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("{kind} not found: {name}")]
    ResourceNotFound { kind: ResourceKind, name: String },

    #[error("{kind} {name:?} already exists but was not created by clusternet for this cluster")]
    NameTaken { kind: ResourceKind, name: String },

    #[error("network {0:?} is not an external network")]
    NotExternal(String),

    #[error("Ambiguous resource: {0}")]
    AmbiguousResource(String),

    #[error("Transient cloud error: {0}")]
    Transient(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error: {0}")]
    Api(String),

    #[error("cleanup stopped after deleting [{}]: {source}", .deleted.join(", "))]
    PartialCleanup {
        deleted: Vec<String>,
        #[source]
        source: Box<CloudError>,
    },

    #[error("failed to {operation} {resource:?}: {source}")]
    Step {
        operation: &'static str,
        resource: String,
        #[source]
        source: Box<CloudError>,
    },

    #[error("Invalid cloud spec: {0}")]
    InvalidSpec(String),

    #[error("State file error: {0}")]
    State(String),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by callers to decide between retry and
/// terminal failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    ResourceNotFound,
    NameTaken,
    NotExternal,
    AmbiguousResource,
    Transient,
    PartialCleanup,
    Api,
    InvalidSpec,
    State,
    Lock,
    Io,
}

impl CloudError {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        CloudError::ResourceNotFound {
            kind,
            name: name.into(),
        }
    }

    /// Classification, looking through [`CloudError::Step`] context
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::Configuration(_) => ErrorKind::Configuration,
            CloudError::Authentication(_) => ErrorKind::Authentication,
            CloudError::ResourceNotFound { .. } => ErrorKind::ResourceNotFound,
            CloudError::NameTaken { .. } => ErrorKind::NameTaken,
            CloudError::NotExternal(_) => ErrorKind::NotExternal,
            CloudError::AmbiguousResource(_) => ErrorKind::AmbiguousResource,
            CloudError::Transient(_) | CloudError::Timeout(_) => ErrorKind::Transient,
            CloudError::Api(_) => ErrorKind::Api,
            CloudError::PartialCleanup { .. } => ErrorKind::PartialCleanup,
            CloudError::Step { source, .. } => source.kind(),
            CloudError::InvalidSpec(_) => ErrorKind::InvalidSpec,
            CloudError::State(_) | CloudError::Json(_) => ErrorKind::State,
            CloudError::Lock(_) => ErrorKind::Lock,
            CloudError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether re-invoking the same operation may succeed
    pub fn is_retriable(&self) -> bool {
        match self {
            CloudError::Transient(_) | CloudError::Timeout(_) => true,
            CloudError::Step { source, .. } | CloudError::PartialCleanup { source, .. } => {
                source.is_retriable()
            }
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), CloudError::ResourceNotFound { .. })
    }

    /// The innermost error with all operation context removed
    pub fn root(&self) -> &CloudError {
        match self {
            CloudError::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attach operation context to a failed cloud call
pub trait StepContext<T> {
    fn step(self, operation: &'static str, resource: &str) -> Result<T>;
}

impl<T> StepContext<T> for Result<T> {
    fn step(self, operation: &'static str, resource: &str) -> Result<T> {
        self.map_err(|source| CloudError::Step {
            operation,
            resource: resource.to_string(),
            source: Box::new(source),
        })
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
