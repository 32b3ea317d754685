//! clusternet cloud infrastructure
//!
//! Provider-agnostic lifecycle for the network substrate of a Kubernetes
//! cluster: validate a [`CloudSpec`], initialize the network, router,
//! subnet, security group and floating IP pool, and clean up exactly the
//! resources that were created.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │             caller (clusternet CLI)              │
//! │        validate / init / cleanup + persist       │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               clusternet-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait CloudProvider                      │   │
//! │  │  NetworkProvider<C: Connector>            │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  CloudSpec   │  │  SpecStore   │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │ trait CloudClient
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │   openstack   │ │   in-memory   │
//! │   connector   │ │   connector   │
//! └───────────────┘ └───────────────┘
//! ```

pub mod client;
pub mod error;
pub mod memory;
pub mod naming;
pub mod provider;
pub mod spec;
pub mod store;

// Re-exports
pub use client::{
    CloudClient, Direction, EtherType, NetworkRef, Protocol, RouterRef, RuleRemote,
    SecurityGroupRef, SecurityGroupRule, SecurityGroupSpec, SubnetRef, SubnetSpec,
};
pub use error::{CloudError, ErrorKind, ResourceKind, Result};
pub use memory::{Call, CallKind, Failure, InMemoryCloud, MemoryConnector};
pub use provider::{
    Checkpoint, CloudProvider, Connector, NetworkProvider, NoCheckpoint, ProviderOptions,
};
pub use spec::{CloudSpec, Credentials, OpenstackCredentials};
pub use store::{SpecLock, SpecStore, StoreCheckpoint, StoredSpec};
