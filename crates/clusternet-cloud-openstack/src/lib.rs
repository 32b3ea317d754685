//! OpenStack backend for clusternet
//!
//! Implements [`clusternet_cloud::Connector`] over the OpenStack REST APIs:
//! Keystone v3 password authentication, then Neutron v2.0 for networks,
//! subnets, routers and security groups.
//!
//! # Example
//!
//! ```ignore
//! use clusternet_cloud::{CloudProvider, NoCheckpoint, ProviderOptions};
//! use clusternet_cloud_openstack::openstack_provider;
//!
//! let provider = openstack_provider(registry, ProviderOptions::default());
//! provider.validate(&spec).await?;
//! provider.initialize(&mut spec, "demo", &NoCheckpoint).await?;
//! ```

pub mod error;
pub mod keystone;
pub mod neutron;
pub mod provider;

pub use error::{OpenstackError, Result};
pub use neutron::NeutronClient;
pub use provider::{OpenstackConnector, OpenstackProvider, PROVIDER_NAME, openstack_provider};
