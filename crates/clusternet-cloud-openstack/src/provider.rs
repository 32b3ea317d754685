//! OpenStack connector and provider

use crate::error::OpenstackError;
use crate::keystone;
use crate::neutron::NeutronClient;
use async_trait::async_trait;
use clusternet_cloud::{
    CloudClient, CloudError, Connector, Credentials, NetworkProvider, ProviderOptions, Result,
};
use clusternet_config::{DatacenterMeta, DatacenterRegistry};
use std::sync::Arc;

pub const PROVIDER_NAME: &str = "openstack";

/// The network lifecycle over Keystone and Neutron
pub type OpenstackProvider = NetworkProvider<OpenstackConnector>;

/// Authenticates against Keystone and hands out Neutron clients
#[derive(Debug, Clone, Default)]
pub struct OpenstackConnector {
    http: reqwest::Client,
}

impl OpenstackConnector {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Connector for OpenstackConnector {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn connect(
        &self,
        datacenter: &DatacenterMeta,
        credentials: &Credentials,
    ) -> Result<Box<dyn CloudClient>> {
        let openstack = datacenter.spec.openstack.as_ref().ok_or_else(|| {
            CloudError::Configuration(format!(
                "datacenter {} has no openstack configuration",
                datacenter.location
            ))
        })?;

        let Credentials::Openstack(credentials) = credentials;
        let session = keystone::authenticate(&self.http, openstack, credentials)
            .await
            .map_err(|e| match e {
                OpenstackError::Status { status: 404, .. } => CloudError::Configuration(format!(
                    "no Keystone v3 identity service at {}",
                    openstack.auth_url
                )),
                other => other.into(),
            })?;

        tracing::info!(
            region = %openstack.region,
            user = %credentials.username,
            "Authenticated against Keystone"
        );
        Ok(Box::new(NeutronClient::new(self.http.clone(), session)))
    }
}

/// Provider for the datacenters of `registry`
pub fn openstack_provider(
    registry: Arc<DatacenterRegistry>,
    options: ProviderOptions,
) -> OpenstackProvider {
    NetworkProvider::new(OpenstackConnector::default(), registry).with_options(options)
}
