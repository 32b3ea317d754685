use clusternet_cloud::{
    Checkpoint, CloudSpec, Credentials, InMemoryCloud, MemoryConnector, NetworkProvider,
    OpenstackCredentials, Result,
};
use clusternet_config::DatacenterRegistry;
use std::sync::{Arc, Mutex};

pub const DATACENTERS: &str = r#"
datacenters:
  dc1:
    location: Hamburg
    country: DE
    spec:
      openstack:
        auth_url: https://keystone.example.com:5000/v3
        region: RegionOne
        dns_servers: [8.8.8.8, 8.8.4.4]
  bare:
    location: Nowhere
"#;

pub fn datacenters() -> Arc<DatacenterRegistry> {
    Arc::new(DatacenterRegistry::from_yaml_str(DATACENTERS).unwrap())
}

pub fn credentials() -> Credentials {
    Credentials::Openstack(OpenstackCredentials::new("admin", "s3cret", "Default", "demo"))
}

pub fn fresh_spec() -> CloudSpec {
    CloudSpec::new("dc1", credentials())
}

/// A cloud with exactly one external network `ext-net`
pub fn cloud_with_ext_net() -> InMemoryCloud {
    let cloud = InMemoryCloud::new();
    cloud.add_external_network("ext-net");
    cloud
}

pub fn provider(cloud: &InMemoryCloud) -> NetworkProvider<MemoryConnector> {
    NetworkProvider::new(MemoryConnector::new(cloud.clone()), datacenters())
}

/// Checkpoint keeping every saved snapshot
#[derive(Default)]
pub struct RecordingCheckpoint {
    snapshots: Mutex<Vec<CloudSpec>>,
}

impl RecordingCheckpoint {
    pub fn snapshots(&self) -> Vec<CloudSpec> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Checkpoint for RecordingCheckpoint {
    async fn save(&self, spec: &CloudSpec) -> Result<()> {
        self.snapshots.lock().unwrap().push(spec.clone());
        Ok(())
    }
}
