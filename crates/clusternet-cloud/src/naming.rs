//! Resource naming
//!
//! Cluster scoped resources get deterministic names so a retried initialize
//! can find what an earlier attempt created. Node classes get a random suffix
//! drawn from a caller supplied random source.

use crate::error::{CloudError, Result};
use rand::{Rng, RngCore};

pub const RESOURCE_PREFIX: &str = "clusternet";

const UID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const NODE_CLASS_UID_LEN: usize = 5;
const MAX_CLUSTER_NAME_LEN: usize = 63;

/// Name shared by the network, subnet, router and security group of a cluster
pub fn resource_name(cluster_name: &str) -> String {
    format!("{}-{}", RESOURCE_PREFIX, cluster_name)
}

/// Description stamped on every resource created for a cluster
///
/// Only resources carrying it are reused by a retried initialize.
pub fn ownership_marker(cluster_name: &str) -> String {
    format!("{}:{}", RESOURCE_PREFIX, cluster_name)
}

/// Random lowercase alphanumeric identifier
pub fn short_uid(rng: &mut dyn RngCore, len: usize) -> String {
    (0..len)
        .map(|_| UID_ALPHABET[rng.gen_range(0..UID_ALPHABET.len())] as char)
        .collect()
}

pub fn node_class_name(rng: &mut dyn RngCore) -> String {
    format!("{}-{}", RESOURCE_PREFIX, short_uid(rng, NODE_CLASS_UID_LEN))
}

/// Cluster names end up in resource names: require a DNS-1123 label
pub fn validate_cluster_name(name: &str) -> Result<()> {
    let valid_chars = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    let valid_edges = name
        .bytes()
        .next()
        .zip(name.bytes().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    if name.len() > MAX_CLUSTER_NAME_LEN || !valid_chars || !valid_edges {
        return Err(CloudError::InvalidSpec(format!(
            "cluster name {:?} must be a lowercase DNS label of at most {} characters",
            name, MAX_CLUSTER_NAME_LEN
        )));
    }
    Ok(())
}
