//! Network lifecycle against the in-memory backend

mod common;

use clusternet_cloud::{
    CallKind, CloudError, CloudProvider, CloudSpec, ErrorKind, Failure, NoCheckpoint,
    ProviderOptions, ResourceKind,
};
use common::{RecordingCheckpoint, cloud_with_ext_net, fresh_spec, provider};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn mutation_kinds(cloud: &clusternet_cloud::InMemoryCloud) -> Vec<CallKind> {
    cloud.mutations().into_iter().map(|c| c.kind).collect()
}

fn assert_network_all_or_nothing(spec: &CloudSpec) {
    let set = [spec.network(), spec.subnet_id(), spec.router_id()]
        .iter()
        .filter(|v| v.is_some())
        .count();
    if spec.network_created() {
        assert_eq!(set, 3, "created network must record all identifiers: {:?}", spec);
    }
}

/// Initialize a fresh spec for cluster `demo` on dc1
async fn initialized(cloud: &clusternet_cloud::InMemoryCloud) -> CloudSpec {
    let mut spec = fresh_spec();
    provider(cloud)
        .initialize(&mut spec, "demo", &NoCheckpoint)
        .await
        .unwrap();
    spec
}

#[tokio::test]
async fn test_initialize_fresh_spec() {
    let cloud = cloud_with_ext_net();
    let spec = initialized(&cloud).await;

    assert_eq!(spec.floating_ip_pool(), Some("ext-net"));
    assert_eq!(spec.security_groups().len(), 1);
    assert!(spec.security_groups().iter().all(|g| g.contains("demo")));
    assert_eq!(spec.network(), Some("clusternet-demo"));
    assert!(spec.subnet_id().is_some());
    assert!(spec.router_id().is_some());
    assert!(spec.network_created());
    assert!(spec.security_group_created());
    assert!(spec.is_initialized());

    assert_eq!(
        mutation_kinds(&cloud),
        vec![
            CallKind::CreateSecurityGroup,
            CallKind::AddSecurityGroupRules,
            CallKind::CreateNetwork,
            CallKind::CreateSubnet,
            CallKind::CreateRouter,
            CallKind::AttachSubnet,
            CallKind::SetRouterGateway,
        ]
    );
}

#[tokio::test]
async fn test_initialize_wires_router_and_subnet() {
    let cloud = clusternet_cloud::InMemoryCloud::new();
    let ext = cloud.add_external_network("ext-net");
    let spec = initialized(&cloud).await;

    let router_id = spec.router_id().unwrap();
    let subnet_id = spec.subnet_id().unwrap();

    let router = cloud.router(router_id).unwrap();
    assert_eq!(router.gateway_network_id.as_deref(), Some(ext.id.as_str()));
    assert_eq!(cloud.router_interfaces(router_id), vec![subnet_id.to_string()]);
    assert_eq!(
        cloud.subnet_dns_nameservers(subnet_id).unwrap(),
        vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()]
    );

    let rules = cloud.security_group_rules("clusternet-demo").unwrap();
    assert_eq!(rules.len(), 7);
}

#[tokio::test]
async fn test_reinitialize_is_noop() {
    let cloud = cloud_with_ext_net();
    let spec = initialized(&cloud).await;
    cloud.clear_calls();

    let mut again = spec.clone();
    assert_ok!(
        provider(&cloud)
            .initialize(&mut again, "demo", &NoCheckpoint)
            .await
    );

    assert_eq!(again, spec);
    assert!(cloud.calls().is_empty(), "calls: {:?}", cloud.calls());
}

#[tokio::test]
async fn test_cleanup_order_and_second_cleanup_noop() {
    let cloud = cloud_with_ext_net();
    let mut spec = initialized(&cloud).await;
    cloud.clear_calls();

    let provider = provider(&cloud);
    assert_ok!(provider.clean_up(&mut spec, &NoCheckpoint).await);

    assert_eq!(
        mutation_kinds(&cloud),
        vec![
            CallKind::DeleteSecurityGroup,
            CallKind::DetachSubnet,
            CallKind::DeleteNetwork,
            CallKind::DeleteRouter,
        ]
    );
    assert!(!spec.network_created());
    assert!(!spec.security_group_created());
    assert!(spec.network().is_none());
    assert!(spec.security_groups().is_empty());
    assert_eq!(spec.floating_ip_pool(), Some("ext-net"));

    // only the pre-existing external network is left
    assert_eq!(cloud.network_count(), 1);
    assert_eq!(cloud.subnet_count(), 0);
    assert_eq!(cloud.router_count(), 0);
    assert_eq!(cloud.security_group_count(), 0);

    cloud.clear_calls();
    assert_ok!(provider.clean_up(&mut spec, &NoCheckpoint).await);
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn test_cleanup_leaves_external_infrastructure() {
    let cloud = cloud_with_ext_net();
    cloud.add_network("tenant-net");
    cloud.add_security_group("default");

    let mut spec = fresh_spec()
        .with_network("tenant-net")
        .with_security_groups(["default"])
        .with_floating_ip_pool("ext-net");
    let original = spec.clone();
    let provider = provider(&cloud);

    assert_ok!(provider.initialize(&mut spec, "demo", &NoCheckpoint).await);
    assert_ok!(provider.clean_up(&mut spec, &NoCheckpoint).await);

    assert_eq!(spec, original);
    assert!(cloud.calls().is_empty());
    assert!(cloud.has_network("tenant-net"));
    assert_eq!(cloud.security_group_count(), 1);
}

#[tokio::test]
async fn test_partially_external_spec_only_owns_what_it_created() {
    let cloud = cloud_with_ext_net();
    cloud.add_network("tenant-net");

    let mut spec = fresh_spec().with_network("tenant-net");
    let provider = provider(&cloud);
    assert_ok!(provider.initialize(&mut spec, "demo", &NoCheckpoint).await);

    assert_eq!(spec.network(), Some("tenant-net"));
    assert!(!spec.network_created());
    assert!(spec.security_group_created());
    assert_eq!(
        mutation_kinds(&cloud),
        vec![
            CallKind::CreateSecurityGroup,
            CallKind::AddSecurityGroupRules
        ]
    );

    cloud.clear_calls();
    assert_ok!(provider.clean_up(&mut spec, &NoCheckpoint).await);
    assert_eq!(mutation_kinds(&cloud), vec![CallKind::DeleteSecurityGroup]);
    assert!(cloud.has_network("tenant-net"));
    assert_eq!(spec.network(), Some("tenant-net"));
}

#[tokio::test]
async fn test_failure_at_each_network_step_then_retry() {
    let steps = [
        CallKind::CreateNetwork,
        CallKind::CreateSubnet,
        CallKind::CreateRouter,
        CallKind::AttachSubnet,
        CallKind::SetRouterGateway,
    ];

    for step in steps {
        let cloud = cloud_with_ext_net();
        cloud.fail_next(step, Failure::Transient);
        let provider = provider(&cloud);

        let mut spec = fresh_spec();
        let err = assert_err!(provider.initialize(&mut spec, "demo", &NoCheckpoint).await);
        assert_eq!(err.kind(), ErrorKind::Transient, "step {:?}", step);
        assert!(err.is_retriable());

        // earlier steps stay recorded, the network step is all-or-nothing
        assert_eq!(spec.floating_ip_pool(), Some("ext-net"));
        assert!(spec.security_group_created());
        assert!(!spec.network_created(), "step {:?}", step);
        assert!(spec.network().is_none());
        assert!(spec.subnet_id().is_none());
        assert!(spec.router_id().is_none());

        assert_ok!(provider.initialize(&mut spec, "demo", &NoCheckpoint).await);
        assert!(spec.network_created());
        assert_network_all_or_nothing(&spec);

        // resources from the failed attempt were reused, not duplicated
        assert_eq!(cloud.network_count(), 2, "step {:?}", step);
        assert_eq!(cloud.subnet_count(), 1, "step {:?}", step);
        assert_eq!(cloud.router_count(), 1, "step {:?}", step);
        assert_eq!(cloud.security_group_count(), 1, "step {:?}", step);

        let router_id = spec.router_id().unwrap();
        assert_eq!(
            cloud.router_interfaces(router_id),
            vec![spec.subnet_id().unwrap().to_string()]
        );
        assert!(cloud.router(router_id).unwrap().gateway_network_id.is_some());
    }
}

#[tokio::test]
async fn test_security_group_failure_keeps_floating_ip_pool() {
    let cloud = cloud_with_ext_net();
    cloud.fail_next(CallKind::CreateSecurityGroup, Failure::Transient);

    let mut spec = fresh_spec();
    let err = assert_err!(
        provider(&cloud)
            .initialize(&mut spec, "demo", &NoCheckpoint)
            .await
    );

    assert!(err.is_retriable());
    assert_eq!(spec.floating_ip_pool(), Some("ext-net"));
    assert!(spec.security_groups().is_empty());
    assert!(!spec.owns_resources());
}

#[tokio::test]
async fn test_rules_missing_after_failed_attempt_are_added_on_retry() {
    let cloud = cloud_with_ext_net();
    cloud.fail_next(CallKind::AddSecurityGroupRules, Failure::Transient);
    let provider = provider(&cloud);

    let mut spec = fresh_spec();
    let err = assert_err!(provider.initialize(&mut spec, "demo", &NoCheckpoint).await);
    assert!(err.is_retriable());
    assert!(spec.security_groups().is_empty());
    assert_eq!(
        cloud.security_group_rules("clusternet-demo").map(|r| r.len()),
        Some(0)
    );

    assert_ok!(provider.initialize(&mut spec, "demo", &NoCheckpoint).await);
    assert!(spec.security_group_created());
    assert_eq!(cloud.security_group_count(), 1);
    assert_eq!(
        cloud.security_group_rules("clusternet-demo").map(|r| r.len()),
        Some(7)
    );
}

#[tokio::test]
async fn test_foreign_network_with_cluster_name_is_not_claimed() {
    let cloud = cloud_with_ext_net();
    cloud.add_network("clusternet-demo");
    let provider = provider(&cloud);

    let mut spec = fresh_spec();
    let err = assert_err!(provider.initialize(&mut spec, "demo", &NoCheckpoint).await);
    assert_eq!(err.kind(), ErrorKind::NameTaken);
    assert!(!err.is_retriable());
    assert!(matches!(
        err.root(),
        CloudError::NameTaken {
            kind: ResourceKind::Network,
            ..
        }
    ));
    assert!(!spec.network_created());
    assert!(spec.network().is_none());
    assert!(
        !mutation_kinds(&cloud).contains(&CallKind::CreateNetwork),
        "mutations: {:?}",
        cloud.mutations()
    );

    // cleanup removes the group this run created and nothing else
    assert_ok!(provider.clean_up(&mut spec, &NoCheckpoint).await);
    assert!(cloud.has_network("clusternet-demo"));
    assert_eq!(cloud.security_group_count(), 0);
    assert!(!spec.owns_resources());
}

#[tokio::test]
async fn test_foreign_security_group_with_cluster_name_is_not_claimed() {
    let cloud = cloud_with_ext_net();
    cloud.add_security_group("clusternet-demo");

    let mut spec = fresh_spec();
    let err = assert_err!(
        provider(&cloud)
            .initialize(&mut spec, "demo", &NoCheckpoint)
            .await
    );
    assert_eq!(err.kind(), ErrorKind::NameTaken);
    assert!(spec.security_groups().is_empty());
    assert!(!spec.owns_resources());
    assert!(mutation_kinds(&cloud).is_empty());
    assert_eq!(
        cloud.security_group_rules("clusternet-demo").map(|r| r.len()),
        Some(0)
    );
}

#[tokio::test]
async fn test_checkpoint_after_every_step() {
    let cloud = cloud_with_ext_net();
    let provider = provider(&cloud);
    let checkpoint = RecordingCheckpoint::default();

    let mut spec = fresh_spec();
    assert_ok!(provider.initialize(&mut spec, "demo", &checkpoint).await);

    let snapshots = checkpoint.snapshots();
    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[0].floating_ip_pool(), Some("ext-net"));
    assert!(snapshots[0].security_groups().is_empty());
    assert!(snapshots[1].security_group_created());
    assert!(!snapshots[1].network_created());
    assert_eq!(snapshots[2], spec);

    let checkpoint = RecordingCheckpoint::default();
    assert_ok!(provider.clean_up(&mut spec, &checkpoint).await);

    let snapshots = checkpoint.snapshots();
    assert_eq!(snapshots.len(), 2);
    assert!(!snapshots[0].security_group_created());
    assert!(snapshots[0].network_created());
    assert!(!snapshots[1].owns_resources());
}

#[tokio::test]
async fn test_partial_cleanup_resumes() {
    let cloud = cloud_with_ext_net();
    let mut spec = initialized(&cloud).await;
    let provider = provider(&cloud);

    cloud.fail_next(CallKind::DeleteRouter, Failure::Transient);
    let err = assert_err!(provider.clean_up(&mut spec, &NoCheckpoint).await);

    assert_eq!(err.kind(), ErrorKind::PartialCleanup);
    assert!(err.is_retriable());
    match &err {
        CloudError::PartialCleanup { deleted, .. } => {
            assert!(deleted.iter().any(|d| d.contains("security group")));
            assert!(deleted.iter().any(|d| d.contains("network")));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // security group is gone, the network ledger stays for the retry
    assert!(!spec.security_group_created());
    assert!(spec.network_created());
    assert_network_all_or_nothing(&spec);

    // detach and network delete now hit missing resources, which counts as done
    assert_ok!(provider.clean_up(&mut spec, &NoCheckpoint).await);
    assert!(!spec.owns_resources());
    assert_eq!(cloud.router_count(), 0);
    assert_eq!(cloud.network_count(), 1);
}

#[tokio::test]
async fn test_cleanup_failure_before_any_deletion_is_not_partial() {
    let cloud = cloud_with_ext_net();
    let mut spec = initialized(&cloud).await;
    let before = spec.clone();

    cloud.fail_next(
        CallKind::DeleteSecurityGroup,
        Failure::Api("409 Conflict: in use".to_string()),
    );
    let err = assert_err!(provider(&cloud).clean_up(&mut spec, &NoCheckpoint).await);

    assert_eq!(err.kind(), ErrorKind::Api);
    assert!(!err.is_retriable());
    assert_eq!(spec, before);
}

#[tokio::test]
async fn test_cleanup_treats_missing_security_group_as_deleted() {
    let cloud = cloud_with_ext_net();
    let mut spec = initialized(&cloud).await;

    cloud.fail_next(CallKind::DeleteSecurityGroup, Failure::NotFound);
    assert_ok!(provider(&cloud).clean_up(&mut spec, &NoCheckpoint).await);
    assert!(!spec.owns_resources());
}

#[tokio::test]
async fn test_validate_rejects_missing_security_group() {
    let cloud = cloud_with_ext_net();
    let spec = fresh_spec().with_security_groups(["missing"]);
    let before = spec.clone();

    let err = assert_err!(provider(&cloud).validate(&spec).await);

    assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    assert!(matches!(
        err.root(),
        CloudError::ResourceNotFound {
            kind: ResourceKind::SecurityGroup,
            name,
        } if name == "missing"
    ));
    assert_eq!(spec, before);
    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn test_validate_references() {
    let cloud = cloud_with_ext_net();
    cloud.add_network("tenant-net");
    cloud.add_security_group("default");
    let provider = provider(&cloud);

    let valid = fresh_spec()
        .with_network("tenant-net")
        .with_security_groups(["default"])
        .with_floating_ip_pool("ext-net");
    assert_ok!(provider.validate(&valid).await);

    let missing_network = fresh_spec().with_network("nope");
    let err = assert_err!(provider.validate(&missing_network).await);
    assert_eq!(err.kind(), ErrorKind::ResourceNotFound);

    let internal_pool = fresh_spec().with_floating_ip_pool("tenant-net");
    let err = assert_err!(provider.validate(&internal_pool).await);
    assert_eq!(err.kind(), ErrorKind::NotExternal);

    let missing_pool = fresh_spec().with_floating_ip_pool("gone");
    let err = assert_err!(provider.validate(&missing_pool).await);
    assert!(matches!(
        err.root(),
        CloudError::ResourceNotFound { kind: ResourceKind::FloatingIpPool, .. }
    ));

    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn test_unknown_datacenter_is_configuration_error() {
    let cloud = cloud_with_ext_net();
    let provider = provider(&cloud);

    let spec = CloudSpec::new("dc9", common::credentials());
    let err = assert_err!(provider.validate(&spec).await);
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!err.is_retriable());

    let mut spec = CloudSpec::new("bare", common::credentials());
    let err = assert_err!(provider.initialize(&mut spec, "demo", &NoCheckpoint).await);
    assert_eq!(err.kind(), ErrorKind::Configuration);

    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn test_rejected_credentials() {
    let cloud = cloud_with_ext_net();
    cloud.reject_password("s3cret");

    let mut spec = fresh_spec();
    let err = assert_err!(
        provider(&cloud)
            .initialize(&mut spec, "demo", &NoCheckpoint)
            .await
    );

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(!err.is_retriable());
    assert_eq!(spec, fresh_spec());
}

#[tokio::test]
async fn test_external_network_must_be_unique() {
    let cloud = clusternet_cloud::InMemoryCloud::new();
    let mut spec = fresh_spec();
    let err = assert_err!(
        provider(&cloud)
            .initialize(&mut spec, "demo", &NoCheckpoint)
            .await
    );
    assert_eq!(err.kind(), ErrorKind::AmbiguousResource);
    assert_eq!(spec, fresh_spec());

    cloud.add_external_network("ext-a");
    cloud.add_external_network("ext-b");
    let err = assert_err!(
        provider(&cloud)
            .initialize(&mut spec, "demo", &NoCheckpoint)
            .await
    );
    assert_eq!(err.kind(), ErrorKind::AmbiguousResource);
    assert!(err.to_string().contains("ext-a"));
    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn test_invalid_cluster_name() {
    let cloud = cloud_with_ext_net();
    let mut spec = fresh_spec();

    let err = assert_err!(
        provider(&cloud)
            .initialize(&mut spec, "Demo_1", &NoCheckpoint)
            .await
    );
    assert_eq!(err.kind(), ErrorKind::InvalidSpec);
    assert!(cloud.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hung_call_times_out() {
    let cloud = cloud_with_ext_net();
    cloud.fail_next(CallKind::CreateNetwork, Failure::Hang);
    let provider = provider(&cloud).with_options(ProviderOptions {
        call_timeout: Duration::from_secs(5),
    });

    let mut spec = fresh_spec();
    let err = assert_err!(provider.initialize(&mut spec, "demo", &NoCheckpoint).await);

    assert!(matches!(err.root(), CloudError::Timeout(d) if *d == Duration::from_secs(5)));
    assert!(err.is_retriable());
    assert!(err.to_string().contains("create network"));
    assert!(!spec.network_created());
}

#[test]
fn test_node_class_name_uses_given_rng() {
    let cloud = cloud_with_ext_net();
    let provider = provider(&cloud);

    let a = provider.node_class_name(&mut StdRng::seed_from_u64(3));
    let b = provider.node_class_name(&mut StdRng::seed_from_u64(3));
    assert_eq!(a, b);
    assert!(a.starts_with("clusternet-"));
    assert!(cloud.calls().is_empty());
}
