//! Provisioning against the in-memory cloud.


use std::thread;
use std::time::Duration;

use starhouse_cloud::{
    CancelToken, CloudError, CloudOp, IngressOutcome, IngressRule, MemoryCloud, PollPolicy,
    ProvisionError, ProvisionState, Provisioner,
};
use starhouse_core::config::DEFAULT_ROLE_POLICY_ARN;
use starhouse_core::id::SecurityGroupId;
use test_data_gen::cluster_config;

fn sg() -> SecurityGroupId {
    SecurityGroupId::from("sg-0a1b2c3d")
}

#[test]
fn happy_path_reports_endpoint_role_and_ingress() {
    let cloud = MemoryCloud::default();
    let cfg = cluster_config();
    let outcome = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(10))
        .run()
        .unwrap();

    assert_eq!(outcome.cluster_id.as_str(), "dwhcluster");
    assert_eq!(
        outcome.endpoint.address,
        "dwhcluster.c0ffee12.us-west-2.redshift.amazonaws.com"
    );
    assert_eq!(outcome.endpoint.port, 5439);
    assert_eq!(outcome.role_arn.as_str(), "arn:aws:iam::123456789012:role/dwhRole");
    assert_eq!(outcome.ingress, IngressOutcome::Authorized { group: sg() });
    assert!(outcome.warnings.is_empty());
    assert!(!outcome.connection_url.contains("Passw0rd"));

    assert_eq!(
        cloud.role_policies("dwhRole").unwrap(),
        vec![DEFAULT_ROLE_POLICY_ARN.to_string()]
    );
    assert_eq!(cloud.ingress_rules(&sg()), vec![IngressRule::tcp(5439, "0.0.0.0/0")]);
    assert_eq!(cloud.cluster_count(), 1);
    assert_eq!(
        cloud.calls(),
        vec![
            CloudOp::CreateRole,
            CloudOp::GetRoleArn,
            CloudOp::AttachRolePolicy,
            CloudOp::CreateCluster,
            CloudOp::DescribeCluster,
            CloudOp::DescribeCluster,
            CloudOp::SecurityGroups,
            CloudOp::AuthorizeIngress,
        ]
    );
}

#[test]
fn status_is_matched_case_insensitively() {
    let cloud = MemoryCloud::default().with_status_script(["creating", "modifying", "Available"]);
    let cfg = cluster_config();
    let outcome = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(10))
        .run()
        .unwrap();
    assert_eq!(outcome.endpoint.port, 5439);
    assert_eq!(cloud.call_count(CloudOp::DescribeCluster), 3);
}

#[test]
fn never_available_times_out_after_bounded_attempts() {
    let cloud = MemoryCloud::default().with_status_script(["creating"]);
    let cfg = cluster_config();
    let err = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(5))
        .run()
        .unwrap_err();

    match err {
        ProvisionError::Timeout {
            attempts,
            last_status,
            ..
        } => {
            assert_eq!(attempts, 5);
            assert_eq!(last_status, "creating");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(cloud.call_count(CloudOp::DescribeCluster), 5);
    assert_eq!(cloud.call_count(CloudOp::AuthorizeIngress), 0);
}

#[test]
fn cluster_creation_failure_is_fatal() {
    let cloud = MemoryCloud::default();
    cloud.fail_next(
        CloudOp::CreateCluster,
        CloudError::Service {
            code: "ClusterQuotaExceeded".into(),
            message: "quota exceeded".into(),
        },
    );
    let cfg = cluster_config();
    let err = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(5))
        .run()
        .unwrap_err();

    assert!(matches!(err, ProvisionError::ClusterCreation { .. }), "{err:?}");
    assert!(!err.is_recoverable());
    assert_eq!(cloud.call_count(CloudOp::DescribeCluster), 0);
}

#[test]
fn vanished_cluster_is_reported_as_not_found() {
    let cloud = MemoryCloud::default();
    cloud.fail_next(
        CloudOp::DescribeCluster,
        CloudError::not_found("cluster", "Cluster dwhcluster not found."),
    );
    let cfg = cluster_config();
    let err = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(5))
        .run()
        .unwrap_err();
    assert!(matches!(err, ProvisionError::ClusterNotFound { .. }), "{err:?}");
}

#[test]
fn existing_role_and_cluster_are_reused() {
    let cloud = MemoryCloud::default();
    let cfg = cluster_config();
    let first = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(10))
        .run()
        .unwrap();

    let second = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(10))
        .run()
        .unwrap();

    assert_eq!(first.endpoint, second.endpoint);
    assert_eq!(first.role_arn, second.role_arn);
    assert_eq!(second.ingress, IngressOutcome::AlreadyPresent { group: sg() });
    assert!(second.warnings.is_empty());
    assert_eq!(cloud.cluster_count(), 1);
    assert_eq!(cloud.ingress_rules(&sg()).len(), 1);
    // The second run found the rule and never tried to add it again.
    assert_eq!(cloud.call_count(CloudOp::AuthorizeIngress), 1);
}

#[test]
fn seeded_role_is_not_an_error() {
    let cloud = MemoryCloud::default();
    let arn = cloud.seed_role("dwhRole");
    let cfg = cluster_config();
    let outcome = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(10))
        .run()
        .unwrap();
    assert_eq!(outcome.role_arn, arn);
    assert!(outcome.warnings.is_empty());
}

#[test]
fn role_creation_error_is_a_warning() {
    let cloud = MemoryCloud::default();
    cloud.seed_role("dwhRole");
    cloud.fail_next(
        CloudOp::CreateRole,
        CloudError::Service {
            code: "Throttling".into(),
            message: "rate exceeded".into(),
        },
    );
    let cfg = cluster_config();
    let outcome = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(10))
        .run()
        .unwrap();
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("Throttling"), "{:?}", outcome.warnings);
}

#[test]
fn role_lookup_failure_is_fatal() {
    let cloud = MemoryCloud::default();
    cloud.fail_next(CloudOp::GetRoleArn, CloudError::Transport("connection reset".into()));
    let cfg = cluster_config();
    let err = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(10))
        .run()
        .unwrap_err();
    assert!(matches!(err, ProvisionError::RoleLookup { .. }), "{err:?}");
    assert_eq!(cloud.call_count(CloudOp::CreateCluster), 0);
}

#[test]
fn unresolvable_role_is_a_lookup_failure() {
    let cloud = MemoryCloud::default();
    cloud.fail_next(
        CloudOp::CreateRole,
        CloudError::Service {
            code: "AccessDenied".into(),
            message: "not authorized to perform iam:CreateRole".into(),
        },
    );
    let cfg = cluster_config();
    let err = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(10))
        .run()
        .unwrap_err();

    match err {
        ProvisionError::RoleLookup { role, source } => {
            assert_eq!(role, "dwhRole");
            assert!(source.is_not_found(), "{source:?}");
        }
        other => panic!("expected role lookup failure, got {other:?}"),
    }
    assert_eq!(cloud.call_count(CloudOp::AttachRolePolicy), 0);
    assert_eq!(cloud.call_count(CloudOp::CreateCluster), 0);
}

#[test]
fn duplicate_rule_from_service_counts_as_present() {
    let cloud = MemoryCloud::default();
    cloud.fail_next(
        CloudOp::AuthorizeIngress,
        CloudError::already_exists("ingress rule", "InvalidPermission.Duplicate"),
    );
    let cfg = cluster_config();
    let outcome = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(10))
        .run()
        .unwrap();
    assert_eq!(outcome.ingress, IngressOutcome::AlreadyPresent { group: sg() });
}

#[test]
fn missing_security_group_is_a_warning_not_a_failure() {
    let cloud = MemoryCloud::default().without_security_groups();
    let cfg = cluster_config();
    let outcome = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(PollPolicy::immediate(10))
        .run()
        .unwrap();
    assert!(matches!(outcome.ingress, IngressOutcome::Skipped { .. }));
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.endpoint.port, 5439);
}

#[test]
fn steps_advance_state() {
    let cloud = MemoryCloud::default();
    let cfg = cluster_config();
    let mut p = Provisioner::new(&cloud, &cfg).with_poll_policy(PollPolicy::immediate(10));
    assert_eq!(p.state(), ProvisionState::Idle);

    let role = p.create_role().unwrap();
    assert_eq!(p.state(), ProvisionState::RoleReady);

    let cluster = p.create_cluster(&role).unwrap();
    assert_eq!(p.state(), ProvisionState::ClusterAvailable);
    assert_eq!(cluster.vpc_id.as_ref(), Some(cloud.vpc_id()));

    let vpc = cluster.vpc_id.clone().unwrap();
    p.open_ingress(&vpc).unwrap();
    assert_eq!(p.state(), ProvisionState::PortOpening);
    assert_eq!(cloud.ingress_rules(&sg()).len(), 1);
}

#[test]
fn opening_ingress_twice_on_one_provisioner_reports_present() {
    let cloud = MemoryCloud::default();
    let cfg = cluster_config();
    let mut p = Provisioner::new(&cloud, &cfg).with_poll_policy(PollPolicy::immediate(10));
    let role = p.create_role().unwrap();
    let vpc = p.create_cluster(&role).unwrap().vpc_id.unwrap();

    assert_eq!(
        p.open_ingress(&vpc).unwrap(),
        IngressOutcome::Authorized { group: sg() }
    );
    assert_eq!(
        p.open_ingress(&vpc).unwrap(),
        IngressOutcome::AlreadyPresent { group: sg() }
    );
    assert_eq!(p.state(), ProvisionState::PortOpening);
    assert_eq!(cloud.ingress_rules(&sg()).len(), 1);
    assert_eq!(cloud.call_count(CloudOp::AuthorizeIngress), 1);
}

#[test]
fn steps_out_of_order_are_rejected() {
    let cloud = MemoryCloud::default();
    let cfg = cluster_config();
    let mut p = Provisioner::new(&cloud, &cfg).with_poll_policy(PollPolicy::immediate(10));
    let vpc = cloud.vpc_id().clone();

    let err = p.open_ingress(&vpc).unwrap_err();
    assert!(
        matches!(
            err,
            ProvisionError::OutOfOrder {
                from: ProvisionState::Idle,
                to: ProvisionState::PortOpening
            }
        ),
        "{err:?}"
    );
    assert!(!err.is_recoverable());
    assert_eq!(p.state(), ProvisionState::Idle);

    p.create_role().unwrap();
    assert!(matches!(
        p.create_role().unwrap_err(),
        ProvisionError::OutOfOrder { .. }
    ));
    assert!(cloud.calls().iter().all(|op| *op != CloudOp::SecurityGroups));
}

#[test]
fn cancel_stops_polling() {
    let cloud = MemoryCloud::default().with_status_script(["creating"]);
    let cfg = cluster_config();
    let cancel = CancelToken::new();
    let canceller = cancel.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        canceller.cancel();
    });

    let policy = PollPolicy {
        interval: Duration::from_millis(20),
        max_wait: Some(Duration::from_secs(30)),
        max_attempts: None,
    };
    let err = Provisioner::new(&cloud, &cfg)
        .with_poll_policy(policy)
        .with_cancel_token(cancel)
        .run()
        .unwrap_err();
    handle.join().unwrap();

    assert!(matches!(err, ProvisionError::Cancelled { .. }), "{err:?}");
    assert_eq!(cloud.call_count(CloudOp::AuthorizeIngress), 0);
}
