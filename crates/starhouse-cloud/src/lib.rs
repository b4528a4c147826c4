#![forbid(unsafe_code)]
//! starhouse-cloud: provisions the warehouse cluster.
//!
//! The provisioner depends only on the collaborator traits in [`api`]; pick a
//! backend with [`MemoryCloud`] (tests, `--dry-run`) or `AwsCloud` (feature
//! `aws`).

pub mod api;
pub mod error;
pub mod memory;
pub mod poll;
pub mod provisioner;

#[cfg(feature = "aws")]
pub mod aws;

pub use api::{
    ClusterDescription, CloudApi, CreateClusterRequest, CreateRoleRequest, Endpoint, IdentityApi,
    IngressRule, NetworkApi, SecurityGroup, WarehouseApi,
};
pub use error::{CloudError, CloudResult, ProvisionError, Result};
pub use memory::{CloudOp, MemoryCloud};
pub use poll::{poll_until_available, CancelToken, PollPolicy};
pub use provisioner::{
    provision, AvailableCluster, IngressOutcome, ProvisionOutcome, ProvisionState, Provisioner,
};

#[cfg(feature = "aws")]
pub use aws::{classify_aws_error, AwsCloud};
