//! Cloud collaborator interfaces.
//!
//! The provisioner only talks to these traits. `MemoryCloud` implements them
//! for tests and dry runs; `AwsCloud` (feature `aws`) for real accounts.
//! All calls are blocking.

use std::fmt;

use serde::{Deserialize, Serialize};

use starhouse_core::config::{ClusterConfig, ClusterType};
use starhouse_core::id::{ClusterId, RoleArn, SecurityGroupId, VpcId};

use crate::error::CloudResult;

/// Status string that ends the polling loop (compared ignoring ASCII case).
pub const AVAILABLE_STATUS: &str = "available";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: String,
    /// Trust policy document (JSON).
    pub assume_role_policy: String,
}

impl CreateRoleRequest {
    /// Role the warehouse service can assume to read object storage.
    pub fn for_warehouse(name: impl Into<String>) -> Self {
        let policy = serde_json::json!({
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": { "Service": "redshift.amazonaws.com" }
            }],
            "Version": "2012-10-17"
        });
        Self {
            name: name.into(),
            description: "Allows Redshift clusters to call AWS services on your behalf.".into(),
            assume_role_policy: policy.to_string(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CreateClusterRequest {
    pub cluster_id: ClusterId,
    pub cluster_type: ClusterType,
    pub node_type: String,
    pub num_nodes: u32,
    pub db_name: String,
    pub master_username: String,
    pub master_password: String,
    pub port: u16,
    pub iam_roles: Vec<RoleArn>,
}

impl CreateClusterRequest {
    pub fn from_config(cfg: &ClusterConfig, role: &RoleArn) -> Self {
        Self {
            cluster_id: cfg.cluster_id.clone(),
            cluster_type: cfg.cluster_type,
            node_type: cfg.node_type.clone(),
            num_nodes: cfg.num_nodes,
            db_name: cfg.database.name.clone(),
            master_username: cfg.database.user.clone(),
            master_password: cfg.database.password.clone(),
            port: cfg.database.port,
            iam_roles: vec![role.clone()],
        }
    }
}

impl fmt::Debug for CreateClusterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateClusterRequest")
            .field("cluster_id", &self.cluster_id)
            .field("cluster_type", &self.cluster_type)
            .field("node_type", &self.node_type)
            .field("num_nodes", &self.num_nodes)
            .field("db_name", &self.db_name)
            .field("master_username", &self.master_username)
            .field("master_password", &"<redacted>")
            .field("port", &self.port)
            .field("iam_roles", &self.iam_roles)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

/// Snapshot of a cluster as reported by the warehouse service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescription {
    pub cluster_id: ClusterId,
    pub status: String,
    pub node_type: String,
    pub num_nodes: u32,
    pub db_name: String,
    pub master_username: String,
    pub endpoint: Option<Endpoint>,
    pub vpc_id: Option<VpcId>,
    pub iam_roles: Vec<RoleArn>,
}

impl ClusterDescription {
    pub fn is_available(&self) -> bool {
        self.status.eq_ignore_ascii_case(AVAILABLE_STATUS)
    }
}

/// Inbound permission on a security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr: String,
}

impl IngressRule {
    pub fn tcp(port: u16, cidr: impl Into<String>) -> Self {
        Self {
            protocol: "tcp".into(),
            from_port: port,
            to_port: port,
            cidr: cidr.into(),
        }
    }

    /// True if `self` already grants everything `other` would.
    pub fn covers(&self, other: &IngressRule) -> bool {
        let proto_ok = self.protocol == "-1" || self.protocol.eq_ignore_ascii_case(&other.protocol);
        proto_ok
            && self.cidr == other.cidr
            && self.from_port <= other.from_port
            && self.to_port >= other.to_port
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: SecurityGroupId,
    pub name: String,
    pub vpc_id: VpcId,
    pub ingress: Vec<IngressRule>,
}

impl SecurityGroup {
    pub fn allows(&self, rule: &IngressRule) -> bool {
        self.ingress.iter().any(|r| r.covers(rule))
    }
}

/// Identity service: roles and their policies.
pub trait IdentityApi {
    /// Create a role. Fails with `AlreadyExists` if the name is taken.
    fn create_role(&self, req: &CreateRoleRequest) -> CloudResult<()>;

    fn attach_role_policy(&self, role: &str, policy_arn: &str) -> CloudResult<()>;

    /// Resolve a role name. Fails with `NotFound` if there is no such role.
    fn get_role_arn(&self, role: &str) -> CloudResult<RoleArn>;
}

/// Warehouse service: cluster lifecycle.
pub trait WarehouseApi {
    /// Start creating a cluster. Fails with `AlreadyExists` if the id is taken.
    fn create_cluster(&self, req: &CreateClusterRequest) -> CloudResult<()>;

    /// Current state. Fails with `NotFound` if there is no such cluster.
    fn describe_cluster(&self, id: &ClusterId) -> CloudResult<ClusterDescription>;
}

/// Compute/network service: security groups of a VPC.
pub trait NetworkApi {
    /// Security groups of `vpc`, in the order the provider returns them.
    fn security_groups(&self, vpc: &VpcId) -> CloudResult<Vec<SecurityGroup>>;

    /// Add an inbound rule. Fails with `AlreadyExists` for a duplicate rule.
    fn authorize_ingress(&self, group: &SecurityGroupId, rule: &IngressRule) -> CloudResult<()>;
}

/// Everything the provisioner needs from one provider account.
pub trait CloudApi: IdentityApi + WarehouseApi + NetworkApi {}

impl<T: IdentityApi + WarehouseApi + NetworkApi> CloudApi for T {}
