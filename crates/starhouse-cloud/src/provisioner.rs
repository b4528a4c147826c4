//! Role → cluster → wait → ingress.
//!
//! `Provisioner` walks a fixed sequence of states. The only step that may be
//! entered again is ingress, once the cluster is available; any other
//! out-of-order call fails with `ProvisionError::OutOfOrder`. A fatal error
//! leaves it in the state where the failure happened. Steps
//! that may legitimately fail on a re-run (role already there, port already
//! open) are logged and recorded as warnings instead.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use starhouse_core::config::ClusterConfig;
use starhouse_core::id::{ClusterId, RoleArn, SecurityGroupId, VpcId};

use crate::api::{
    ClusterDescription, CloudApi, CreateClusterRequest, CreateRoleRequest, Endpoint, IngressRule,
};
use crate::error::{ProvisionError, Result};
use crate::poll::{poll_until_available, CancelToken, PollPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionState {
    Idle,
    RoleCreating,
    RoleReady,
    ClusterCreating,
    ClusterPolling,
    ClusterAvailable,
    PortOpening,
    Done,
}

impl ProvisionState {
    pub fn next(self) -> Option<Self> {
        use ProvisionState::*;
        match self {
            Idle => Some(RoleCreating),
            RoleCreating => Some(RoleReady),
            RoleReady => Some(ClusterCreating),
            ClusterCreating => Some(ClusterPolling),
            ClusterPolling => Some(ClusterAvailable),
            ClusterAvailable => Some(PortOpening),
            PortOpening => Some(Done),
            Done => None,
        }
    }

    /// Whether a step may move from `self` to `to`.
    pub fn can_enter(self, to: Self) -> bool {
        self.next() == Some(to)
            || (to == ProvisionState::PortOpening && self >= ProvisionState::ClusterAvailable)
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionState::Idle => "idle",
            ProvisionState::RoleCreating => "role-creating",
            ProvisionState::RoleReady => "role-ready",
            ProvisionState::ClusterCreating => "cluster-creating",
            ProvisionState::ClusterPolling => "cluster-polling",
            ProvisionState::ClusterAvailable => "cluster-available",
            ProvisionState::PortOpening => "port-opening",
            ProvisionState::Done => "done",
        };
        f.write_str(s)
    }
}

/// A cluster that reported `available`, with the fields later steps need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableCluster {
    pub endpoint: Endpoint,
    pub role_arn: RoleArn,
    pub vpc_id: Option<VpcId>,
    pub description: ClusterDescription,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IngressOutcome {
    Authorized { group: SecurityGroupId },
    AlreadyPresent { group: SecurityGroupId },
    Skipped { reason: String },
}

/// What a finished run reports. Safe to print: holds no secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionOutcome {
    pub cluster_id: ClusterId,
    pub role_arn: RoleArn,
    pub endpoint: Endpoint,
    pub vpc_id: Option<VpcId>,
    pub ingress: IngressOutcome,
    /// Connection URL with the password masked.
    pub connection_url: String,
    pub warnings: Vec<String>,
}

pub struct Provisioner<'a> {
    cloud: &'a dyn CloudApi,
    config: &'a ClusterConfig,
    policy: PollPolicy,
    cancel: CancelToken,
    state: ProvisionState,
    warnings: Vec<String>,
}

impl<'a> Provisioner<'a> {
    pub fn new(cloud: &'a dyn CloudApi, config: &'a ClusterConfig) -> Self {
        Self {
            cloud,
            config,
            policy: config.poll.into(),
            cancel: CancelToken::new(),
            state: ProvisionState::Idle,
            warnings: Vec::new(),
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ProvisionState {
        self.state
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn advance(&mut self, to: ProvisionState) -> Result<()> {
        if !self.state.can_enter(to) {
            return Err(ProvisionError::OutOfOrder {
                from: self.state,
                to,
            });
        }
        info!(from = %self.state, to = %to, "provisioning state");
        self.state = to;
        Ok(())
    }

    fn warn(&mut self, err: ProvisionError) {
        warn!(error = %err, "continuing");
        self.warnings.push(err.to_string());
    }

    /// Create (or reuse) the service role, resolve its ARN, then attach the read policy.
    pub fn create_role(&mut self) -> Result<RoleArn> {
        self.advance(ProvisionState::RoleCreating)?;
        let config = self.config;
        let role = config.role_name.as_str();

        let req = CreateRoleRequest::for_warehouse(role);
        match self.cloud.create_role(&req) {
            Ok(()) => info!(role, "created role"),
            Err(source) if source.is_already_exists() => info!(role, "role already exists"),
            Err(source) => self.warn(ProvisionError::RoleCreation {
                role: role.to_string(),
                source,
            }),
        }

        let arn = self
            .cloud
            .get_role_arn(role)
            .map_err(|source| ProvisionError::RoleLookup {
                role: role.to_string(),
                source,
            })?;

        let policy = config.role_policy_arn.as_str();
        self.cloud
            .attach_role_policy(role, policy)
            .map_err(|source| ProvisionError::PolicyAttach {
                role: role.to_string(),
                policy: policy.to_string(),
                source,
            })?;
        info!(role, arn = %arn, "role ready");
        self.advance(ProvisionState::RoleReady)?;
        Ok(arn)
    }

    /// Request the cluster (reusing one with the same id) and wait for it.
    pub fn create_cluster(&mut self, role: &RoleArn) -> Result<AvailableCluster> {
        self.advance(ProvisionState::ClusterCreating)?;
        let config = self.config;
        let id = &config.cluster_id;
        let req = CreateClusterRequest::from_config(config, role);
        match self.cloud.create_cluster(&req) {
            Ok(()) => info!(cluster = %id, node_type = %req.node_type, nodes = req.num_nodes, "cluster requested"),
            Err(source) if source.is_already_exists() => {
                info!(cluster = %id, "cluster already exists, waiting for it")
            }
            Err(source) => {
                return Err(ProvisionError::ClusterCreation {
                    cluster: id.clone(),
                    source,
                })
            }
        }

        self.advance(ProvisionState::ClusterPolling)?;
        let desc = poll_until_available(self.cloud, id, &self.policy, &self.cancel)?;
        let endpoint = desc
            .endpoint
            .clone()
            .ok_or_else(|| ProvisionError::IncompleteCluster {
                cluster: id.clone(),
                what: "endpoint",
            })?;
        let role_arn = desc.iam_roles.first().cloned().unwrap_or_else(|| role.clone());
        info!(cluster = %id, endpoint = %endpoint.address, port = endpoint.port, "cluster available");
        self.advance(ProvisionState::ClusterAvailable)?;
        Ok(AvailableCluster {
            endpoint,
            role_arn,
            vpc_id: desc.vpc_id.clone(),
            description: desc,
        })
    }

    /// Allow TCP on the database port from the configured CIDR, through the
    /// first security group of `vpc`. Re-running is a no-op, also on the same
    /// provisioner.
    pub fn open_ingress(&mut self, vpc: &VpcId) -> Result<IngressOutcome> {
        self.advance(ProvisionState::PortOpening)?;
        let rule = IngressRule::tcp(self.config.database.port, self.config.ingress_cidr.clone());
        if self.config.is_open_ingress() {
            warn!(cidr = %rule.cidr, port = rule.from_port, "opening the database port to every address");
        }

        let groups = self
            .cloud
            .security_groups(vpc)
            .map_err(|e| ProvisionError::SecurityRule {
                vpc: vpc.clone(),
                reason: e.to_string(),
            })?;
        let group = groups.first().ok_or_else(|| ProvisionError::SecurityRule {
            vpc: vpc.clone(),
            reason: "no security group in vpc".into(),
        })?;

        if group.allows(&rule) {
            info!(group = %group.id, "ingress rule already present");
            return Ok(IngressOutcome::AlreadyPresent {
                group: group.id.clone(),
            });
        }
        match self.cloud.authorize_ingress(&group.id, &rule) {
            Ok(()) => {
                info!(group = %group.id, port = rule.from_port, cidr = %rule.cidr, "ingress authorized");
                Ok(IngressOutcome::Authorized {
                    group: group.id.clone(),
                })
            }
            Err(e) if e.is_already_exists() => {
                warn!(group = %group.id, error = %e, "ingress rule already present");
                Ok(IngressOutcome::AlreadyPresent {
                    group: group.id.clone(),
                })
            }
            Err(e) => Err(ProvisionError::SecurityRule {
                vpc: vpc.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Run every step. Only the ingress failure is downgraded to a warning.
    pub fn run(mut self) -> Result<ProvisionOutcome> {
        let role = self.create_role()?;
        let cluster = self.create_cluster(&role)?;

        let ingress = match &cluster.vpc_id {
            Some(vpc) => match self.open_ingress(vpc) {
                Ok(outcome) => outcome,
                Err(err) if err.is_recoverable() => {
                    let reason = err.to_string();
                    self.warn(err);
                    IngressOutcome::Skipped { reason }
                }
                Err(err) => return Err(err),
            },
            None => {
                self.advance(ProvisionState::PortOpening)?;
                let reason = format!("cluster {} reports no vpc", self.config.cluster_id);
                warn!(%reason, "skipping ingress");
                self.warnings.push(reason.clone());
                IngressOutcome::Skipped { reason }
            }
        };
        self.advance(ProvisionState::Done)?;

        Ok(ProvisionOutcome {
            cluster_id: self.config.cluster_id.clone(),
            connection_url: self.config.database.redacted_url(&cluster.endpoint.address),
            role_arn: cluster.role_arn,
            endpoint: cluster.endpoint,
            vpc_id: cluster.vpc_id,
            ingress,
            warnings: self.warnings,
        })
    }
}

/// Provision with `cloud`, using the poll bounds from `config`.
pub fn provision(cloud: &dyn CloudApi, config: &ClusterConfig) -> Result<ProvisionOutcome> {
    Provisioner::new(cloud, config).run()
}
