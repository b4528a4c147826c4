//! In-memory cloud account.
//!
//! Implements all three collaborator traits against a mutex-guarded state so
//! provisioning can be exercised without a network. Cluster status follows a
//! script: each describe call consumes the next entry, and the last entry
//! sticks. Failures can be injected per operation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use starhouse_core::id::{ClusterId, RoleArn, SecurityGroupId, VpcId};

use crate::api::{
    ClusterDescription, CreateClusterRequest, CreateRoleRequest, Endpoint, IdentityApi,
    IngressRule, NetworkApi, SecurityGroup, WarehouseApi,
};
use crate::error::{CloudError, CloudResult};

pub const DEFAULT_ACCOUNT_ID: &str = "123456789012";
pub const DEFAULT_VPC_ID: &str = "vpc-0a1b2c3d";
pub const DEFAULT_SECURITY_GROUP_ID: &str = "sg-0a1b2c3d";

/// Operation names, as recorded in [`MemoryCloud::calls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudOp {
    CreateRole,
    AttachRolePolicy,
    GetRoleArn,
    CreateCluster,
    DescribeCluster,
    SecurityGroups,
    AuthorizeIngress,
}

#[derive(Debug, Clone)]
struct RoleRecord {
    arn: RoleArn,
    policies: Vec<String>,
}

#[derive(Debug, Clone)]
struct ClusterRecord {
    request: CreateClusterRequest,
    script: VecDeque<String>,
    status: String,
}

#[derive(Debug, Default)]
struct State {
    roles: BTreeMap<String, RoleRecord>,
    clusters: BTreeMap<ClusterId, ClusterRecord>,
    groups: BTreeMap<VpcId, Vec<SecurityGroup>>,
    failures: HashMap<CloudOp, VecDeque<CloudError>>,
    calls: Vec<CloudOp>,
}

#[derive(Debug)]
pub struct MemoryCloud {
    region: String,
    account_id: String,
    vpc_id: VpcId,
    status_script: Vec<String>,
    state: Mutex<State>,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new("us-west-2")
    }
}

impl MemoryCloud {
    /// Empty account with one VPC holding one security group and no rules.
    pub fn new(region: impl Into<String>) -> Self {
        let vpc_id = VpcId::from(DEFAULT_VPC_ID);
        let mut state = State::default();
        state.groups.insert(
            vpc_id.clone(),
            vec![SecurityGroup {
                id: SecurityGroupId::from(DEFAULT_SECURITY_GROUP_ID),
                name: "default".into(),
                vpc_id: vpc_id.clone(),
                ingress: Vec::new(),
            }],
        );
        Self {
            region: region.into(),
            account_id: DEFAULT_ACCOUNT_ID.into(),
            vpc_id,
            status_script: vec!["creating".into(), "available".into()],
            state: Mutex::new(state),
        }
    }

    /// Statuses reported by successive describe calls on new clusters.
    pub fn with_status_script<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.status_script = statuses.into_iter().map(Into::into).collect();
        self
    }

    /// Remove every security group from the cluster VPC.
    pub fn without_security_groups(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.groups.insert(self.vpc_id.clone(), Vec::new());
        }
        self
    }

    /// Make the next call of `op` fail with `err`. Queued per operation.
    pub fn fail_next(&self, op: CloudOp, err: CloudError) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.entry(op).or_default().push_back(err);
        }
    }

    /// Pre-existing role, as if created by an earlier run.
    pub fn seed_role(&self, name: &str) -> RoleArn {
        let arn = self.arn_for(name);
        if let Ok(mut state) = self.state.lock() {
            state.roles.insert(
                name.to_string(),
                RoleRecord {
                    arn: arn.clone(),
                    policies: Vec::new(),
                },
            );
        }
        arn
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<CloudOp> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, op: CloudOp) -> usize {
        self.calls().into_iter().filter(|c| *c == op).count()
    }

    /// Policies attached to `role`, or `None` if there is no such role.
    pub fn role_policies(&self, role: &str) -> Option<Vec<String>> {
        let state = self.state.lock().ok()?;
        state.roles.get(role).map(|r| r.policies.clone())
    }

    /// Ingress rules of a security group across all VPCs.
    pub fn ingress_rules(&self, group: &SecurityGroupId) -> Vec<IngressRule> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        state
            .groups
            .values()
            .flatten()
            .find(|g| &g.id == group)
            .map(|g| g.ingress.clone())
            .unwrap_or_default()
    }

    pub fn cluster_count(&self) -> usize {
        self.state.lock().map(|s| s.clusters.len()).unwrap_or(0)
    }

    pub fn vpc_id(&self) -> &VpcId {
        &self.vpc_id
    }

    fn arn_for(&self, role: &str) -> RoleArn {
        RoleArn::new(format!("arn:aws:iam::{}:role/{role}", self.account_id))
    }

    fn lock(&self) -> CloudResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| CloudError::Transport("memory cloud lock poisoned".into()))
    }

    /// Record the call and pop an injected failure, if any.
    fn enter(&self, op: CloudOp) -> CloudResult<MutexGuard<'_, State>> {
        let mut state = self.lock()?;
        state.calls.push(op);
        if let Some(err) = state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(state)
    }
}

impl IdentityApi for MemoryCloud {
    fn create_role(&self, req: &CreateRoleRequest) -> CloudResult<()> {
        let mut state = self.enter(CloudOp::CreateRole)?;
        if state.roles.contains_key(&req.name) {
            return Err(CloudError::already_exists(
                "role",
                format!("Role with name {} already exists.", req.name),
            ));
        }
        state.roles.insert(
            req.name.clone(),
            RoleRecord {
                arn: self.arn_for(&req.name),
                policies: Vec::new(),
            },
        );
        Ok(())
    }

    fn attach_role_policy(&self, role: &str, policy_arn: &str) -> CloudResult<()> {
        let mut state = self.enter(CloudOp::AttachRolePolicy)?;
        let record = state
            .roles
            .get_mut(role)
            .ok_or_else(|| CloudError::not_found("role", format!("The role {role} cannot be found.")))?;
        if !record.policies.iter().any(|p| p == policy_arn) {
            record.policies.push(policy_arn.to_string());
        }
        Ok(())
    }

    fn get_role_arn(&self, role: &str) -> CloudResult<RoleArn> {
        let state = self.enter(CloudOp::GetRoleArn)?;
        state
            .roles
            .get(role)
            .map(|r| r.arn.clone())
            .ok_or_else(|| CloudError::not_found("role", format!("The role {role} cannot be found.")))
    }
}

impl WarehouseApi for MemoryCloud {
    fn create_cluster(&self, req: &CreateClusterRequest) -> CloudResult<()> {
        let mut state = self.enter(CloudOp::CreateCluster)?;
        if state.clusters.contains_key(&req.cluster_id) {
            return Err(CloudError::already_exists(
                "cluster",
                format!("Cluster {} already exists", req.cluster_id),
            ));
        }
        let script: VecDeque<String> = self.status_script.iter().cloned().collect();
        state.clusters.insert(
            req.cluster_id.clone(),
            ClusterRecord {
                request: req.clone(),
                status: script.front().cloned().unwrap_or_else(|| "creating".into()),
                script,
            },
        );
        Ok(())
    }

    fn describe_cluster(&self, id: &ClusterId) -> CloudResult<ClusterDescription> {
        let mut state = self.enter(CloudOp::DescribeCluster)?;
        let record = state
            .clusters
            .get_mut(id)
            .ok_or_else(|| CloudError::not_found("cluster", format!("Cluster {id} not found.")))?;

        if let Some(next) = record.script.pop_front() {
            record.status = next;
        }
        let available = record.status.eq_ignore_ascii_case(crate::api::AVAILABLE_STATUS);
        let req = &record.request;
        Ok(ClusterDescription {
            cluster_id: req.cluster_id.clone(),
            status: record.status.clone(),
            node_type: req.node_type.clone(),
            num_nodes: req.num_nodes,
            db_name: req.db_name.clone(),
            master_username: req.master_username.clone(),
            endpoint: available.then(|| Endpoint {
                address: format!(
                    "{}.c0ffee12.{}.redshift.amazonaws.com",
                    req.cluster_id, self.region
                ),
                port: req.port,
            }),
            vpc_id: Some(self.vpc_id.clone()),
            iam_roles: req.iam_roles.clone(),
        })
    }
}

impl NetworkApi for MemoryCloud {
    fn security_groups(&self, vpc: &VpcId) -> CloudResult<Vec<SecurityGroup>> {
        let state = self.enter(CloudOp::SecurityGroups)?;
        Ok(state.groups.get(vpc).cloned().unwrap_or_default())
    }

    fn authorize_ingress(&self, group: &SecurityGroupId, rule: &IngressRule) -> CloudResult<()> {
        let mut state = self.enter(CloudOp::AuthorizeIngress)?;
        let target = state
            .groups
            .values_mut()
            .flatten()
            .find(|g| &g.id == group)
            .ok_or_else(|| {
                CloudError::not_found("security group", format!("The security group '{group}' does not exist"))
            })?;
        if target.ingress.contains(rule) {
            return Err(CloudError::already_exists(
                "ingress rule",
                format!(
                    "the specified rule \"peer: {}, {}, from port: {}, to port: {}, ALLOW\" already exists",
                    rule.cidr, rule.protocol, rule.from_port, rule.to_port
                ),
            ));
        }
        target.ingress.push(rule.clone());
        Ok(())
    }
}
