//! AWS backend: IAM for roles, Redshift for the cluster, EC2 for ingress.
//!
//! Blocking façade over the async SDK clients with an owned runtime, the
//! same shape as the S3 source store.

use std::fmt::Display;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::types::Filter;
use aws_sdk_iam::config::Credentials as AwsCredentials;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata};
use tokio::runtime::Runtime;
use tracing::debug;

use starhouse_core::config::{ClusterConfig, ClusterType};
use starhouse_core::id::{ClusterId, RoleArn, SecurityGroupId, VpcId};

use crate::api::{
    ClusterDescription, CreateClusterRequest, CreateRoleRequest, Endpoint, IdentityApi,
    IngressRule, NetworkApi, SecurityGroup, WarehouseApi,
};
use crate::error::{CloudError, CloudResult};

const ALREADY_EXISTS_CODES: &[&str] = &[
    "EntityAlreadyExists",
    "ClusterAlreadyExists",
    "InvalidPermission.Duplicate",
];

const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchEntity",
    "ClusterNotFound",
    "InvalidVpcID.NotFound",
    "InvalidGroup.NotFound",
];

/// Map an SDK error onto the three outcomes the provisioner distinguishes.
pub fn classify_aws_error<E>(resource: &str, err: E) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = err.message().map(str::to_string).unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    match err.code() {
        Some(code) if ALREADY_EXISTS_CODES.contains(&code) => CloudError::already_exists(resource, message),
        Some(code) if NOT_FOUND_CODES.contains(&code) => CloudError::not_found(resource, message),
        Some(code) => CloudError::Service {
            code: code.to_string(),
            message,
        },
        None => CloudError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

fn to_port(value: Option<i32>, what: impl Display) -> CloudResult<u16> {
    let raw = value.ok_or_else(|| CloudError::Transport(format!("{what}: response has no port")))?;
    u16::try_from(raw).map_err(|_| CloudError::Transport(format!("{what}: port {raw} out of range")))
}

pub struct AwsCloud {
    runtime: Runtime,
    iam: aws_sdk_iam::Client,
    redshift: aws_sdk_redshift::Client,
    ec2: aws_sdk_ec2::Client,
}

impl AwsCloud {
    /// Clients for `config.region` using the static keys in `config`.
    pub fn new(config: &ClusterConfig) -> CloudResult<Self> {
        let runtime = Runtime::new().map_err(|e| CloudError::Transport(format!("failed to initialize async runtime: {e}")))?;
        let creds = AwsCredentials::new(
            config.credentials.access_key_id.clone(),
            config.credentials.secret_access_key.clone(),
            None,
            None,
            "starhouse-config",
        );
        let shared = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .credentials_provider(creds)
                .load(),
        );
        debug!(region = %config.region, "aws clients configured");
        Ok(Self {
            iam: aws_sdk_iam::Client::new(&shared),
            redshift: aws_sdk_redshift::Client::new(&shared),
            ec2: aws_sdk_ec2::Client::new(&shared),
            runtime,
        })
    }
}

impl IdentityApi for AwsCloud {
    fn create_role(&self, req: &CreateRoleRequest) -> CloudResult<()> {
        self.runtime
            .block_on(
                self.iam
                    .create_role()
                    .role_name(&req.name)
                    .description(&req.description)
                    .assume_role_policy_document(&req.assume_role_policy)
                    .send(),
            )
            .map(|_| ())
            .map_err(|e| classify_aws_error("role", e))
    }

    fn attach_role_policy(&self, role: &str, policy_arn: &str) -> CloudResult<()> {
        self.runtime
            .block_on(
                self.iam
                    .attach_role_policy()
                    .role_name(role)
                    .policy_arn(policy_arn)
                    .send(),
            )
            .map(|_| ())
            .map_err(|e| classify_aws_error("role policy", e))
    }

    fn get_role_arn(&self, role: &str) -> CloudResult<RoleArn> {
        let out = self
            .runtime
            .block_on(self.iam.get_role().role_name(role).send())
            .map_err(|e| classify_aws_error("role", e))?;
        out.role()
            .map(|r| RoleArn::new(r.arn()))
            .ok_or_else(|| CloudError::not_found("role", role))
    }
}

impl WarehouseApi for AwsCloud {
    fn create_cluster(&self, req: &CreateClusterRequest) -> CloudResult<()> {
        let port = i32::from(req.port);
        let mut call = self
            .redshift
            .create_cluster()
            .cluster_identifier(req.cluster_id.as_str())
            .cluster_type(req.cluster_type.as_str())
            .node_type(&req.node_type)
            .db_name(&req.db_name)
            .master_username(&req.master_username)
            .master_user_password(&req.master_password)
            .port(port);
        if req.cluster_type == ClusterType::MultiNode {
            let nodes = i32::try_from(req.num_nodes)
                .map_err(|_| CloudError::Transport(format!("node count {} out of range", req.num_nodes)))?;
            call = call.number_of_nodes(nodes);
        }
        for role in &req.iam_roles {
            call = call.iam_roles(role.as_str());
        }
        self.runtime
            .block_on(call.send())
            .map(|_| ())
            .map_err(|e| classify_aws_error("cluster", e))
    }

    fn describe_cluster(&self, id: &ClusterId) -> CloudResult<ClusterDescription> {
        let out = self
            .runtime
            .block_on(
                self.redshift
                    .describe_clusters()
                    .cluster_identifier(id.as_str())
                    .send(),
            )
            .map_err(|e| classify_aws_error("cluster", e))?;
        let cluster = out
            .clusters()
            .first()
            .ok_or_else(|| CloudError::not_found("cluster", id.as_str()))?;

        let endpoint = match cluster.endpoint() {
            Some(ep) => match ep.address() {
                Some(address) => Some(Endpoint {
                    address: address.to_string(),
                    port: to_port(ep.port(), id)?,
                }),
                None => None,
            },
            None => None,
        };

        Ok(ClusterDescription {
            cluster_id: ClusterId::new(cluster.cluster_identifier().unwrap_or(id.as_str())),
            status: cluster.cluster_status().unwrap_or_default().to_string(),
            node_type: cluster.node_type().unwrap_or_default().to_string(),
            num_nodes: cluster
                .number_of_nodes()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
            db_name: cluster.db_name().unwrap_or_default().to_string(),
            master_username: cluster.master_username().unwrap_or_default().to_string(),
            endpoint,
            vpc_id: cluster.vpc_id().map(VpcId::from),
            iam_roles: cluster
                .iam_roles()
                .iter()
                .filter_map(|r| r.iam_role_arn())
                .map(RoleArn::from)
                .collect(),
        })
    }
}

impl NetworkApi for AwsCloud {
    fn security_groups(&self, vpc: &VpcId) -> CloudResult<Vec<SecurityGroup>> {
        let filter = Filter::builder().name("vpc-id").values(vpc.as_str()).build();
        let out = self
            .runtime
            .block_on(
                self.ec2
                    .describe_security_groups()
                    .filters(filter)
                    .send(),
            )
            .map_err(|e| classify_aws_error("security group", e))?;

        let mut groups = Vec::new();
        for g in out.security_groups() {
            let Some(id) = g.group_id() else { continue };
            let mut ingress = Vec::new();
            for perm in g.ip_permissions() {
                let protocol = perm.ip_protocol().unwrap_or("-1").to_string();
                // "-1" (all traffic) carries no ports.
                let (from_port, to_port) = match (perm.from_port(), perm.to_port()) {
                    (Some(f), Some(t)) if f >= 0 && t >= 0 => (
                        u16::try_from(f).unwrap_or(0),
                        u16::try_from(t).unwrap_or(u16::MAX),
                    ),
                    _ => (0, u16::MAX),
                };
                for range in perm.ip_ranges() {
                    if let Some(cidr) = range.cidr_ip() {
                        ingress.push(IngressRule {
                            protocol: protocol.clone(),
                            from_port,
                            to_port,
                            cidr: cidr.to_string(),
                        });
                    }
                }
            }
            groups.push(SecurityGroup {
                id: SecurityGroupId::from(id),
                name: g.group_name().unwrap_or_default().to_string(),
                vpc_id: VpcId::from(g.vpc_id().unwrap_or(vpc.as_str())),
                ingress,
            });
        }
        Ok(groups)
    }

    fn authorize_ingress(&self, group: &SecurityGroupId, rule: &IngressRule) -> CloudResult<()> {
        self.runtime
            .block_on(
                self.ec2
                    .authorize_security_group_ingress()
                    .group_id(group.as_str())
                    .ip_protocol(&rule.protocol)
                    .cidr_ip(&rule.cidr)
                    .from_port(i32::from(rule.from_port))
                    .to_port(i32::from(rule.to_port))
                    .send(),
            )
            .map(|_| ())
            .map_err(|e| classify_aws_error("ingress rule", e))
    }
}
