use std::time::Duration;

use thiserror::Error;

use starhouse_core::id::{ClusterId, VpcId};

use crate::provisioner::ProvisionState;

/// Result of a single collaborator call.
pub type CloudResult<T> = std::result::Result<T, CloudError>;

/// Provider failures, classified by what the provisioner needs to decide.
#[derive(Debug, Clone, Error)]
pub enum CloudError {
    #[error("{resource} already exists: {message}")]
    AlreadyExists { resource: String, message: String },

    #[error("{resource} not found: {message}")]
    NotFound { resource: String, message: String },

    #[error("service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl CloudError {
    pub fn already_exists(resource: impl Into<String>, message: impl Into<String>) -> Self {
        CloudError::AlreadyExists {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, message: impl Into<String>) -> Self {
        CloudError::NotFound {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, CloudError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound { .. })
    }
}

/// Result type of the provisioning steps.
pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Config(#[from] starhouse_core::Error),

    /// Logged only; the provisioner goes on to look the role up.
    #[error("creating role '{role}' failed: {source}")]
    RoleCreation {
        role: String,
        #[source]
        source: CloudError,
    },

    #[error("role '{role}' could not be resolved to an ARN: {source}")]
    RoleLookup {
        role: String,
        #[source]
        source: CloudError,
    },

    #[error("attaching policy '{policy}' to role '{role}' failed: {source}")]
    PolicyAttach {
        role: String,
        policy: String,
        #[source]
        source: CloudError,
    },

    #[error("creating cluster '{cluster}' failed: {source}")]
    ClusterCreation {
        cluster: ClusterId,
        #[source]
        source: CloudError,
    },

    #[error("cluster '{cluster}' does not exist")]
    ClusterNotFound { cluster: ClusterId },

    #[error("describing cluster '{cluster}' failed: {source}")]
    ClusterDescribe {
        cluster: ClusterId,
        #[source]
        source: CloudError,
    },

    #[error("cluster '{cluster}' is available but reports no {what}")]
    IncompleteCluster { cluster: ClusterId, what: &'static str },

    #[error("cluster '{cluster}' not available after {attempts} polls ({waited:?}); last status '{last_status}'")]
    Timeout {
        cluster: ClusterId,
        attempts: u32,
        waited: Duration,
        last_status: String,
    },

    #[error("waiting for cluster '{cluster}' was cancelled after {attempts} polls")]
    Cancelled { cluster: ClusterId, attempts: u32 },

    #[error("provisioning step '{to}' cannot follow '{from}'")]
    OutOfOrder {
        from: ProvisionState,
        to: ProvisionState,
    },

    /// Logged only; the port may already be open.
    #[error("opening ingress in {vpc} failed: {reason}")]
    SecurityRule { vpc: VpcId, reason: String },
}

impl ProvisionError {
    /// Whether the orchestrator may log this and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProvisionError::RoleCreation { .. } | ProvisionError::SecurityRule { .. }
        )
    }
}
