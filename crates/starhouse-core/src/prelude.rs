//! Convenient re-exports for downstream crates.

pub use crate::config::{
    ClusterConfig, ClusterType, Credentials, DatabaseConfig, PipelineConfig, PollSettings,
    RawConfig, SourcePaths,
};
pub use crate::error::{Error, Result};
pub use crate::hash::Hash256;
pub use crate::id::{ClusterId, RoleArn, SecurityGroupId, VpcId};
pub use crate::manifest::{ManifestId, PhaseReport, RunManifest};
