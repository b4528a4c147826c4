//! Strongly-typed names for cloud resources.
//!
//! Downstream crates (cloud, pipeline, exec) should *not* pass raw strings for
//! resource identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! new_name {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(v: impl Into<String>) -> Self {
                Self(v.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(v: &str) -> Self {
                Self(v.to_string())
            }
        }

        impl From<String> for $name {
            fn from(v: String) -> Self {
                Self(v)
            }
        }
    };
}

new_name!(RoleArn);
new_name!(ClusterId);
new_name!(VpcId);
new_name!(SecurityGroupId);
