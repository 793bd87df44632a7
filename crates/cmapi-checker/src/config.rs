use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_GROUP: &str = "anthos-cert-manager.io";
pub const DEFAULT_VERSION: &str = "v1";

/// Where and against which API group the checker runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct CheckerConfig {
    /// Namespace the dry-run Certificate is submitted to.
    pub namespace: String,
    /// API group serving the `Certificate` kind.
    pub group: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            group: DEFAULT_GROUP.to_string(),
            version: DEFAULT_VERSION.to_string(),
            kubeconfig: None,
            context: None,
        }
    }
}
