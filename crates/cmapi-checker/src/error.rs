use std::path::PathBuf;
use thiserror::Error;

/// Failures while building an [`ApiChecker`](crate::ApiChecker).
///
/// These are reported before any check runs and never pass through the
/// classifier.
#[derive(Error, Debug)]
pub enum CheckerError {
    #[error("while registering the Certificate resource type: {0}")]
    Registration(String),

    #[error("while building the error classifier")]
    Classifier(#[from] regex::Error),

    #[error("Failed to read kubeconfig '{}'", path.display())]
    Kubeconfig {
        path: PathBuf,
        #[source]
        source: kube::config::KubeconfigError,
    },

    #[error("Failed to load kubeconfig")]
    KubeconfigLoad(#[from] kube::config::KubeconfigError),

    #[error("Failed to infer Kubernetes client config")]
    InferConfig(#[from] kube::config::InferConfigError),

    #[error("while creating client")]
    Client(#[from] kube::Error),
}
