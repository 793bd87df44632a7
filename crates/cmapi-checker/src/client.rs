use crate::{CERTIFICATE_KIND, CertificateResource, CheckerConfig, CheckerError};
use async_trait::async_trait;
use kube::api::{Api, DynamicObject, PostParams};
use kube::core::ApiResource;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

const GENERIC_NOT_FOUND: &str = "the server could not find the requested resource";

/// A failed remote write, carrying the remote layer's text unchanged.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
    #[source]
    source: Option<kube::Error>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: kube::Error) -> Self {
        Self {
            message: message.into(),
            source: Some(source),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Namespaced, non-persisting create against the object store.
#[async_trait]
pub trait DryRunClient: Send + Sync {
    /// Submit `object` for full validation and admission without storing it.
    async fn create_dry_run(&self, object: &DynamicObject) -> Result<DynamicObject, RemoteError>;
}

pub struct KubeDryRunClient {
    client: Client,
    namespace: String,
    resource: CertificateResource,
    // Only a successful lookup is kept, so a missing CRD is looked up again.
    api_resource: OnceCell<ApiResource>,
}

impl KubeDryRunClient {
    #[must_use]
    pub fn new(client: Client, namespace: &str, resource: CertificateResource) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            resource,
            api_resource: OnceCell::new(),
        }
    }

    /// Build a client from the kubeconfig and context in `config`, falling
    /// back to in-cluster or default kubeconfig inference.
    ///
    /// # Errors
    /// Returns a `CheckerError` if no usable configuration is found or the
    /// client cannot be created from it.
    pub async fn connect(
        config: &CheckerConfig,
        resource: CertificateResource,
    ) -> Result<Self, CheckerError> {
        let client = kube_client(config).await?;
        Ok(Self::new(client, &config.namespace, resource))
    }

    async fn api_resource(&self) -> Result<&ApiResource, RemoteError> {
        self.api_resource.get_or_try_init(|| self.resolve()).await
    }

    async fn resolve(&self) -> Result<ApiResource, RemoteError> {
        let group = kube::discovery::group(&self.client, self.resource.group())
            .await
            .map_err(|err| discovery_error(err, &self.resource))?;

        let served = group
            .versioned_resources(self.resource.version())
            .into_iter()
            .map(|(ar, _caps)| ar);
        find_certificate_kind(served, &self.resource)
    }
}

#[async_trait]
impl DryRunClient for KubeDryRunClient {
    async fn create_dry_run(&self, object: &DynamicObject) -> Result<DynamicObject, RemoteError> {
        let ar = self.api_resource().await?;
        debug!(
            namespace = %self.namespace,
            api_version = %ar.api_version,
            plural = %ar.plural,
            "Submitting dry-run create"
        );

        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &self.namespace, ar);
        let params = PostParams {
            dry_run: true,
            ..Default::default()
        };

        api.create(&params, object)
            .await
            .map_err(|err| remote_error(err, &self.resource))
    }
}

/// A group the API server does not serve maps to the REST mapping failure;
/// anything else is a plain remote error.
fn discovery_error(err: kube::Error, resource: &CertificateResource) -> RemoteError {
    match err {
        err @ kube::Error::Discovery(_) => {
            RemoteError::with_source(resource.no_kind_match_message(), err)
        }
        err => remote_error(err, resource),
    }
}

fn find_certificate_kind(
    served: impl IntoIterator<Item = ApiResource>,
    resource: &CertificateResource,
) -> Result<ApiResource, RemoteError> {
    served
        .into_iter()
        .find(|ar| ar.kind == CERTIFICATE_KIND)
        .ok_or_else(|| RemoteError::new(resource.no_kind_match_message()))
}

fn remote_error(err: kube::Error, resource: &CertificateResource) -> RemoteError {
    let message = match &err {
        kube::Error::Api(status) => {
            api_failure_message(status.code, &status.reason, &status.message, resource)
        }
        _ => None,
    };

    let message = message.unwrap_or_else(|| err.to_string());
    RemoteError::with_source(message, err)
}

/// Server text for an API error response. A 404 that is not a `NotFound`
/// status for a named object means the resource path itself is unknown.
fn api_failure_message(
    code: u16,
    reason: &str,
    message: &str,
    resource: &CertificateResource,
) -> Option<String> {
    if code == 404 && (reason != "NotFound" || message == GENERIC_NOT_FOUND) {
        return Some(resource.resource_not_found_message());
    }

    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}

async fn kube_client(config: &CheckerConfig) -> Result<Client, CheckerError> {
    let options = KubeConfigOptions {
        context: config.context.clone(),
        ..Default::default()
    };

    if let Some(path) = &config.kubeconfig {
        let kubeconfig = Kubeconfig::read_from(path).map_err(|source| CheckerError::Kubeconfig {
            path: path.clone(),
            source,
        })?;
        let kube_config = Config::from_custom_kubeconfig(kubeconfig, &options).await?;
        return Ok(Client::try_from(kube_config)?);
    }

    if config.context.is_some() {
        let kube_config = Config::from_kubeconfig(&options).await?;
        return Ok(Client::try_from(kube_config)?);
    }

    let kube_config = Config::infer().await?;
    Ok(Client::try_from(kube_config)?)
}
