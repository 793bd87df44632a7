use crate::{
    CertificateResource, CheckerConfig, CheckerError, Classifier, Diagnosis, DryRunClient,
    KubeDryRunClient, RemoteError, synthetic_certificate,
};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Checks that the cert-manager CRDs are installed and usable.
#[async_trait]
pub trait Check: Send + Sync {
    async fn check(&self) -> Result<(), CheckError>;
}

/// A failed check: the diagnosis, if one was recognised, and the error the
/// API server returned.
#[derive(Debug)]
pub struct CheckError {
    simple: Option<Diagnosis>,
    underlying: RemoteError,
}

impl CheckError {
    #[must_use]
    pub fn new(simple: Option<Diagnosis>, underlying: RemoteError) -> Self {
        Self { simple, underlying }
    }

    #[must_use]
    pub fn diagnosis(&self) -> Option<Diagnosis> {
        self.simple
    }

    #[must_use]
    pub fn is(&self, diagnosis: Diagnosis) -> bool {
        self.simple == Some(diagnosis)
    }

    #[must_use]
    pub fn underlying(&self) -> &RemoteError {
        &self.underlying
    }

    #[must_use]
    pub fn into_underlying(self) -> RemoteError {
        self.underlying
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.simple {
            Some(simple) => write!(f, "{simple} ({})", self.underlying),
            None => write!(f, "{}", self.underlying),
        }
    }
}

impl std::error::Error for CheckError {
    // Only a recognised diagnosis is exposed; an unclassified failure ends
    // the chain here.
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.simple
            .as_ref()
            .map(|simple| simple as &(dyn std::error::Error + 'static))
    }
}

/// Performs a dry-run create of a Certificate so the API server runs it
/// through the CRD schema and every admission webhook without storing it.
pub struct ApiChecker<C = KubeDryRunClient> {
    client: C,
    resource: CertificateResource,
    classifier: Classifier,
}

impl ApiChecker<KubeDryRunClient> {
    /// # Errors
    /// Returns a `CheckerError` if the resource type cannot be registered,
    /// the classifier cannot be built, or no Kubernetes client can be
    /// created from `config`.
    pub async fn new(config: &CheckerConfig) -> Result<Self, CheckerError> {
        let resource = CertificateResource::new(&config.group, &config.version)?;
        let classifier = Classifier::new(&resource)?;
        let client = KubeDryRunClient::connect(config, resource.clone()).await?;

        Ok(Self {
            client,
            resource,
            classifier,
        })
    }
}

impl<C: DryRunClient> ApiChecker<C> {
    /// # Errors
    /// Returns `CheckerError::Classifier` if the rule table cannot be built.
    pub fn with_client(client: C, resource: CertificateResource) -> Result<Self, CheckerError> {
        let classifier = Classifier::new(&resource)?;
        Ok(Self {
            client,
            resource,
            classifier,
        })
    }

    /// Run one check, abandoning the request once `timeout` elapses.
    ///
    /// # Errors
    /// Returns a `CheckError` if the dry-run create fails or times out. A
    /// timeout is never classified.
    pub async fn check_with_timeout(&self, timeout: Duration) -> Result<(), CheckError> {
        match tokio::time::timeout(timeout, self.check()).await {
            Ok(result) => result,
            Err(elapsed) => {
                warn!(?timeout, "cert-manager API check timed out");
                Err(CheckError::new(None, RemoteError::new(elapsed.to_string())))
            }
        }
    }

    fn translate(&self, underlying: RemoteError) -> CheckError {
        let simple = self.classifier.classify(underlying.message());

        match simple {
            Some(diagnosis) => debug!(?diagnosis, error = %underlying, "Classified check failure"),
            None => warn!(
                error = %underlying,
                "Check failure did not match any known error pattern"
            ),
        }

        CheckError::new(simple, underlying)
    }
}

#[async_trait]
impl<C: DryRunClient> Check for ApiChecker<C> {
    async fn check(&self) -> Result<(), CheckError> {
        let certificate = synthetic_certificate(&self.resource);

        match self.client.create_dry_run(&certificate).await {
            Ok(_) => {
                info!(group = %self.resource.group(), "cert-manager API is ready");
                Ok(())
            }
            Err(err) => Err(self.translate(err)),
        }
    }
}
