//! Maps the free-text error of a failed dry-run create onto a known cause.
//!
//! The API server and its admission webhooks return no stable error codes,
//! so the rules below match the whole message text. Wording changes upstream
//! only require touching this table.

use crate::CertificateResource;
use regex::Regex;
use thiserror::Error;

/// A known reason for the cert-manager API not being usable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diagnosis {
    #[error("the cert-manager CRDs are not yet installed on the Kubernetes API server")]
    CrdsNotInstalled,

    #[error("the cert-manager webhook service is not created yet")]
    WebhookServiceMissing,

    #[error("the cert-manager webhook deployment is not ready yet")]
    WebhookDeploymentUnreachable,

    #[error("the cert-manager webhook CA bundle is not injected yet")]
    WebhookCertificateUntrusted,
}

// Admission failures arrive wrapped, e.g.
// `Internal error occurred: failed calling webhook "webhook.cert-manager.io": Post ...`.
const WEBHOOK_PREFIX: &str = r"^(?:.*: )?";

const WEBHOOK_SERVICE_MISSING: &str = r#"Post "[^"]*": service "[^"]*-webhook" not found$"#;
const WEBHOOK_CONNECTION_REFUSED: &str = r#"Post "[^"]*": .+: connect: connection refused$"#;
const WEBHOOK_UNKNOWN_AUTHORITY: &str =
    r#"Post "[^"]*": x509: certificate signed by unknown authority(?: \(.*\))?$"#;

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pattern: Regex,
    diagnosis: Diagnosis,
}

impl ClassificationRule {
    /// # Errors
    /// Returns the regex compile error for an invalid pattern.
    pub fn new(pattern: &str, diagnosis: Diagnosis) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            diagnosis,
        })
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    #[must_use]
    pub fn diagnosis(&self) -> Diagnosis {
        self.diagnosis
    }

    fn matches(&self, message: &str) -> bool {
        self.pattern.is_match(message)
    }
}

/// Ordered rule table; the first matching rule decides the diagnosis.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
}

impl Classifier {
    /// Build the standard table for the Certificate resource of one API group.
    ///
    /// # Errors
    /// Returns an error if one of the patterns fails to compile.
    pub fn new(resource: &CertificateResource) -> Result<Self, regex::Error> {
        let crds_missing = format!(
            "^(?:{}|{})$",
            regex::escape(&resource.no_kind_match_message()),
            regex::escape(&resource.resource_not_found_message()),
        );

        let rules = vec![
            ClassificationRule::new(&crds_missing, Diagnosis::CrdsNotInstalled)?,
            ClassificationRule::new(
                &format!("{WEBHOOK_PREFIX}{WEBHOOK_SERVICE_MISSING}"),
                Diagnosis::WebhookServiceMissing,
            )?,
            ClassificationRule::new(
                &format!("{WEBHOOK_PREFIX}{WEBHOOK_CONNECTION_REFUSED}"),
                Diagnosis::WebhookDeploymentUnreachable,
            )?,
            ClassificationRule::new(
                &format!("{WEBHOOK_PREFIX}{WEBHOOK_UNKNOWN_AUTHORITY}"),
                Diagnosis::WebhookCertificateUntrusted,
            )?,
        ];

        Ok(Self::with_rules(rules))
    }

    #[must_use]
    pub fn with_rules(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Returns `None` when no rule matches the full message.
    #[must_use]
    pub fn classify(&self, message: &str) -> Option<Diagnosis> {
        self.rules
            .iter()
            .find(|rule| rule.matches(message))
            .map(ClassificationRule::diagnosis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        let resource = CertificateResource::new("anthos-cert-manager.io", "v1").unwrap();
        Classifier::new(&resource).unwrap()
    }

    #[test]
    fn test_crds_not_found() {
        let classifier = classifier();
        assert_eq!(
            classifier.classify(
                "the server could not find the requested resource (post certificates.anthos-cert-manager.io)"
            ),
            Some(Diagnosis::CrdsNotInstalled)
        );
        assert_eq!(
            classifier.classify(
                r#"error finding the scope of the object: failed to get restmapping: no matches for kind "Certificate" in group "anthos-cert-manager.io""#
            ),
            Some(Diagnosis::CrdsNotInstalled)
        );
    }

    #[test]
    fn test_crds_messages_must_match_exactly() {
        let classifier = classifier();
        for message in [
            "the server could not find the requested resource (post certificates.anthos-cert-manager.io) ",
            "error: the server could not find the requested resource (post certificates.anthos-cert-manager.io)",
            "the server could not find the requested resource (post certificates.cert-manager.io)",
            "the server could not find the requested resource (post certificatesXanthos-cert-manager.io)",
        ] {
            assert_eq!(classifier.classify(message), None, "{message}");
        }
    }

    #[test]
    fn test_crds_rule_follows_group() {
        let resource = CertificateResource::new("cert-manager.io", "v1").unwrap();
        let classifier = Classifier::new(&resource).unwrap();
        assert_eq!(
            classifier.classify(
                "the server could not find the requested resource (post certificates.cert-manager.io)"
            ),
            Some(Diagnosis::CrdsNotInstalled)
        );
        assert_eq!(
            classifier.classify(
                "the server could not find the requested resource (post certificates.anthos-cert-manager.io)"
            ),
            None
        );
    }

    #[test]
    fn test_webhook_service_missing() {
        let classifier = classifier();
        assert_eq!(
            classifier.classify(r#"Post "https://x-webhook.svc:443/mutate": service "x-webhook" not found"#),
            Some(Diagnosis::WebhookServiceMissing)
        );
        assert_eq!(
            classifier.classify(
                r#"Internal error occurred: failed calling webhook "webhook.anthos-cert-manager.io": Post "https://cert-manager-webhook.cert-manager.svc:443/mutate?timeout=10s": service "cert-manager-webhook" not found"#
            ),
            Some(Diagnosis::WebhookServiceMissing)
        );
    }

    #[test]
    fn test_webhook_deployment_unreachable() {
        let classifier = classifier();
        assert_eq!(
            classifier.classify(
                r#"Post "https://x-webhook.svc:443/mutate": dial tcp 10.0.0.1:443: connect: connection refused"#
            ),
            Some(Diagnosis::WebhookDeploymentUnreachable)
        );
        assert_eq!(
            classifier.classify(
                r#"Internal error occurred: failed calling webhook "webhook.anthos-cert-manager.io": Post "https://cert-manager-webhook.cert-manager.svc:443/mutate?timeout=10s": dial tcp 10.96.38.90:443: connect: connection refused"#
            ),
            Some(Diagnosis::WebhookDeploymentUnreachable)
        );
    }

    #[test]
    fn test_webhook_certificate_untrusted() {
        let classifier = classifier();
        assert_eq!(
            classifier.classify(
                r#"Post "https://x-webhook.svc:443/mutate": x509: certificate signed by unknown authority"#
            ),
            Some(Diagnosis::WebhookCertificateUntrusted)
        );
        assert_eq!(
            classifier.classify(
                r#"Internal error occurred: failed calling webhook "webhook.anthos-cert-manager.io": Post "https://cert-manager-webhook.cert-manager.svc:443/mutate?timeout=10s": x509: certificate signed by unknown authority (possibly because of "x509: ECDSA verification failure" while trying to verify candidate authority certificate "cert-manager-webhook-ca")"#
            ),
            Some(Diagnosis::WebhookCertificateUntrusted)
        );
    }

    #[test]
    fn test_unrelated_messages_are_unknown() {
        let classifier = classifier();
        for message in [
            "some unrelated transient network error",
            "",
            "connect: connection refused",
            "dial tcp 10.0.0.1:6443: connect: connection refused",
            "x509: certificate signed by unknown authority",
            r#"service "cert-manager-webhook" not found"#,
            r#"Post "https://x.svc/mutate": service "x-webhook" not found, retrying"#,
            r#"Post "https://x.svc/mutate": service "x-api" not found"#,
            r#"Post "https://x.svc/mutate": context deadline exceeded"#,
            "deadline has elapsed",
        ] {
            assert_eq!(classifier.classify(message), None, "{message}");
        }
    }

    #[test]
    fn test_classify_is_deterministic() {
        let classifier = classifier();
        let message = r#"Post "https://x-webhook.svc:443/mutate": service "x-webhook" not found"#;
        let first = classifier.classify(message);
        for _ in 0..10 {
            assert_eq!(classifier.classify(message), first);
        }
    }

    #[test]
    fn test_standard_rule_order() {
        let order: Vec<Diagnosis> = classifier()
            .rules()
            .iter()
            .map(ClassificationRule::diagnosis)
            .collect();
        assert_eq!(
            order,
            [
                Diagnosis::CrdsNotInstalled,
                Diagnosis::WebhookServiceMissing,
                Diagnosis::WebhookDeploymentUnreachable,
                Diagnosis::WebhookCertificateUntrusted,
            ]
        );
    }

    #[test]
    fn test_earlier_rule_wins_on_overlap() {
        let message = r#"Post "https://x-webhook.svc:443/mutate": x509: certificate signed by unknown authority"#;
        let refused = ClassificationRule::new(r"^Post .*$", Diagnosis::WebhookDeploymentUnreachable)
            .unwrap();
        let untrusted = ClassificationRule::new(
            &format!("{WEBHOOK_PREFIX}{WEBHOOK_UNKNOWN_AUTHORITY}"),
            Diagnosis::WebhookCertificateUntrusted,
        )
        .unwrap();

        let classifier = Classifier::with_rules(vec![refused.clone(), untrusted.clone()]);
        assert_eq!(
            classifier.classify(message),
            Some(Diagnosis::WebhookDeploymentUnreachable)
        );

        let classifier = Classifier::with_rules(vec![untrusted, refused]);
        assert_eq!(
            classifier.classify(message),
            Some(Diagnosis::WebhookCertificateUntrusted)
        );
    }

    #[test]
    fn test_empty_table_classifies_nothing() {
        let classifier = Classifier::with_rules(Vec::new());
        assert_eq!(
            classifier.classify(r#"Post "u": service "x-webhook" not found"#),
            None
        );
    }
}
