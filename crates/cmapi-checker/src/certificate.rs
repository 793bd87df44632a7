use crate::CheckerError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind, TypeMeta};
use serde::{Deserialize, Serialize};

pub const CERTIFICATE_KIND: &str = "Certificate";
pub const CERTIFICATE_PLURAL: &str = "certificates";

pub const GENERATE_NAME: &str = "cmapichecker-";
pub const DNS_NAME: &str = "cmapichecker.example";
pub const SECRET_NAME: &str = "cmapichecker";
pub const ISSUER_NAME: &str = "cmapichecker";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    pub dns_names: Vec<String>,
    pub secret_name: String,
    pub issuer_ref: ObjectReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectReference {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// The `Certificate` type as served by one API group and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateResource {
    group: String,
    version: String,
}

impl CertificateResource {
    /// Register the `Certificate` kind under `group`/`version`.
    ///
    /// # Errors
    /// Returns `CheckerError::Registration` if the group is not a valid DNS
    /// subdomain or the version is empty.
    pub fn new(group: &str, version: &str) -> Result<Self, CheckerError> {
        if !is_dns_subdomain(group) {
            return Err(CheckerError::Registration(format!(
                "invalid API group '{group}'"
            )));
        }
        if version.is_empty() || !version.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CheckerError::Registration(format!(
                "invalid API version '{version}'"
            )));
        }

        Ok(Self {
            group: group.to_string(),
            version: version.to_string(),
        })
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn plural(&self) -> &'static str {
        CERTIFICATE_PLURAL
    }

    #[must_use]
    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(&self.group, &self.version, CERTIFICATE_KIND);
        ApiResource::from_gvk_with_plural(&gvk, self.plural())
    }

    /// Text of the client-side mapping failure when the API server does not
    /// serve the `Certificate` kind for this group.
    #[must_use]
    pub fn no_kind_match_message(&self) -> String {
        format!(
            "error finding the scope of the object: failed to get restmapping: no matches for kind \"{CERTIFICATE_KIND}\" in group \"{}\"",
            self.group
        )
    }

    /// Text of a POST that hit a resource path the API server does not know.
    #[must_use]
    pub fn resource_not_found_message(&self) -> String {
        format!(
            "the server could not find the requested resource (post {}.{})",
            self.plural(),
            self.group
        )
    }
}

/// The throwaway Certificate submitted by every check.
#[must_use]
pub fn synthetic_certificate(resource: &CertificateResource) -> DynamicObject {
    let ar = resource.api_resource();
    let spec = CertificateSpec {
        dns_names: vec![DNS_NAME.to_string()],
        secret_name: SECRET_NAME.to_string(),
        issuer_ref: ObjectReference {
            name: ISSUER_NAME.to_string(),
            kind: None,
            group: None,
        },
    };

    DynamicObject {
        types: Some(TypeMeta {
            api_version: ar.api_version,
            kind: ar.kind,
        }),
        metadata: ObjectMeta {
            generate_name: Some(GENERATE_NAME.to_string()),
            ..Default::default()
        },
        data: serde_json::json!({ "spec": spec }),
    }
}

fn is_dns_subdomain(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}
