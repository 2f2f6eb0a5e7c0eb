use k8s_openapi::api::admissionregistration::v1::ValidatingWebhook;
use serde_json::Value;
use uuid::Uuid;

use crate::attributes::{Attributes, GroupVersionKind};
use crate::client::CallError;
use crate::error::Error;
use crate::review::{
    api_version_for, AdmissionReviewRequest, ReviewRequest, KIND, SUPPORTED_VERSIONS,
};

/// Turns an internal object into the external form sent to webhooks.
pub trait ObjectConverter: Send + Sync {
    fn convert(&self, object: &Value, kind: &GroupVersionKind) -> Result<Value, Error>;
}

/// Objects already use the external JSON layout, so conversion only checks
/// the shape and stamps the type information.
pub struct JsonConverter;

impl ObjectConverter for JsonConverter {
    fn convert(&self, object: &Value, kind: &GroupVersionKind) -> Result<Value, Error> {
        let mut external = match object {
            Value::Object(map) => map.clone(),
            other => {
                return Err(Error::Conversion(format!(
                    "{} must be a JSON object, got {}",
                    kind.kind, other
                )))
            }
        };
        external.insert("apiVersion".into(), Value::String(kind.api_version()));
        external.insert("kind".into(), Value::String(kind.kind.clone()));
        Ok(Value::Object(external))
    }
}

/// The request together with its converted objects. Built once per admission
/// and shared by every webhook call of that admission.
pub struct VersionedAttributes<'a> {
    pub attrs: &'a Attributes,
    pub object: Option<Value>,
    pub old_object: Option<Value>,
}

impl<'a> VersionedAttributes<'a> {
    pub fn new(
        attrs: &'a Attributes,
        converter: &dyn ObjectConverter,
    ) -> Result<VersionedAttributes<'a>, Error> {
        let object = attrs
            .object
            .as_ref()
            .map(|o| converter.convert(o, &attrs.kind))
            .transpose()?;
        let old_object = attrs
            .old_object
            .as_ref()
            .map(|o| converter.convert(o, &attrs.kind))
            .transpose()?;
        Ok(VersionedAttributes {
            attrs,
            object,
            old_object,
        })
    }

    /// Builds the review sent to `webhook`, in the first review version it
    /// accepts that we support. Every call gets its own uid.
    pub fn review_for(
        &self,
        webhook: &ValidatingWebhook,
    ) -> Result<AdmissionReviewRequest<'_>, CallError> {
        let version = webhook
            .admission_review_versions
            .iter()
            .find(|v| SUPPORTED_VERSIONS.contains(&v.as_str()))
            .ok_or_else(|| {
                CallError::UnsupportedReviewVersions(webhook.admission_review_versions.clone())
            })?;
        let attrs = self.attrs;
        Ok(AdmissionReviewRequest {
            api_version: api_version_for(version),
            kind: KIND,
            request: ReviewRequest {
                uid: Uuid::new_v4().to_string(),
                kind: &attrs.kind,
                resource: &attrs.resource,
                sub_resource: &attrs.sub_resource,
                request_kind: &attrs.kind,
                request_resource: &attrs.resource,
                request_sub_resource: &attrs.sub_resource,
                name: &attrs.name,
                namespace: &attrs.namespace,
                operation: &attrs.operation,
                user_info: &attrs.user_info,
                object: self.object.as_ref(),
                old_object: self.old_object.as_ref(),
                dry_run: attrs.dry_run,
            },
        })
    }
}
