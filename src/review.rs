//! The AdmissionReview envelope exchanged with webhook services.
//!
//! Requests borrow the shared, already converted objects so one admission
//! can be sent to many webhooks without copying the payload.

use k8s_openapi::api::authentication::v1::UserInfo;
use kube::core::admission::Operation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attributes::{GroupVersionKind, GroupVersionResource};
use crate::client::CallError;

pub const KIND: &str = "AdmissionReview";
pub const API_VERSION_V1: &str = "admission.k8s.io/v1";
pub const API_VERSION_V1BETA1: &str = "admission.k8s.io/v1beta1";

/// Review versions this dispatcher can speak, most preferred first.
pub const SUPPORTED_VERSIONS: [&str; 2] = ["v1", "v1beta1"];

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewRequest<'a> {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub request: ReviewRequest<'a>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest<'a> {
    pub uid: String,
    pub kind: &'a GroupVersionKind,
    pub resource: &'a GroupVersionResource,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub sub_resource: &'a str,
    pub request_kind: &'a GroupVersionKind,
    pub request_resource: &'a GroupVersionResource,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub request_sub_resource: &'a str,
    pub name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub namespace: &'a str,
    pub operation: &'a Operation,
    pub user_info: &'a UserInfo,
    pub object: Option<&'a Value>,
    pub old_object: Option<&'a Value>,
    pub dry_run: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub response: Option<ReviewResponse>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    #[serde(default)]
    pub uid: String,
    pub allowed: bool,
    #[serde(default)]
    pub status: Option<ResponseStatus>,
    #[serde(default)]
    pub patch: Option<String>,
    #[serde(default)]
    pub patch_type: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ResponseStatus {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
}

impl AdmissionReviewResponse {
    /// Checks the envelope against the request it answers and hands back the
    /// inner response.
    pub fn verify(self, request: &AdmissionReviewRequest<'_>) -> Result<ReviewResponse, CallError> {
        if self.kind != KIND {
            return Err(CallError::Malformed(format!(
                "expected kind {}, got {:?}",
                KIND, self.kind
            )));
        }
        if self.api_version != request.api_version {
            return Err(CallError::Malformed(format!(
                "expected apiVersion {}, got {:?}",
                request.api_version, self.api_version
            )));
        }
        let response = self
            .response
            .ok_or_else(|| CallError::Malformed("response is missing".into()))?;
        if response.uid != request.request.uid {
            return Err(CallError::Malformed(format!(
                "expected response.uid {:?}, got {:?}",
                request.request.uid, response.uid
            )));
        }
        if response.patch.is_some() || response.patch_type.is_some() {
            return Err(CallError::Malformed(
                "validating webhooks may not return patches".into(),
            ));
        }
        Ok(response)
    }
}

impl ReviewResponse {
    pub fn message(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.message.as_str())
    }

    pub fn code(&self) -> Option<u16> {
        self.status.as_ref().and_then(|s| s.code)
    }
}

pub fn api_version_for(review_version: &str) -> &'static str {
    match review_version {
        "v1beta1" => API_VERSION_V1BETA1,
        _ => API_VERSION_V1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request<'a>(
        kind: &'a GroupVersionKind,
        resource: &'a GroupVersionResource,
        user: &'a UserInfo,
        object: &'a Value,
    ) -> AdmissionReviewRequest<'a> {
        AdmissionReviewRequest {
            api_version: API_VERSION_V1,
            kind: KIND,
            request: ReviewRequest {
                uid: "abc".into(),
                kind,
                resource,
                sub_resource: "",
                request_kind: kind,
                request_resource: resource,
                request_sub_resource: "",
                name: "web",
                namespace: "default",
                operation: &Operation::Create,
                user_info: user,
                object: Some(object),
                old_object: None,
                dry_run: false,
            },
        }
    }

    #[test]
    fn request_serializes_as_camel_case_review() {
        let kind = GroupVersionKind::new("", "v1", "Pod");
        let resource = GroupVersionResource::new("", "v1", "pods");
        let user = UserInfo {
            username: Some("alice".into()),
            ..Default::default()
        };
        let object = json!({"apiVersion": "v1", "kind": "Pod"});
        let body = serde_json::to_value(request(&kind, &resource, &user, &object)).unwrap();

        assert_eq!(body["kind"], "AdmissionReview");
        assert_eq!(body["apiVersion"], "admission.k8s.io/v1");
        assert_eq!(body["request"]["operation"], "CREATE");
        assert_eq!(body["request"]["userInfo"]["username"], "alice");
        assert_eq!(body["request"]["requestResource"]["resource"], "pods");
        assert_eq!(body["request"]["oldObject"], Value::Null);
        assert!(body["request"].get("subResource").is_none());
    }

    #[test]
    fn verify_checks_envelope() {
        let kind = GroupVersionKind::new("", "v1", "Pod");
        let resource = GroupVersionResource::new("", "v1", "pods");
        let user = UserInfo::default();
        let object = json!({});
        let req = request(&kind, &resource, &user, &object);

        let parse = |v: Value| serde_json::from_value::<AdmissionReviewResponse>(v).unwrap();

        let ok = parse(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "response": {"uid": "abc", "allowed": false, "status": {"code": 422, "message": "no"}}
        }))
        .verify(&req)
        .unwrap();
        assert!(!ok.allowed);
        assert_eq!(ok.code(), Some(422));
        assert_eq!(ok.message(), "no");

        for bad in [
            json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"}),
            json!({"apiVersion": "admission.k8s.io/v1beta1", "kind": "AdmissionReview",
                   "response": {"uid": "abc", "allowed": true}}),
            json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview",
                   "response": {"uid": "other", "allowed": true}}),
            json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview",
                   "response": {"uid": "abc", "allowed": true,
                                "patchType": "JSONPatch", "patch": "W10="}}),
        ] {
            assert!(matches!(parse(bad).verify(&req), Err(CallError::Malformed(_))));
        }
    }
}
