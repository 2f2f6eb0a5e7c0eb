use k8s_openapi::api::admissionregistration::v1::ValidatingWebhook;
use kube::core::ResourceExt;
use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{ArrayValidation, InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A named group of validating webhooks the dispatcher fans requests out to.
#[derive(CustomResource, Serialize, Deserialize, Clone, PartialEq, Debug, JsonSchema)]
#[kube(group = "webhook-dispatch.io", version = "v1", kind = "WebhookDispatch")]
#[kube(singular = "webhookdispatch", plural = "webhookdispatches")]
pub struct WebhookDispatchSpec {
    /// Raw `ValidatingWebhook` definitions, same shape as in a
    /// ValidatingWebhookConfiguration.
    #[schemars(schema_with = "preserve_unknown_list")]
    pub webhooks: Vec<Value>,
}

fn preserve_unknown_list(_: &mut SchemaGenerator) -> Schema {
    let mut item = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    item.extensions
        .insert("x-kubernetes-preserve-unknown-fields".into(), Value::Bool(true));
    SchemaObject {
        instance_type: Some(InstanceType::Array.into()),
        array: Some(Box::new(ArrayValidation {
            items: Some(Schema::Object(item).into()),
            ..Default::default()
        })),
        ..Default::default()
    }
    .into()
}

impl WebhookDispatch {
    /// The webhooks in listed order. Entries that do not parse are skipped.
    pub fn validating_webhooks(&self) -> Vec<ValidatingWebhook> {
        self.spec
            .webhooks
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| match serde_json::from_value(raw.clone()) {
                Ok(hook) => Some(hook),
                Err(e) => {
                    warn!("Skipping webhook {} of {}: {}", i, self.name_any(), e);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;
    use kube::CustomResourceExt;
    use serde_json::json;

    #[test]
    fn invalid_entries_are_skipped() {
        let dispatch = WebhookDispatch {
            metadata: ObjectMeta {
                name: Some("policies".into()),
                ..Default::default()
            },
            spec: WebhookDispatchSpec {
                webhooks: vec![
                    json!({
                        "name": "good.example.com",
                        "admissionReviewVersions": ["v1"],
                        "sideEffects": "None",
                        "clientConfig": {"url": "https://good.example.com"}
                    }),
                    json!({"name": 42}),
                ],
            },
        };
        let hooks = dispatch.validating_webhooks();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].name, "good.example.com");
    }

    #[test]
    fn crd_is_cluster_scoped_with_open_items() {
        let crd = WebhookDispatch::crd();
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.names.plural, "webhookdispatches");
        let schema = serde_json::to_value(&crd.spec.versions[0].schema).unwrap();
        let items = "/openAPIV3Schema/properties/spec/properties/webhooks/items";
        assert_eq!(
            schema.pointer(&format!("{}/x-kubernetes-preserve-unknown-fields", items)),
            Some(&json!(true))
        );
    }
}
