use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::ValidatingWebhook;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::core::admission::Operation;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::attributes::Attributes;
use crate::error::Error;

pub type Labels = BTreeMap<String, String>;

/// Label set on every namespace carrying its own name.
pub const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("namespace {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Api(String),
}

/// Resolves the labels of a namespace.
#[async_trait]
pub trait NamespaceLister: Send + Sync {
    async fn labels(&self, namespace: &str) -> Result<Labels, LookupError>;
}

/// Evaluates a label selector. `Err` carries the reason the selector is invalid.
pub fn selector_matches(selector: &LabelSelector, labels: &Labels) -> Result<bool, String> {
    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            if labels.get(key) != Some(value) {
                return Ok(false);
            }
        }
    }
    for requirement in selector.match_expressions.iter().flatten() {
        if !requirement_matches(requirement, labels)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn requirement_matches(req: &LabelSelectorRequirement, labels: &Labels) -> Result<bool, String> {
    let values = req.values.as_deref().unwrap_or_default();
    let current = labels.get(&req.key);
    match req.operator.as_str() {
        "In" | "NotIn" if values.is_empty() => Err(format!(
            "values must be non-empty for operator {} on key {}",
            req.operator, req.key
        )),
        "Exists" | "DoesNotExist" if !values.is_empty() => Err(format!(
            "values must be empty for operator {} on key {}",
            req.operator, req.key
        )),
        "In" => Ok(current.map_or(false, |v| values.contains(v))),
        "NotIn" => Ok(current.map_or(true, |v| !values.contains(v))),
        "Exists" => Ok(current.is_some()),
        "DoesNotExist" => Ok(current.is_none()),
        other => Err(format!("unknown label selector operator {}", other)),
    }
}

fn is_empty(selector: &Option<LabelSelector>) -> bool {
    match selector {
        None => true,
        Some(s) => {
            s.match_labels.as_ref().map_or(true, |m| m.is_empty())
                && s.match_expressions.as_ref().map_or(true, |e| e.is_empty())
        }
    }
}

fn object_labels(object: &Value) -> Labels {
    object
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Decides whether the namespace targeted by a request satisfies a
/// webhook's namespaceSelector.
#[derive(Clone)]
pub struct NamespaceMatcher {
    lister: Arc<dyn NamespaceLister>,
}

impl NamespaceMatcher {
    pub fn new(lister: Arc<dyn NamespaceLister>) -> NamespaceMatcher {
        NamespaceMatcher { lister }
    }

    pub async fn matches(
        &self,
        webhook: &ValidatingWebhook,
        attrs: &Attributes,
    ) -> Result<bool, Error> {
        if is_empty(&webhook.namespace_selector) {
            return Ok(true);
        }
        let labels = if attrs.is_namespace_object() {
            namespace_object_labels(attrs)
        } else if attrs.is_cluster_scoped() {
            return Ok(true);
        } else {
            self.lister
                .labels(&attrs.namespace)
                .await
                .map_err(|e| Error::NamespaceLookupFailed {
                    namespace: attrs.namespace.clone(),
                    reason: e.to_string(),
                })?
        };
        let selector = match &webhook.namespace_selector {
            Some(selector) => selector,
            None => return Ok(true),
        };
        selector_matches(selector, &labels).map_err(|reason| Error::InvalidSelector {
            webhook: webhook.name.clone(),
            reason,
        })
    }
}

/// A Namespace is matched on its own labels, never looked up.
fn namespace_object_labels(attrs: &Attributes) -> Labels {
    let source = match attrs.operation {
        Operation::Delete => attrs.old_object.as_ref(),
        _ => attrs.object.as_ref(),
    };
    let mut labels = source.map(object_labels).unwrap_or_default();
    if !attrs.name.is_empty() {
        labels.insert(NAMESPACE_NAME_LABEL.to_string(), attrs.name.clone());
    }
    labels
}

/// Evaluates a webhook's objectSelector. Either the object or the old object
/// matching is enough.
pub fn object_matches(webhook: &ValidatingWebhook, attrs: &Attributes) -> Result<bool, Error> {
    let selector = match &webhook.object_selector {
        Some(selector) if !is_empty(&webhook.object_selector) => selector,
        _ => return Ok(true),
    };
    let invalid = |reason| Error::InvalidSelector {
        webhook: webhook.name.clone(),
        reason,
    };
    for object in [&attrs.object, &attrs.old_object].into_iter().flatten() {
        if selector_matches(selector, &object_labels(object)).map_err(invalid)? {
            return Ok(true);
        }
    }
    Ok(false)
}
