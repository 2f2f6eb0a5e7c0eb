use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::{
    ValidatingWebhook, ValidatingWebhookConfiguration,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::error::Error;

pub type Webhooks = Arc<Vec<ValidatingWebhook>>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    /// The configuration API is switched off, no webhooks apply.
    #[error("webhook configuration source is disabled")]
    Disabled,
    #[error("{0}")]
    Unavailable(String),
}

/// Supplies the point in time list of configured webhooks. Implementations
/// are read concurrently by every in-flight admission.
#[async_trait]
pub trait WebhookSource: Send + Sync {
    async fn webhooks(&self) -> Result<Webhooks, SourceError>;
}

/// Orders configurations by name and flattens their webhooks.
pub fn flatten_configurations(
    mut configs: Vec<ValidatingWebhookConfiguration>,
) -> Vec<ValidatingWebhook> {
    configs.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    configs
        .into_iter()
        .flat_map(|c| c.webhooks.unwrap_or_default())
        .collect()
}

/// A fixed set of webhooks.
pub struct StaticSource {
    webhooks: Webhooks,
}

impl StaticSource {
    pub fn new(webhooks: Vec<ValidatingWebhook>) -> StaticSource {
        StaticSource {
            webhooks: Arc::new(webhooks),
        }
    }

    /// Parses a YAML stream of ValidatingWebhookConfiguration documents.
    pub fn from_yaml(data: &str) -> Result<StaticSource, Error> {
        let mut configs = Vec::new();
        for document in serde_yaml::Deserializer::from_str(data) {
            configs.push(ValidatingWebhookConfiguration::deserialize(document)?);
        }
        Ok(StaticSource::new(flatten_configurations(configs)))
    }

    pub async fn from_file(path: &Path) -> Result<StaticSource, Error> {
        let data = tokio::fs::read_to_string(path).await?;
        let source = StaticSource::from_yaml(&data)?;
        info!(
            "Loaded {} webhooks from {}",
            source.webhooks.len(),
            path.display()
        );
        Ok(source)
    }
}

#[async_trait]
impl WebhookSource for StaticSource {
    async fn webhooks(&self) -> Result<Webhooks, SourceError> {
        Ok(self.webhooks.clone())
    }
}
