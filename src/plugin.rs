use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::attributes::Attributes;
use crate::client::ClientResolver;
use crate::convert::ObjectConverter;
use crate::dispatcher::{Admitted, ValidatingDispatcher};
use crate::error::Error;
use crate::selector::NamespaceLister;
use crate::source::WebhookSource;

pub const VALIDATING_ADMISSION_WEBHOOK: &str = "ValidatingAdmissionWebhook";

/// A validating admission stage.
#[async_trait]
pub trait AdmissionPlugin: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(
        &self,
        attrs: &Attributes,
        cancel: &CancellationToken,
    ) -> Result<Admitted, Error>;
}

/// Collaborators handed to plugin factories.
#[derive(Clone)]
pub struct PluginContext {
    pub source: Arc<dyn WebhookSource>,
    pub namespaces: Arc<dyn NamespaceLister>,
    pub converter: Arc<dyn ObjectConverter>,
    pub resolver: Arc<dyn ClientResolver>,
}

pub type Factory = fn(&PluginContext) -> Result<Arc<dyn AdmissionPlugin>, Error>;

/// Name to factory table. Built once at start and passed to whoever
/// assembles the admission chain.
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, Factory>,
}

impl PluginRegistry {
    pub fn new() -> PluginRegistry {
        PluginRegistry::default()
    }

    pub fn register(&mut self, name: &str, factory: Factory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn registered(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiates the named plugins, in the given order.
    pub fn build_chain(
        &self,
        names: &[String],
        ctx: &PluginContext,
    ) -> Result<AdmissionChain, Error> {
        let mut plugins = Vec::with_capacity(names.len());
        for name in names {
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| Error::UnknownPlugin(name.clone()))?;
            plugins.push(factory(ctx)?);
            info!("Admission plugin {} enabled", name);
        }
        Ok(AdmissionChain { plugins })
    }
}

/// Registry with every plugin this crate ships.
pub fn default_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register(VALIDATING_ADMISSION_WEBHOOK, ValidatingAdmissionWebhook::factory);
    registry
}

/// Plugins run in order; the first rejection stops the chain.
pub struct AdmissionChain {
    plugins: Vec<Arc<dyn AdmissionPlugin>>,
}

impl AdmissionChain {
    pub fn new(plugins: Vec<Arc<dyn AdmissionPlugin>>) -> AdmissionChain {
        AdmissionChain { plugins }
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub async fn validate(
        &self,
        attrs: &Attributes,
        cancel: &CancellationToken,
    ) -> Result<Admitted, Error> {
        let mut admitted = Admitted::default();
        for plugin in &self.plugins {
            let result = plugin.validate(attrs, cancel).await?;
            admitted.warnings.extend(result.warnings);
        }
        Ok(admitted)
    }
}

pub struct ValidatingAdmissionWebhook {
    dispatcher: ValidatingDispatcher,
}

impl ValidatingAdmissionWebhook {
    pub fn new(dispatcher: ValidatingDispatcher) -> ValidatingAdmissionWebhook {
        ValidatingAdmissionWebhook { dispatcher }
    }

    fn factory(ctx: &PluginContext) -> Result<Arc<dyn AdmissionPlugin>, Error> {
        let dispatcher = ValidatingDispatcher::new(
            ctx.source.clone(),
            ctx.namespaces.clone(),
            ctx.converter.clone(),
            ctx.resolver.clone(),
        );
        Ok(Arc::new(ValidatingAdmissionWebhook::new(dispatcher)))
    }
}

#[async_trait]
impl AdmissionPlugin for ValidatingAdmissionWebhook {
    fn name(&self) -> &str {
        VALIDATING_ADMISSION_WEBHOOK
    }

    async fn validate(
        &self,
        attrs: &Attributes,
        cancel: &CancellationToken,
    ) -> Result<Admitted, Error> {
        self.dispatcher.admit(attrs, cancel).await
    }
}
