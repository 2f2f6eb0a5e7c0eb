use futures::future::join_all;
use k8s_openapi::api::admissionregistration::v1::ValidatingWebhook;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::attributes::Attributes;
use crate::client::{CallError, ClientResolver};
use crate::convert::{ObjectConverter, VersionedAttributes};
use crate::error::Error;
use crate::review::ReviewResponse;
use crate::rules::{is_exempt, webhook_applies};
use crate::selector::{object_matches, NamespaceLister, NamespaceMatcher};
use crate::source::{SourceError, WebhookSource};

const DEFAULT_TIMEOUT_SECONDS: i32 = 10;
const MAX_TIMEOUT_SECONDS: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Fail,
    Ignore,
}

impl FailurePolicy {
    pub fn of(webhook: &ValidatingWebhook) -> FailurePolicy {
        match webhook.failure_policy.as_deref() {
            Some("Ignore") => FailurePolicy::Ignore,
            _ => FailurePolicy::Fail,
        }
    }
}

/// Outcome of an admission every applicable webhook allowed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Admitted {
    /// Warnings returned by the webhooks, in webhook order.
    pub warnings: Vec<String>,
}

pub fn call_timeout(webhook: &ValidatingWebhook) -> Duration {
    let secs = webhook
        .timeout_seconds
        .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
        .clamp(1, MAX_TIMEOUT_SECONDS);
    Duration::from_secs(secs as u64)
}

fn supports_dry_run(webhook: &ValidatingWebhook) -> bool {
    matches!(webhook.side_effects.as_str(), "None" | "NoneOnDryRun")
}

/// Sends admission requests to every applicable validating webhook and folds
/// the answers into one decision. Holds no per-request state.
pub struct ValidatingDispatcher {
    source: Arc<dyn WebhookSource>,
    namespaces: NamespaceMatcher,
    converter: Arc<dyn ObjectConverter>,
    resolver: Arc<dyn ClientResolver>,
}

impl ValidatingDispatcher {
    pub fn new(
        source: Arc<dyn WebhookSource>,
        lister: Arc<dyn NamespaceLister>,
        converter: Arc<dyn ObjectConverter>,
        resolver: Arc<dyn ClientResolver>,
    ) -> ValidatingDispatcher {
        ValidatingDispatcher {
            source,
            namespaces: NamespaceMatcher::new(lister),
            converter,
            resolver,
        }
    }

    /// Admits or rejects one request. `Ok` means allowed; the error of a
    /// rejection names the webhook responsible. Cancelling `cancel` aborts
    /// every outstanding webhook call.
    #[instrument(skip_all, fields(uid = %attrs.uid, resource = %attrs.resource_path()))]
    pub async fn admit(
        &self,
        attrs: &Attributes,
        cancel: &CancellationToken,
    ) -> Result<Admitted, Error> {
        if is_exempt(attrs) {
            return Ok(Admitted::default());
        }
        let webhooks = match self.source.webhooks().await {
            Ok(webhooks) => webhooks,
            Err(SourceError::Disabled) => {
                debug!("Webhook configuration disabled, allowing");
                return Ok(Admitted::default());
            }
            Err(SourceError::Unavailable(reason)) => {
                return Err(Error::ConfigurationUnavailable(reason))
            }
        };

        let relevant = self.relevant_hooks(&webhooks, attrs).await?;
        if relevant.is_empty() {
            return Ok(Admitted::default());
        }
        if attrs.dry_run {
            if let Some(hook) = relevant.iter().find(|h| !supports_dry_run(h)) {
                return Err(Error::DryRunUnsupported(hook.name.clone()));
            }
        }

        let versioned = VersionedAttributes::new(attrs, self.converter.as_ref())?;
        let calls = relevant
            .iter()
            .map(|hook| self.call_hook(hook, &versioned, cancel));
        // results line up with `relevant`, whatever order the calls finish in
        let results = join_all(calls).await;
        reduce(&relevant, results)
    }

    async fn relevant_hooks<'w>(
        &self,
        webhooks: &'w [ValidatingWebhook],
        attrs: &Attributes,
    ) -> Result<Vec<&'w ValidatingWebhook>, Error> {
        let mut relevant = Vec::new();
        for hook in webhooks {
            if !webhook_applies(hook, attrs) {
                continue;
            }
            if !self.namespaces.matches(hook, attrs).await? {
                continue;
            }
            if !object_matches(hook, attrs)? {
                continue;
            }
            relevant.push(hook);
        }
        Ok(relevant)
    }

    async fn call_hook(
        &self,
        hook: &ValidatingWebhook,
        versioned: &VersionedAttributes<'_>,
        cancel: &CancellationToken,
    ) -> Result<ReviewResponse, CallError> {
        let client = self.resolver.resolve(&hook.client_config)?;
        let review = versioned.review_for(hook)?;
        let timeout = call_timeout(hook);
        let started = Instant::now();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(CallError::Cancelled),
            result = tokio::time::timeout(timeout, client.call(&review)) => match result {
                Ok(response) => response?,
                Err(_) => return Err(CallError::Timeout(timeout)),
            },
        };
        debug!(webhook = %hook.name, elapsed = ?started.elapsed(), "Webhook answered");
        response.verify(&review)
    }
}

/// Folds per-webhook results into one decision. The first problem in webhook
/// order wins, the rest are logged.
fn reduce(
    hooks: &[&ValidatingWebhook],
    results: Vec<Result<ReviewResponse, CallError>>,
) -> Result<Admitted, Error> {
    let mut admitted = Admitted::default();
    let mut surfaced = Vec::new();
    for (hook, result) in hooks.iter().zip(results) {
        match result {
            Ok(response) if response.allowed => admitted.warnings.extend(response.warnings),
            Ok(response) => {
                info!(webhook = %hook.name, "Webhook denied the request");
                surfaced.push(Error::rejected(&hook.name, response.code(), response.message()));
            }
            Err(source) => match FailurePolicy::of(hook) {
                FailurePolicy::Ignore => {
                    warn!(
                        webhook = %hook.name,
                        error = %source,
                        "Failed calling webhook, failing open"
                    );
                }
                FailurePolicy::Fail => {
                    error!(
                        webhook = %hook.name,
                        error = %source,
                        "Failed calling webhook, failing closed"
                    );
                    surfaced.push(Error::CallFailed {
                        webhook: hook.name.clone(),
                        source,
                    });
                }
            },
        }
    }

    let mut surfaced = surfaced.into_iter();
    match surfaced.next() {
        None => Ok(admitted),
        Some(first) => {
            for other in surfaced {
                error!(
                    webhook = other.webhook().unwrap_or_default(),
                    error = %other,
                    "Additional webhook rejection"
                );
            }
            Err(first)
        }
    }
}
