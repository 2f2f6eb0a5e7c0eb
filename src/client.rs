use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::WebhookClientConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::review::{AdmissionReviewRequest, AdmissionReviewResponse};

/// Why a single webhook could not produce a usable answer.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("unable to resolve webhook client: {0}")]
    Resolve(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook responded with status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("request was cancelled")]
    Cancelled,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no supported AdmissionReview version among {0:?}")]
    UnsupportedReviewVersions(Vec<String>),
}

/// One webhook endpoint.
#[async_trait]
pub trait WebhookClient: Send + Sync {
    async fn call(
        &self,
        review: &AdmissionReviewRequest<'_>,
    ) -> Result<AdmissionReviewResponse, CallError>;
}

/// Hands out a client able to reach the webhook described by `config`.
pub trait ClientResolver: Send + Sync {
    fn resolve(&self, config: &WebhookClientConfig)
        -> Result<Arc<dyn WebhookClient>, CallError>;
}

/// The URL a webhook is reached at. Service references resolve to the
/// cluster DNS name of the service.
pub fn webhook_url(config: &WebhookClientConfig) -> Result<String, CallError> {
    if let Some(url) = &config.url {
        if !url.starts_with("https://") {
            return Err(CallError::Resolve(format!("webhook url {} is not https", url)));
        }
        return Ok(url.clone());
    }
    match &config.service {
        Some(svc) => Ok(format!(
            "https://{}.{}.svc:{}{}",
            svc.name,
            svc.namespace,
            svc.port.unwrap_or(443),
            svc.path.as_deref().unwrap_or("")
        )),
        None => Err(CallError::Resolve(
            "clientConfig has neither url nor service".into(),
        )),
    }
}

#[derive(Hash, PartialEq, Eq, Clone)]
struct ClientKey {
    url: String,
    ca_bundle: Vec<u8>,
}

/// Upper bound on cached clients. Rotated URLs and CA bundles leave stale
/// entries behind, so a full cache is dropped and rebuilt on demand.
pub const MAX_CACHED_CLIENTS: usize = 256;

/// Resolves HTTPS clients trusting each webhook's CA bundle. Clients are
/// cached per URL and bundle; the cache is only touched under its lock.
pub struct HttpClientResolver {
    clients: Mutex<HashMap<ClientKey, Arc<dyn WebhookClient>>>,
    capacity: usize,
}

impl Default for HttpClientResolver {
    fn default() -> HttpClientResolver {
        HttpClientResolver::with_capacity(MAX_CACHED_CLIENTS)
    }
}

impl HttpClientResolver {
    pub fn new() -> HttpClientResolver {
        HttpClientResolver::default()
    }

    pub fn with_capacity(capacity: usize) -> HttpClientResolver {
        HttpClientResolver {
            clients: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }
}

impl ClientResolver for HttpClientResolver {
    fn resolve(
        &self,
        config: &WebhookClientConfig,
    ) -> Result<Arc<dyn WebhookClient>, CallError> {
        let key = ClientKey {
            url: webhook_url(config)?,
            ca_bundle: config
                .ca_bundle
                .as_ref()
                .map(|b| b.0.clone())
                .unwrap_or_default(),
        };
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| CallError::Resolve("client cache poisoned".into()))?;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }
        debug!("Building webhook client for {}", key.url);
        let client: Arc<dyn WebhookClient> = Arc::new(HttpWebhookClient::build(&key)?);
        if clients.len() >= self.capacity {
            debug!("Webhook client cache full, dropping {} clients", clients.len());
            clients.clear();
        }
        clients.insert(key, client.clone());
        Ok(client)
    }
}

pub struct HttpWebhookClient {
    url: String,
    http: reqwest::Client,
}

impl HttpWebhookClient {
    fn build(key: &ClientKey) -> Result<HttpWebhookClient, CallError> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();
        if !key.ca_bundle.is_empty() {
            let cert = reqwest::Certificate::from_pem(&key.ca_bundle)
                .map_err(|e| CallError::Resolve(format!("invalid caBundle: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| CallError::Resolve(e.to_string()))?;
        Ok(HttpWebhookClient {
            url: key.url.clone(),
            http,
        })
    }
}

#[async_trait]
impl WebhookClient for HttpWebhookClient {
    async fn call(
        &self,
        review: &AdmissionReviewRequest<'_>,
    ) -> Result<AdmissionReviewResponse, CallError> {
        let response = self.http.post(&self.url).json(review).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Status {
                code: status.as_u16(),
                body,
            });
        }
        response
            .json::<AdmissionReviewResponse>()
            .await
            .map_err(|e| CallError::Malformed(e.to_string()))
    }
}
