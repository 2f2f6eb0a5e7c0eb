use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::core::v1::Namespace;
use kube::core::ResourceExt;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::crd::WebhookDispatch;
use crate::selector::{Labels, LookupError, NamespaceLister};
use crate::source::{SourceError, WebhookSource, Webhooks};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SyncState {
    Pending,
    Synced,
    /// The WebhookDispatch API is not served by this cluster.
    Disabled,
}

/// Webhooks from the cluster's WebhookDispatch objects, cached by a watch.
#[derive(Clone)]
pub struct ClusterSource {
    reader: Store<WebhookDispatch>,
    state: Arc<RwLock<SyncState>>,
}

impl ClusterSource {
    /// Returns the source and the watch that keeps it current. The watch
    /// must be driven for the source to ever become available.
    pub fn new(client: Client) -> (ClusterSource, BoxFuture<'static, ()>) {
        let api: Api<WebhookDispatch> = Api::all(client);
        let (reader, writer) = reflector::store();
        let state = Arc::new(RwLock::new(SyncState::Pending));
        let source = ClusterSource {
            reader,
            state: state.clone(),
        };

        let watch = async move {
            let mut events =
                reflector(writer, watcher(api, watcher::Config::default()).default_backoff())
                    .boxed();
            while let Some(event) = events.next().await {
                let next = match event {
                    Ok(watcher::Event::Restarted(dispatches)) => {
                        info!("WebhookDispatch cache synced with {} objects", dispatches.len());
                        Some(SyncState::Synced)
                    }
                    Ok(_) => None,
                    Err(watcher::Error::InitialListFailed(kube::Error::Api(resp)))
                        if resp.code == 404 =>
                    {
                        warn!("WebhookDispatch API not found, webhook dispatch disabled");
                        Some(SyncState::Disabled)
                    }
                    Err(e) => {
                        warn!("WebhookDispatch watch failed: {:?}", e);
                        None
                    }
                };
                if let (Some(next), Ok(mut current)) = (next, state.write()) {
                    *current = next;
                }
            }
        }
        .boxed();

        (source, watch)
    }

    fn state(&self) -> Result<SyncState, SourceError> {
        self.state
            .read()
            .map(|s| *s)
            .map_err(|_| SourceError::Unavailable("sync state poisoned".into()))
    }
}

#[async_trait]
impl WebhookSource for ClusterSource {
    async fn webhooks(&self) -> Result<Webhooks, SourceError> {
        match self.state()? {
            SyncState::Pending => Err(SourceError::Unavailable(
                "WebhookDispatch cache not synced".into(),
            )),
            SyncState::Disabled => Err(SourceError::Disabled),
            SyncState::Synced => {
                let mut dispatches = self.reader.state();
                dispatches.sort_by_key(|d| d.name_any());
                Ok(Arc::new(
                    dispatches
                        .iter()
                        .flat_map(|d| d.validating_webhooks())
                        .collect(),
                ))
            }
        }
    }
}

/// Namespace labels from a watch cache, falling back to a live read for
/// namespaces the cache has not seen yet.
#[derive(Clone)]
pub struct ClusterNamespaceLister {
    api: Api<Namespace>,
    reader: Store<Namespace>,
}

impl ClusterNamespaceLister {
    pub fn new(client: Client) -> (ClusterNamespaceLister, BoxFuture<'static, ()>) {
        let api: Api<Namespace> = Api::all(client);
        let (reader, writer) = reflector::store();
        let lister = ClusterNamespaceLister {
            api: api.clone(),
            reader,
        };
        let watch = reflector(writer, watcher(api, watcher::Config::default()).default_backoff())
            .for_each(|event| async move {
                if let Err(e) = event {
                    warn!("Namespace watch failed: {:?}", e);
                }
            })
            .boxed();
        (lister, watch)
    }
}

#[async_trait]
impl NamespaceLister for ClusterNamespaceLister {
    async fn labels(&self, namespace: &str) -> Result<Labels, LookupError> {
        if let Some(ns) = self.reader.get(&ObjectRef::new(namespace)) {
            return Ok(ns.labels().clone());
        }
        match self.api.get_opt(namespace).await {
            Ok(Some(ns)) => Ok(ns.labels().clone()),
            Ok(None) => Err(LookupError::NotFound(namespace.to_string())),
            Err(e) => Err(LookupError::Api(e.to_string())),
        }
    }
}
