use clap::Parser;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use kube::{Client, CustomResourceExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use webhook_dispatch::client::HttpClientResolver;
use webhook_dispatch::cluster::{ClusterNamespaceLister, ClusterSource};
use webhook_dispatch::config::{Config, RunArgs};
use webhook_dispatch::convert::JsonConverter;
use webhook_dispatch::crd::WebhookDispatch;
use webhook_dispatch::source::{StaticSource, WebhookSource};
use webhook_dispatch::{admission, default_registry, Error, PluginContext};

#[derive(Parser)]
#[command(name = "webhook-dispatch")]
#[command(bin_name = "webhook-dispatch")]
enum WebhookDispatchCli {
    /// Serve validating admission requests
    Run(RunArgs),
    /// Print the WebhookDispatch CustomResourceDefinition
    Crd,
}

async fn run(config: Config) -> Result<(), Error> {
    let client = Client::try_default().await?;
    let (namespaces, namespace_watch) = ClusterNamespaceLister::new(client.clone());
    let mut watches: Vec<BoxFuture<'static, ()>> = vec![namespace_watch];

    let source: Arc<dyn WebhookSource> = match &config.webhook_file {
        Some(path) => {
            info!("Loading webhooks from {}", path.display());
            Arc::new(StaticSource::from_file(path).await?)
        }
        None => {
            let (source, watch) = ClusterSource::new(client);
            watches.push(watch);
            Arc::new(source)
        }
    };

    let ctx = PluginContext {
        source,
        namespaces: Arc::new(namespaces),
        converter: Arc::new(JsonConverter),
        resolver: Arc::new(HttpClientResolver::new()),
    };
    let chain = Arc::new(default_registry().build_chain(&config.plugins, &ctx)?);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutting down");
        signal.cancel();
    });

    tokio::select! {
        res = admission::serve(config, chain, shutdown.clone()) => res,
        _ = future::join_all(watches).map(|_| ()) => {
            warn!("Watches ended, stopping");
            shutdown.cancel();
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    match WebhookDispatchCli::parse() {
        WebhookDispatchCli::Run(args) => run(Config::try_from(args)?).await?,
        WebhookDispatchCli::Crd => print!("{}", serde_yaml::to_string(&WebhookDispatch::crd())?),
    };

    Ok(())
}
