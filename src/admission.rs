use kube::core::{
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
    DynamicObject,
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warp::{reply, Filter, Reply};

use crate::attributes::Attributes;
use crate::config::Config;
use crate::error::Error;
use crate::plugin::AdmissionChain;

/// Serves `POST /validate` until `shutdown` is cancelled. In-flight
/// admissions are cancelled along with it.
pub async fn serve(
    config: Config,
    chain: Arc<AdmissionChain>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let cancel = shutdown.clone();
    let validate = warp::path("validate")
        .and(warp::post())
        .and(warp::body::json())
        .and_then(move |body: AdmissionReview<DynamicObject>| {
            handler(chain.clone(), cancel.child_token(), body)
        })
        .with(warp::trace::request());
    let healthz = warp::path("healthz").and(warp::get()).map(|| "ok");

    let (addr, server) = warp::serve(validate.or(healthz))
        .tls()
        .cert_path(&config.tls_cert)
        .key_path(&config.tls_key)
        .bind_with_graceful_shutdown(([0, 0, 0, 0], config.port), async move {
            shutdown.cancelled().await
        });
    info!("Admission server listening on {}", addr);
    server.await;

    Ok(())
}

async fn handler(
    chain: Arc<AdmissionChain>,
    cancel: CancellationToken,
    body: AdmissionReview<DynamicObject>,
) -> Result<impl Reply, Infallible> {
    // Parse incoming webhook AdmissionRequest first
    let req: AdmissionRequest<_> = match body.try_into() {
        Ok(req) => req,
        Err(err) => {
            return Ok(reply::json(
                &AdmissionResponse::invalid(err.to_string()).into_review(),
            ));
        }
    };

    let res = AdmissionResponse::from(&req);
    let attrs = match Attributes::try_from(req) {
        Ok(attrs) => attrs,
        Err(err) => {
            warn!("Unable to read admission request: {}", err);
            return Ok(reply::json(&reject(res, &err).into_review()));
        }
    };

    Ok(reply::json(
        &respond(&chain, &attrs, &cancel, res).await.into_review(),
    ))
}

async fn respond(
    chain: &AdmissionChain,
    attrs: &Attributes,
    cancel: &CancellationToken,
    res: AdmissionResponse,
) -> AdmissionResponse {
    match chain.validate(attrs, cancel).await {
        Ok(admitted) => {
            info!(
                "Admitted {} {}/{}",
                attrs.resource_path(),
                attrs.namespace,
                attrs.name
            );
            let mut res = res;
            if !admitted.warnings.is_empty() {
                res.warnings = Some(admitted.warnings);
            }
            res
        }
        Err(err) => {
            warn!(
                "Rejected {} {}/{}: {}",
                attrs.resource_path(),
                attrs.namespace,
                attrs.name,
                err
            );
            reject(res, &err)
        }
    }
}

/// Denies with the error's message and status code.
fn reject(res: AdmissionResponse, err: &Error) -> AdmissionResponse {
    let mut res = res.deny(err.to_string());
    res.result.code = err.status_code().as_u16();
    res
}
