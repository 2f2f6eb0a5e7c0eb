use http::StatusCode;
use thiserror::Error;

use crate::client::CallError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("webhook configuration unavailable: {0}")]
    ConfigurationUnavailable(String),
    #[error("unable to look up namespace {namespace}: {reason}")]
    NamespaceLookupFailed { namespace: String, reason: String },
    #[error("invalid selector on webhook {webhook}: {reason}")]
    InvalidSelector { webhook: String, reason: String },
    #[error("admission webhook \"{0}\" does not support dry run")]
    DryRunUnsupported(String),
    #[error("UnableToConvertObject: {0}")]
    Conversion(String),
    #[error("failed calling webhook \"{webhook}\": {source}")]
    CallFailed {
        webhook: String,
        #[source]
        source: CallError,
    },
    /// The webhook answered and refused the request. `message` is the full
    /// user facing text.
    #[error("{message}")]
    Rejected {
        webhook: String,
        code: u16,
        message: String,
    },
    #[error("UnknownPlugin: {0}")]
    UnknownPlugin(String),
    #[error("InvalidConfig: {0}")]
    InvalidConfig(String),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("UnableToSerializeObject: {0}")]
    UnableToSerializeObject(#[from] serde_json::Error),
    #[error("UnableToParseYaml: {0}")]
    UnableToParseYaml(#[from] serde_yaml::Error),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds the rejection for a webhook that answered `allowed: false`.
    pub fn rejected(webhook: &str, code: Option<u16>, message: &str) -> Error {
        let message = if message.is_empty() {
            format!(
                "admission webhook \"{}\" denied the request without explanation",
                webhook
            )
        } else {
            format!("admission webhook \"{}\" denied the request: {}", webhook, message)
        };
        Error::Rejected {
            webhook: webhook.to_string(),
            code: code.filter(|c| *c != 0).unwrap_or(403),
            message,
        }
    }

    /// Name of the webhook responsible for this error, if there is one.
    pub fn webhook(&self) -> Option<&str> {
        match self {
            Error::CallFailed { webhook, .. } | Error::Rejected { webhook, .. } => Some(webhook),
            Error::InvalidSelector { webhook, .. } => Some(webhook),
            Error::DryRunUnsupported(webhook) => Some(webhook),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Rejected { code, .. } => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::FORBIDDEN)
            }
            Error::ConfigurationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::DryRunUnsupported(_) | Error::UnableToSerializeObject(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
