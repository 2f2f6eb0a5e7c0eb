pub mod admission;
pub mod attributes;
pub mod client;
pub mod cluster;
pub mod config;
pub mod convert;
pub mod crd;
pub mod dispatcher;
pub mod error;
pub mod plugin;
pub mod review;
pub mod rules;
pub mod selector;
pub mod source;

pub use attributes::Attributes;
pub use dispatcher::{Admitted, FailurePolicy, ValidatingDispatcher};
pub use error::Error;
pub use plugin::{default_registry, AdmissionChain, AdmissionPlugin, PluginContext, PluginRegistry};
pub use source::{StaticSource, WebhookSource};
