use k8s_openapi::api::authentication::v1::UserInfo;
use kube::core::admission::{AdmissionRequest, Operation};
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: &str, version: &str, kind: &str) -> GroupVersionKind {
        GroupVersionKind {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// The `apiVersion` string for this kind, `v1` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: &str, version: &str, resource: &str) -> GroupVersionResource {
        GroupVersionResource {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }
}

pub fn operation_name(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

/// The internal view of one admission request. Objects are kept in their
/// internal JSON form until a webhook actually has to be called.
#[derive(Clone, Debug)]
pub struct Attributes {
    pub uid: String,
    pub kind: GroupVersionKind,
    pub resource: GroupVersionResource,
    /// Empty when the main resource is requested.
    pub sub_resource: String,
    pub name: String,
    /// Empty for cluster scoped resources.
    pub namespace: String,
    pub operation: Operation,
    pub user_info: UserInfo,
    pub object: Option<Value>,
    pub old_object: Option<Value>,
    pub dry_run: bool,
}

impl Attributes {
    pub fn new(
        kind: GroupVersionKind,
        resource: GroupVersionResource,
        operation: Operation,
    ) -> Attributes {
        Attributes {
            uid: String::new(),
            kind,
            resource,
            sub_resource: String::new(),
            name: String::new(),
            namespace: String::new(),
            operation,
            user_info: UserInfo::default(),
            object: None,
            old_object: None,
            dry_run: false,
        }
    }

    pub fn with_uid(mut self, uid: &str) -> Attributes {
        self.uid = uid.into();
        self
    }

    pub fn with_name(mut self, name: &str) -> Attributes {
        self.name = name.into();
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Attributes {
        self.namespace = namespace.into();
        self
    }

    pub fn with_sub_resource(mut self, sub_resource: &str) -> Attributes {
        self.sub_resource = sub_resource.into();
        self
    }

    pub fn with_object(mut self, object: Value) -> Attributes {
        self.object = Some(object);
        self
    }

    pub fn with_old_object(mut self, old_object: Value) -> Attributes {
        self.old_object = Some(old_object);
        self
    }

    pub fn with_user(mut self, user_info: UserInfo) -> Attributes {
        self.user_info = user_info;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Attributes {
        self.dry_run = dry_run;
        self
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }

    /// True when the request targets a Namespace object itself.
    pub fn is_namespace_object(&self) -> bool {
        self.resource.group.is_empty()
            && self.resource.resource == "namespaces"
            && self.sub_resource.is_empty()
    }

    /// `resource` or `resource/subresource`, for logging.
    pub fn resource_path(&self) -> String {
        if self.sub_resource.is_empty() {
            self.resource.resource.clone()
        } else {
            format!("{}/{}", self.resource.resource, self.sub_resource)
        }
    }
}

impl TryFrom<AdmissionRequest<DynamicObject>> for Attributes {
    type Error = Error;

    fn try_from(req: AdmissionRequest<DynamicObject>) -> Result<Attributes, Error> {
        let object = req.object.map(serde_json::to_value).transpose()?;
        let old_object = req.old_object.map(serde_json::to_value).transpose()?;
        Ok(Attributes {
            uid: req.uid,
            kind: GroupVersionKind {
                group: req.kind.group,
                version: req.kind.version,
                kind: req.kind.kind,
            },
            resource: GroupVersionResource {
                group: req.resource.group,
                version: req.resource.version,
                resource: req.resource.resource,
            },
            sub_resource: req.sub_resource.unwrap_or_default(),
            name: req.name,
            namespace: req.namespace.unwrap_or_default(),
            operation: req.operation,
            user_info: req.user_info,
            object,
            old_object,
            dry_run: req.dry_run,
        })
    }
}
