use k8s_openapi::api::admissionregistration::v1::{RuleWithOperations, ValidatingWebhook};

use crate::attributes::{operation_name, Attributes};

const ALL: &str = "*";

/// Matches one rule against the request. Pure and total: every well formed
/// request yields an answer.
pub struct Matcher<'a> {
    pub rule: &'a RuleWithOperations,
    pub attrs: &'a Attributes,
}

impl<'a> Matcher<'a> {
    pub fn new(rule: &'a RuleWithOperations, attrs: &'a Attributes) -> Matcher<'a> {
        Matcher { rule, attrs }
    }

    pub fn matches(&self) -> bool {
        self.scope() && self.operation() && self.group() && self.version() && self.resource()
    }

    fn operation(&self) -> bool {
        let op = operation_name(&self.attrs.operation);
        listed(&self.rule.operations, |o| o == ALL || o == op)
    }

    fn group(&self) -> bool {
        listed(&self.rule.api_groups, |g| g == ALL || *g == self.attrs.resource.group)
    }

    fn version(&self) -> bool {
        listed(&self.rule.api_versions, |v| {
            v == ALL || *v == self.attrs.resource.version
        })
    }

    fn resource(&self) -> bool {
        let requested = self.attrs.resource.resource.as_str();
        let requested_sub = self.attrs.sub_resource.as_str();
        listed(&self.rule.resources, |entry| {
            // a bare "*" covers subresources as well as main resources
            if entry == ALL {
                return true;
            }
            let (res, sub) = split_resource(entry);
            let res_match = res == ALL || res == requested;
            let sub_match = match sub {
                // "pods/*" covers subresources only, "*/*" covers everything
                ALL => res == ALL || !requested_sub.is_empty(),
                _ => sub == requested_sub,
            };
            res_match && sub_match
        })
    }

    fn scope(&self) -> bool {
        match self.rule.scope.as_deref() {
            Some("Cluster") => self.cluster_scoped(),
            Some("Namespaced") => !self.cluster_scoped(),
            _ => true,
        }
    }

    /// Namespace objects carry their own name as namespace but are cluster
    /// scoped.
    fn cluster_scoped(&self) -> bool {
        self.attrs.is_namespace_object() || self.attrs.is_cluster_scoped()
    }
}

fn listed<F>(values: &Option<Vec<String>>, pred: F) -> bool
where
    F: Fn(&String) -> bool,
{
    values.as_ref().map_or(false, |v| v.iter().any(pred))
}

fn split_resource(entry: &str) -> (&str, &str) {
    match entry.split_once('/') {
        Some((res, sub)) => (res, sub),
        None => (entry, ""),
    }
}

/// True when any of the webhook's rules matches the request.
pub fn webhook_applies(webhook: &ValidatingWebhook, attrs: &Attributes) -> bool {
    webhook
        .rules
        .as_ref()
        .map_or(false, |rules| rules.iter().any(|r| Matcher::new(r, attrs).matches()))
}

/// Webhook configurations are never sent to webhooks, otherwise a broken
/// webhook could prevent its own removal.
pub fn is_exempt(attrs: &Attributes) -> bool {
    attrs.resource.group == "admissionregistration.k8s.io"
        && matches!(
            attrs.resource.resource.as_str(),
            "validatingwebhookconfigurations" | "mutatingwebhookconfigurations"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{GroupVersionKind, GroupVersionResource};
    use kube::core::admission::Operation;

    fn rule(
        ops: &[&str],
        groups: &[&str],
        versions: &[&str],
        resources: &[&str],
    ) -> RuleWithOperations {
        let owned = |v: &[&str]| Some(v.iter().map(|s| s.to_string()).collect());
        RuleWithOperations {
            operations: owned(ops),
            api_groups: owned(groups),
            api_versions: owned(versions),
            resources: owned(resources),
            scope: None,
        }
    }

    fn pod_attrs(op: Operation, sub: &str) -> Attributes {
        Attributes::new(
            GroupVersionKind::new("", "v1", "Pod"),
            GroupVersionResource::new("", "v1", "pods"),
            op,
        )
        .with_namespace("default")
        .with_sub_resource(sub)
    }

    #[test]
    fn operation_wildcard_matches_everything() {
        let r = rule(&["*"], &[""], &["v1"], &["pods"]);
        for op in [Operation::Create, Operation::Update, Operation::Delete, Operation::Connect] {
            assert!(Matcher::new(&r, &pod_attrs(op, "")).matches());
        }
    }

    #[test]
    fn operation_must_be_listed() {
        let r = rule(&["CREATE", "UPDATE"], &[""], &["v1"], &["pods"]);
        assert!(Matcher::new(&r, &pod_attrs(Operation::Update, "")).matches());
        assert!(!Matcher::new(&r, &pod_attrs(Operation::Delete, "")).matches());
    }

    #[test]
    fn group_and_version() {
        let attrs = Attributes::new(
            GroupVersionKind::new("apps", "v1", "Deployment"),
            GroupVersionResource::new("apps", "v1", "deployments"),
            Operation::Create,
        )
        .with_namespace("default");
        assert!(Matcher::new(&rule(&["*"], &["apps"], &["v1"], &["*"]), &attrs).matches());
        assert!(Matcher::new(&rule(&["*"], &["*"], &["*"], &["deployments"]), &attrs).matches());
        assert!(!Matcher::new(&rule(&["*"], &[""], &["v1"], &["*"]), &attrs).matches());
        assert!(!Matcher::new(&rule(&["*"], &["apps"], &["v1beta1"], &["*"]), &attrs).matches());
        assert!(!Matcher::new(&rule(&["*"], &[], &["v1"], &["*"]), &attrs).matches());
    }

    #[test]
    fn subresources() {
        let status = pod_attrs(Operation::Update, "status");
        let main = pod_attrs(Operation::Update, "");

        let pods = rule(&["*"], &[""], &["v1"], &["pods"]);
        assert!(Matcher::new(&pods, &main).matches());
        assert!(!Matcher::new(&pods, &status).matches());

        let star = rule(&["*"], &[""], &["v1"], &["*"]);
        assert!(Matcher::new(&star, &main).matches());
        assert!(Matcher::new(&star, &status).matches());

        let all_subs = rule(&["*"], &[""], &["v1"], &["pods/*"]);
        assert!(Matcher::new(&all_subs, &status).matches());
        assert!(!Matcher::new(&all_subs, &main).matches());

        let any_status = rule(&["*"], &[""], &["v1"], &["*/status"]);
        assert!(Matcher::new(&any_status, &status).matches());
        assert!(!Matcher::new(&any_status, &pod_attrs(Operation::Update, "exec")).matches());

        let exact = rule(&["*"], &[""], &["v1"], &["pods/status"]);
        assert!(Matcher::new(&exact, &status).matches());
        assert!(!Matcher::new(&exact, &main).matches());

        let everything = rule(&["*"], &[""], &["v1"], &["*/*"]);
        assert!(Matcher::new(&everything, &status).matches());
        assert!(Matcher::new(&everything, &main).matches());
    }

    #[test]
    fn scope() {
        let mut r = rule(&["*"], &["*"], &["*"], &["*"]);
        let namespaced = pod_attrs(Operation::Create, "");
        let cluster = Attributes::new(
            GroupVersionKind::new("", "v1", "Node"),
            GroupVersionResource::new("", "v1", "nodes"),
            Operation::Create,
        );

        r.scope = Some("Cluster".into());
        assert!(Matcher::new(&r, &cluster).matches());
        assert!(!Matcher::new(&r, &namespaced).matches());

        r.scope = Some("Namespaced".into());
        assert!(!Matcher::new(&r, &cluster).matches());
        assert!(Matcher::new(&r, &namespaced).matches());

        r.scope = Some("*".into());
        assert!(Matcher::new(&r, &cluster).matches());
    }

    #[test]
    fn namespace_objects_are_cluster_scoped() {
        let ns = Attributes::new(
            GroupVersionKind::new("", "v1", "Namespace"),
            GroupVersionResource::new("", "v1", "namespaces"),
            Operation::Create,
        )
        .with_name("team-b")
        .with_namespace("team-b");
        let mut r = rule(&["*"], &[""], &["v1"], &["namespaces"]);

        r.scope = Some("Cluster".into());
        assert!(Matcher::new(&r, &ns).matches());

        r.scope = Some("Namespaced".into());
        assert!(!Matcher::new(&r, &ns).matches());
    }

    #[test]
    fn webhook_needs_one_matching_rule() {
        let attrs = pod_attrs(Operation::Create, "");
        let mut hook = ValidatingWebhook {
            name: "pods.example.com".into(),
            ..Default::default()
        };
        assert!(!webhook_applies(&hook, &attrs));

        hook.rules = Some(vec![
            rule(&["DELETE"], &[""], &["v1"], &["pods"]),
            rule(&["CREATE"], &[""], &["v1"], &["pods"]),
        ]);
        assert!(webhook_applies(&hook, &attrs));
    }

    #[test]
    fn webhook_configurations_are_exempt() {
        let attrs = Attributes::new(
            GroupVersionKind::new(
                "admissionregistration.k8s.io",
                "v1",
                "ValidatingWebhookConfiguration",
            ),
            GroupVersionResource::new(
                "admissionregistration.k8s.io",
                "v1",
                "validatingwebhookconfigurations",
            ),
            Operation::Delete,
        );
        assert!(is_exempt(&attrs));
        assert!(!is_exempt(&pod_attrs(Operation::Delete, "")));
    }
}
