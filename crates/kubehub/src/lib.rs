//! Orka kubehub: the kube-rs side of `get`. Discovery resolves what users type
//! into served resources; lists are paged, optionally as server-side tables;
//! watches are plain API watches mapped onto orka events.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use http::header::{HeaderValue, ACCEPT};
use kube::{
    api::{Api, GetParams, ListParams, WatchParams},
    core::{ApiResource, DynamicObject, GroupVersionKind, Request, WatchEvent as KubeWatchEvent},
    discovery::{Discovery, Scope},
    Client, Resource,
};
use metrics::counter;
use orka_core::{
    object, ConvertError, EventStream, EventType, FetchError, FetchRequest, FetchResult, Info, Mapping, ObjectConverter,
    ResourceFetcher, TypeResolver, WatchEvent,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Accept header asking for `meta.k8s.io/v1` tables, falling back to plain JSON.
pub const TABLE_ACCEPT: &str = "application/json;as=Table;v=v1;g=meta.k8s.io, application/json";

const SHORT_NAMES: &[(&str, &str)] = &[
    ("po", "pods"),
    ("svc", "services"),
    ("deploy", "deployments"),
    ("sts", "statefulsets"),
    ("ds", "daemonsets"),
    ("rs", "replicasets"),
    ("ns", "namespaces"),
    ("no", "nodes"),
    ("pvc", "persistentvolumeclaims"),
    ("pv", "persistentvolumes"),
    ("cm", "configmaps"),
    ("ing", "ingresses"),
    ("cj", "cronjobs"),
    ("sa", "serviceaccounts"),
    ("ep", "endpoints"),
    ("ev", "events"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredResource {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
}

impl DiscoveredResource {
    pub fn gvk_key(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.kind)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.kind)
        }
    }

    /// `pods` for the core group, `deployments.apps` otherwise.
    pub fn qualified_plural(&self) -> String {
        if self.group.is_empty() {
            self.plural.clone()
        } else {
            format!("{}.{}", self.plural, self.group)
        }
    }

    pub fn mapping(&self) -> Mapping {
        Mapping::new(&self.group, &self.version, &self.kind, &self.plural, self.namespaced)
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(&self.group, &self.version, &self.kind), &self.plural)
    }
}

/// Served resources in a stable order, core group first.
#[derive(Debug, Clone, Default)]
pub struct ResourceIndex {
    entries: Vec<DiscoveredResource>,
}

impl ResourceIndex {
    pub fn from_entries(mut entries: Vec<DiscoveredResource>) -> Self {
        entries.sort_by(|a, b| a.group.cmp(&b.group).then(a.version.cmp(&b.version)).then(a.kind.cmp(&b.kind)));
        Self { entries }
    }

    pub fn entries(&self) -> &[DiscoveredResource] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a user-typed resource type: plural, singular, kind, short name, each
    /// optionally qualified by group (`deployments.apps`).
    pub fn lookup(&self, name: &str) -> Option<&DiscoveredResource> {
        let lowered = name.to_lowercase();
        let expanded = SHORT_NAMES.iter().find(|(s, _)| *s == lowered).map(|(_, p)| p.to_string()).unwrap_or(lowered);
        let matches = |r: &DiscoveredResource, head: &str| r.plural == head || r.kind.to_lowercase() == head;

        if let Some(r) = self.entries.iter().find(|r| matches(r, &expanded)) {
            return Some(r);
        }
        let (head, group) = expanded.split_once('.')?;
        self.entries.iter().find(|r| r.group == group && matches(r, head))
    }

    pub fn by_mapping(&self, mapping: &Mapping) -> Option<&DiscoveredResource> {
        self.entries.iter().find(|r| r.group == mapping.group && r.kind == mapping.kind)
    }
}

impl TypeResolver for ResourceIndex {
    fn plural_name(&self, kind: &str) -> Option<String> {
        self.entries.iter().find(|r| r.kind == kind).map(DiscoveredResource::qualified_plural)
    }
}

/// Discover served resources (incl. CRDs) using kube Discovery.
pub async fn discover(client: Client) -> Result<ResourceIndex> {
    let discovery = Discovery::new(client).run().await.context("running API discovery")?;
    let mut out = Vec::new();
    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            out.push(DiscoveredResource {
                group: ar.group.clone(),
                version: ar.version.clone(),
                kind: ar.kind.clone(),
                plural: ar.plural.clone(),
                namespaced: matches!(caps.scope, Scope::Namespaced),
            });
        }
    }
    debug!(resources = out.len(), "discovery complete");
    Ok(ResourceIndex::from_entries(out))
}

/// One resource type, optionally narrowed to a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub resource: DiscoveredResource,
    pub name: Option<String>,
}

/// Expand `TYPE[,TYPE...] [NAME...]` or `TYPE/NAME ...` into targets. The flag is
/// true when exactly one object was named.
pub fn parse_targets(args: &[String], index: &ResourceIndex) -> Result<(Vec<Target>, bool), FetchError> {
    let resolve = |ty: &str| {
        index
            .lookup(ty)
            .cloned()
            .ok_or_else(|| FetchError::Invalid(format!("the server doesn't have a resource type {:?}", ty)))
    };

    let mut targets = Vec::new();
    if args.iter().any(|a| a.contains('/')) {
        for arg in args {
            let (ty, name) = arg
                .split_once('/')
                .filter(|(t, n)| !t.is_empty() && !n.is_empty())
                .ok_or_else(|| FetchError::Invalid(format!("there is no need to specify a resource type as a separate argument when passing arguments in resource/name form (e.g. 'orkactl get resource/<resource_name>' instead of 'orkactl get resource resource/<resource_name>'): {}", arg)))?;
            targets.push(Target { resource: resolve(ty)?, name: Some(name.to_string()) });
        }
    } else if let Some((types, names)) = args.split_first() {
        for ty in types.split(',').filter(|t| !t.is_empty()) {
            let resource = resolve(ty)?;
            if names.is_empty() {
                targets.push(Target { resource, name: None });
            } else {
                targets.extend(names.iter().map(|n| Target { resource: resource.clone(), name: Some(n.clone()) }));
            }
        }
    }
    let single = targets.len() == 1 && targets[0].name.is_some();
    Ok((targets, single))
}

fn strip_managed_fields(v: &mut Value) {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
    }
}

/// Display conversion: objects lose `metadata.managedFields`, lists per item.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayConverter;

impl ObjectConverter for DisplayConverter {
    fn convert_for_display(&self, obj: &Value, mapping: &Mapping) -> Result<Value, ConvertError> {
        if !obj.is_object() {
            return Err(ConvertError { kind: mapping.kind.clone(), reason: "object is not a JSON map".into() });
        }
        let mut out = obj.clone();
        strip_managed_fields(&mut out);
        if let Some(items) = out.get_mut("items").and_then(|v| v.as_array_mut()) {
            items.iter_mut().for_each(strip_managed_fields);
        }
        Ok(out)
    }
}

fn fetch_error(err: kube::Error, what: &str) -> FetchError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => FetchError::NotFound(what.to_string()),
        kube::Error::Api(resp) => FetchError::Invalid(resp.message),
        other => FetchError::Transport(other.to_string()),
    }
}

/// Ask for a server-side table with the full object embedded in each row.
fn request_table(req: &mut http::Request<Vec<u8>>) -> Result<(), FetchError> {
    req.headers_mut().insert(ACCEPT, HeaderValue::from_static(TABLE_ACCEPT));
    let uri = req.uri().to_string();
    let sep = if uri.contains('?') { '&' } else { '?' };
    *req.uri_mut() = format!("{}{}includeObject=Object", uri, sep)
        .parse()
        .map_err(|e: http::uri::InvalidUri| FetchError::Invalid(e.to_string()))?;
    Ok(())
}

fn convert_event(ev: KubeWatchEvent<DynamicObject>) -> Result<WatchEvent, FetchError> {
    let encode = |o: &DynamicObject| serde_json::to_value(o).map_err(|e| FetchError::Invalid(e.to_string()));
    Ok(match ev {
        KubeWatchEvent::Added(o) => WatchEvent::new(EventType::Added, encode(&o)?),
        KubeWatchEvent::Modified(o) => WatchEvent::new(EventType::Modified, encode(&o)?),
        KubeWatchEvent::Deleted(o) => WatchEvent::new(EventType::Deleted, encode(&o)?),
        KubeWatchEvent::Bookmark(b) => WatchEvent::new(
            EventType::Bookmark,
            json!({"kind": "Bookmark", "metadata": {"resourceVersion": b.metadata.resource_version}}),
        ),
        KubeWatchEvent::Error(e) => WatchEvent::new(
            EventType::Error,
            json!({"kind": "Status", "status": e.status, "message": e.message, "reason": e.reason, "code": e.code}),
        ),
    })
}

/// kube-rs backed fetch and watch.
#[derive(Clone)]
pub struct KubeFetcher {
    client: Client,
    index: Arc<ResourceIndex>,
}

impl KubeFetcher {
    pub fn new(client: Client, index: Arc<ResourceIndex>) -> Self {
        Self { client, index }
    }

    /// Connect with the default kubeconfig and run discovery once.
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await.context("creating kube client")?;
        let index = discover(client.clone()).await?;
        info!(resources = index.len(), namespace = %client.default_namespace(), "kube client ready");
        Ok(Self::new(client, Arc::new(index)))
    }

    pub fn index(&self) -> Arc<ResourceIndex> {
        self.index.clone()
    }

    fn namespace_for(&self, resource: &DiscoveredResource, request: &FetchRequest) -> Option<String> {
        if !resource.namespaced || request.all_namespaces {
            return None;
        }
        Some(request.namespace.clone().unwrap_or_else(|| self.client.default_namespace().to_string()))
    }

    async fn get_one(&self, target: &DiscoveredResource, name: &str, request: &FetchRequest) -> Result<Info, FetchError> {
        let what = format!("{} {:?}", target.qualified_plural(), name);
        let ns = self.namespace_for(target, request);
        let url = DynamicObject::url_path(&target.api_resource(), ns.as_deref());
        let mut req = Request::new(url).get(name, &GetParams::default()).map_err(|e| FetchError::Invalid(e.to_string()))?;
        if request.server_print {
            request_table(&mut req)?;
        }
        counter!("kubehub_requests_total", 1u64);
        let obj: Value = self.client.request(req).await.map_err(|e| fetch_error(e, &what))?;
        Ok(Info::new(obj, target.mapping()))
    }

    /// Every page of a list becomes one item.
    async fn list_pages(&self, target: &DiscoveredResource, request: &FetchRequest, items: &mut Vec<Info>) -> Result<(), FetchError> {
        let what = target.qualified_plural();
        let ns = self.namespace_for(target, request);
        let url = DynamicObject::url_path(&target.api_resource(), ns.as_deref());
        let mut token: Option<String> = None;
        loop {
            let mut lp = ListParams::default();
            if let Some(l) = &request.label_selector {
                lp = lp.labels(l);
            }
            if let Some(f) = &request.field_selector {
                lp = lp.fields(f);
            }
            if request.chunk_size > 0 {
                lp = lp.limit(request.chunk_size);
            }
            if let Some(t) = &token {
                lp = lp.continue_token(t);
            }
            let mut req = Request::new(url.clone()).list(&lp).map_err(|e| FetchError::Invalid(e.to_string()))?;
            if request.server_print {
                request_table(&mut req)?;
            }
            counter!("kubehub_requests_total", 1u64);
            let page: Value = self.client.request(req).await.map_err(|e| fetch_error(e, &what))?;
            token = page.pointer("/metadata/continue").and_then(|v| v.as_str()).filter(|s| !s.is_empty()).map(str::to_string);
            debug!(resource = %what, kind = %object::kind(&page), more = token.is_some(), "list page");
            items.push(Info::new(page, target.mapping()));
            if token.is_none() {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl ResourceFetcher for KubeFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError> {
        let (targets, single_item_implied) = parse_targets(&request.args, &self.index)?;
        let mut result = FetchResult { single_item_implied, ..Default::default() };
        for t in &targets {
            let outcome = match &t.name {
                Some(name) => self.get_one(&t.resource, name, request).await.map(|info| result.items.push(info)),
                None => self.list_pages(&t.resource, request, &mut result.items).await,
            };
            if let Err(e) = outcome {
                debug!(gvk = %t.resource.gvk_key(), error = %e, "fetch failed");
                result.errors.push(e);
            }
        }
        Ok(result)
    }

    async fn watch(&self, request: &FetchRequest, mapping: &Mapping, resource_version: &str) -> Result<EventStream, FetchError> {
        let target = self
            .index
            .by_mapping(mapping)
            .cloned()
            .ok_or_else(|| FetchError::Invalid(format!("no served resource for {}", mapping.gvk_key())))?;
        let ar = target.api_resource();
        let api: Api<DynamicObject> = match self.namespace_for(&target, request) {
            Some(ns) => Api::namespaced_with(self.client.clone(), &ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };

        let (targets, _) = parse_targets(&request.args, &self.index)?;
        let names: Vec<&str> = targets.iter().filter(|t| t.resource == target).filter_map(|t| t.name.as_deref()).collect();
        let mut fields: Vec<String> = request.field_selector.iter().cloned().collect();
        match names.as_slice() {
            [] => {}
            [only] => fields.push(format!("metadata.name={}", only)),
            several => {
                return Err(FetchError::Invalid(format!(
                    "watch is only supported on individual resources and resource collections - {} resources were found",
                    several.len()
                )))
            }
        }
        let mut wp = WatchParams::default();
        if let Some(l) = &request.label_selector {
            wp = wp.labels(l);
        }
        if !fields.is_empty() {
            wp = wp.fields(&fields.join(","));
        }

        let events = api.watch(&wp, resource_version).await.map_err(|e| fetch_error(e, &target.qualified_plural()))?;
        info!(gvk = %target.gvk_key(), resource_version = %resource_version, "watch stream opened");
        Ok(events
            .map(|ev| match ev {
                Ok(ev) => convert_event(ev),
                Err(e) => {
                    warn!(error = %e, "watch stream error");
                    Err(FetchError::Transport(e.to_string()))
                }
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn res(group: &str, kind: &str, plural: &str, namespaced: bool) -> DiscoveredResource {
        DiscoveredResource { group: group.into(), version: "v1".into(), kind: kind.into(), plural: plural.into(), namespaced }
    }

    fn index() -> ResourceIndex {
        ResourceIndex::from_entries(vec![
            res("apps", "Deployment", "deployments", true),
            res("events.k8s.io", "Event", "events", true),
            res("", "Pod", "pods", true),
            res("", "Event", "events", true),
            res("", "Node", "nodes", false),
        ])
    }

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn lookup_accepts_every_spelling() {
        let idx = index();
        for name in ["pods", "pod", "Pod", "po"] {
            assert_eq!(idx.lookup(name).map(|r| r.kind.as_str()), Some("Pod"), "{name}");
        }
        assert_eq!(idx.lookup("deploy").map(|r| r.group.as_str()), Some("apps"));
        assert_eq!(idx.lookup("deployments.apps").map(|r| r.kind.as_str()), Some("Deployment"));
        assert_eq!(idx.lookup("events").map(|r| r.group.as_str()), Some(""));
        assert_eq!(idx.lookup("events.events.k8s.io").map(|r| r.group.as_str()), Some("events.k8s.io"));
        assert!(idx.lookup("widgets").is_none());
    }

    #[test]
    fn plural_names_are_group_qualified() {
        let idx = index();
        assert_eq!(idx.plural_name("Pod").as_deref(), Some("pods"));
        assert_eq!(idx.plural_name("Deployment").as_deref(), Some("deployments.apps"));
        assert_eq!(idx.plural_name("Widget"), None);
    }

    #[test]
    fn targets_from_both_argument_forms() {
        let idx = index();
        let (t, single) = parse_targets(&args(&["pods", "web"]), &idx).unwrap();
        assert_eq!(t.len(), 1);
        assert!(single);

        let (t, single) = parse_targets(&args(&["pods,deploy"]), &idx).unwrap();
        assert_eq!(t.iter().map(|t| t.resource.kind.as_str()).collect::<Vec<_>>(), vec!["Pod", "Deployment"]);
        assert!(t.iter().all(|t| t.name.is_none()));
        assert!(!single);

        let (t, single) = parse_targets(&args(&["po/a", "nodes/n1"]), &idx).unwrap();
        assert_eq!(t[1].name.as_deref(), Some("n1"));
        assert!(!single);

        assert!(parse_targets(&args(&["pods", "pods/a"]), &idx).is_err());
        let err = parse_targets(&args(&["widgets"]), &idx).unwrap_err();
        assert_eq!(err.to_string(), "the server doesn't have a resource type \"widgets\"");
    }

    #[test]
    fn display_conversion_strips_managed_fields() {
        let pod = json!({"kind": "Pod", "metadata": {"name": "a", "managedFields": [{}]}});
        let out = DisplayConverter.convert_for_display(&pod, &Mapping::default()).unwrap();
        assert!(out.pointer("/metadata/managedFields").is_none());
        let list = json!({"kind": "PodList", "items": [pod]});
        let out = DisplayConverter.convert_for_display(&list, &Mapping::default()).unwrap();
        assert!(out.pointer("/items/0/metadata/managedFields").is_none());
        assert!(DisplayConverter.convert_for_display(&Value::Null, &Mapping::default()).is_err());
    }

    #[test]
    fn api_404_is_not_found() {
        let resp = ErrorResponse { status: "Failure".into(), message: "pods \"a\" not found".into(), reason: "NotFound".into(), code: 404 };
        assert_eq!(fetch_error(kube::Error::Api(resp), "pods \"a\""), FetchError::NotFound("pods \"a\"".into()));
        let resp = ErrorResponse { status: "Failure".into(), message: "forbidden".into(), reason: "Forbidden".into(), code: 403 };
        assert_eq!(fetch_error(kube::Error::Api(resp), "pods"), FetchError::Invalid("forbidden".into()));
    }

    #[test]
    fn table_requests_set_accept_and_embed_objects() {
        let url = DynamicObject::url_path(&res("", "Pod", "pods", true).api_resource(), Some("default"));
        let mut req = Request::new(url).list(&ListParams::default().limit(5)).unwrap();
        request_table(&mut req).unwrap();
        assert_eq!(req.headers().get(ACCEPT).unwrap(), TABLE_ACCEPT);
        let uri = req.uri().to_string();
        assert!(uri.starts_with("/api/v1/namespaces/default/pods?"), "{uri}");
        assert!(uri.ends_with("&includeObject=Object"), "{uri}");
    }

    #[test]
    fn watch_errors_become_status_events() {
        let resp = ErrorResponse { status: "Failure".into(), message: "too old resource version".into(), reason: "Expired".into(), code: 410 };
        let ev = convert_event(KubeWatchEvent::Error(resp)).unwrap();
        assert_eq!(ev.event_type, EventType::Error);
        assert_eq!(ev.object["message"], "too old resource version");
    }
}
