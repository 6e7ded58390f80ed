//! Orka core types: the object model shared by printers, `get` and the kube
//! collaborators, plus the contracts those collaborators implement.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod object;

/// Resolved type information for a fetched object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mapping {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name, e.g. `pods`.
    pub resource: String,
    pub namespaced: bool,
}

impl Mapping {
    pub fn new(group: &str, version: &str, kind: &str, resource: &str, namespaced: bool) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            resource: resource.to_string(),
            namespaced,
        }
    }

    /// `v1/Kind` for the core group, `group/v1/Kind` otherwise.
    pub fn gvk_key(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.kind)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.kind)
        }
    }

    /// Two mappings with the same group and kind describe the same resource type,
    /// whatever version they were served at.
    pub fn same_kind(&self, other: &Mapping) -> bool {
        self.group == other.group && self.kind == other.kind
    }
}

/// One fetched object together with its type metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    pub object: Value,
    pub mapping: Mapping,
}

impl Info {
    pub fn new(object: Value, mapping: Mapping) -> Self {
        Self { object, mapping }
    }
}

/// What the user asked to fetch. Interpreted by the [`ResourceFetcher`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// `TYPE [NAME...]` or `TYPE/NAME ...`
    pub args: Vec<String>,
    pub namespace: Option<String>,
    pub all_namespaces: bool,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    /// List page size; 0 disables chunking.
    pub chunk_size: u32,
    /// Ask the server for pre-rendered tables.
    pub server_print: bool,
}

/// Ordered fetched items plus every error met while fetching them.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub items: Vec<Info>,
    pub errors: Vec<FetchError>,
    /// True when the request named exactly one object.
    pub single_item_implied: bool,
}

impl FetchResult {
    pub fn from_items(items: Vec<Info>) -> Self {
        Self { items, errors: Vec::new(), single_item_implied: false }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub event_type: EventType,
    pub object: Value,
}

impl WatchEvent {
    pub fn new(event_type: EventType, object: Value) -> Self {
        Self { event_type, object }
    }
}

pub type EventStream = BoxStream<'static, Result<WatchEvent, FetchError>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Transport(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unable to convert {kind}: {reason}")]
pub struct ConvertError {
    pub kind: String,
    pub reason: String,
}

/// Fetch and watch collaborator.
#[async_trait::async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the current state of everything `request` selects. Per-target failures
    /// are reported in [`FetchResult::errors`]; only request-level failures are `Err`.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError>;

    /// Open a change-event subscription for the resource type `mapping`, starting
    /// after `resource_version` (`"0"` means from now).
    async fn watch(&self, request: &FetchRequest, mapping: &Mapping, resource_version: &str) -> Result<EventStream, FetchError>;
}

/// Maps a kind (e.g. `Pod`) to the plural resource name users type (`pods`).
pub trait TypeResolver: Send + Sync {
    fn plural_name(&self, kind: &str) -> Option<String>;
}

/// Converts an object into the shape human printers expect.
pub trait ObjectConverter: Send + Sync {
    fn convert_for_display(&self, obj: &Value, mapping: &Mapping) -> Result<Value, ConvertError>;
}

/// Converter that hands objects back untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl ObjectConverter for IdentityConverter {
    fn convert_for_display(&self, obj: &Value, _mapping: &Mapping) -> Result<Value, ConvertError> {
        Ok(obj.clone())
    }
}

/// Fixed kind → plural table.
#[derive(Debug, Clone, Default)]
pub struct StaticTypeResolver {
    plurals: HashMap<String, String>,
}

impl StaticTypeResolver {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { plurals: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    pub fn len(&self) -> usize {
        self.plurals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plurals.is_empty()
    }
}

impl TypeResolver for StaticTypeResolver {
    fn plural_name(&self, kind: &str) -> Option<String> {
        self.plurals.get(kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gvk_key_omits_core_group() {
        assert_eq!(Mapping::new("", "v1", "Pod", "pods", true).gvk_key(), "v1/Pod");
        assert_eq!(Mapping::new("apps", "v1", "Deployment", "deployments", true).gvk_key(), "apps/v1/Deployment");
    }

    #[test]
    fn same_kind_ignores_version() {
        let a = Mapping::new("batch", "v1", "CronJob", "cronjobs", true);
        let b = Mapping::new("batch", "v1beta1", "CronJob", "cronjobs", true);
        let c = Mapping::new("batch", "v1", "Job", "jobs", true);
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&c));
    }

    #[test]
    fn static_resolver_looks_up_plurals() {
        let r = StaticTypeResolver::from_pairs([("Pod", "pods"), ("Service", "services")]);
        assert_eq!(r.plural_name("Pod").as_deref(), Some("pods"));
        assert_eq!(r.plural_name("Node"), None);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn not_found_is_distinguished() {
        assert!(FetchError::NotFound("pods \"x\"".into()).is_not_found());
        assert!(!FetchError::Transport("eof".into()).is_not_found());
        assert_eq!(FetchError::NotFound("pods \"x\"".into()).to_string(), "pods \"x\" not found");
    }
}
