#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orka_core::{
    EventStream, FetchError, FetchRequest, FetchResult, IdentityConverter, Info, Mapping, ResourceFetcher,
    StaticTypeResolver,
};
use orka_get::{GetCommand, GetError, GetOptions};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

struct FakeFetcher {
    result: Result<FetchResult, FetchError>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeFetcher {
    fn ok(result: FetchResult) -> Self {
        Self { result: Ok(result), requests: Mutex::new(Vec::new()) }
    }

    fn failing(err: FetchError) -> Self {
        Self { result: Err(err), requests: Mutex::new(Vec::new()) }
    }

    fn last_request(&self) -> Option<FetchRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ResourceFetcher for FakeFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        self.result.clone()
    }

    async fn watch(&self, _request: &FetchRequest, _mapping: &Mapping, _rv: &str) -> Result<EventStream, FetchError> {
        Err(FetchError::Invalid("not watchable".into()))
    }
}

fn pod(name: &str, ts: &str) -> Info {
    Info::new(
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": "default", "creationTimestamp": ts},
            "spec": {"containers": [{"name": "app"}]},
            "status": {"phase": "Running"}
        }),
        Mapping::new("", "v1", "Pod", "pods", true),
    )
}

fn service(name: &str) -> Info {
    Info::new(
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": name, "namespace": "default"},
            "spec": {"type": "ClusterIP", "clusterIP": "10.0.0.1", "ports": [{"port": 80, "protocol": "TCP"}]}
        }),
        Mapping::new("", "v1", "Service", "services", true),
    )
}

fn opts(args: &[&str], output: &str) -> GetOptions {
    GetOptions { args: args.iter().map(|s| s.to_string()).collect(), output: output.to_string(), ..Default::default() }
}

async fn get(fetcher: &FakeFetcher, o: &GetOptions) -> (Result<(), GetError>, String, String) {
    let resolver = Arc::new(StaticTypeResolver::from_pairs([("Pod", "pods"), ("Service", "services")]));
    let cmd = GetCommand::new(fetcher, &IdentityConverter).with_type_resolver(resolver);
    let mut out = Vec::new();
    let mut err = Vec::new();
    let res = cmd.run(o, &mut out, &mut err, &CancellationToken::new()).await;
    (res, String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
}

#[tokio::test]
async fn empty_result_says_no_resources_found() {
    let fetcher = FakeFetcher::ok(FetchResult::default());
    let (res, out, err) = get(&fetcher, &opts(&["pods"], "")).await;
    res.unwrap();
    assert_eq!(out, "");
    assert_eq!(err, "No resources found.\n");
}

#[tokio::test]
async fn ignored_not_found_is_silent_success() {
    let fetcher = FakeFetcher::failing(FetchError::NotFound("pods \"web\"".into()));
    let o = GetOptions { ignore_not_found: true, ..opts(&["pods", "web"], "") };
    let (res, out, err) = get(&fetcher, &o).await;
    res.unwrap();
    assert_eq!((out.as_str(), err.as_str()), ("", ""));

    let (res, _, _) = get(&fetcher, &opts(&["pods", "web"], "")).await;
    assert!(res.unwrap_err().is_not_found());
}

#[tokio::test]
async fn per_item_fetch_errors_are_fatal_for_tables() {
    let result = FetchResult { items: vec![pod("a", "2020-01-01T00:00:00Z")], errors: vec![FetchError::Transport("eof".into())], single_item_implied: false };
    let (res, out, _) = get(&FakeFetcher::ok(result), &opts(&["pods"], "")).await;
    assert_eq!(res.unwrap_err().to_string(), "eof");
    assert_eq!(out, "");
}

#[tokio::test]
async fn tables_are_requested_only_for_unsorted_human_output() {
    let fetcher = FakeFetcher::ok(FetchResult::default());
    get(&fetcher, &opts(&["pods"], "")).await.0.unwrap();
    assert!(fetcher.last_request().unwrap().server_print);

    get(&fetcher, &opts(&["pods"], "json")).await.0.unwrap();
    assert!(!fetcher.last_request().unwrap().server_print);

    let sorted = GetOptions { sort_by: Some(".metadata.name".into()), ..opts(&["pods"], "wide") };
    get(&fetcher, &sorted).await.0.unwrap();
    assert!(!fetcher.last_request().unwrap().server_print);
}

#[tokio::test]
async fn mixed_kinds_get_kind_prefixes_and_fresh_headers() {
    let list = Info::new(
        json!({"kind": "PodList", "items": [pod("a", "2020-01-01T00:00:00Z").object]}),
        Mapping::new("", "v1", "Pod", "pods", true),
    );
    let fetcher = FakeFetcher::ok(FetchResult::from_items(vec![list, service("svc")]));
    let o = GetOptions { server_print: false, ..opts(&["pods,services"], "") };
    let (res, out, _) = get(&fetcher, &o).await;
    res.unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines[0].starts_with("NAME"));
    assert!(lines[1].starts_with("pod/a "));
    assert_eq!(lines[2], "");
    assert!(lines[3].starts_with("NAME"));
    assert!(lines[4].starts_with("service/svc "));
}

#[tokio::test]
async fn sort_by_reorders_table_rows() {
    let items = vec![pod("b", "2020-01-02T00:00:00Z"), pod("a", "2020-01-03T00:00:00Z"), pod("c", "2020-01-01T00:00:00Z")];
    let fetcher = FakeFetcher::ok(FetchResult::from_items(items));
    let o = GetOptions { sort_by: Some("{.metadata.creationTimestamp}".into()), ..opts(&["pods"], "custom-columns=NAME:.metadata.name") };
    let (res, out, _) = get(&fetcher, &o).await;
    res.unwrap();
    assert_eq!(out, "NAME\nc\nb\na\n");

    let bad = GetOptions { sort_by: Some(".spec.nothing".into()), ..o };
    let (res, _, _) = get(&fetcher, &bad).await;
    assert!(matches!(res, Err(GetError::Sort(_))));
}

#[tokio::test]
async fn generic_output_wraps_lists_and_keeps_named_items_bare() {
    let fetcher = FakeFetcher::ok(FetchResult::from_items(vec![pod("a", "t"), service("s")]));
    let (res, out, _) = get(&fetcher, &opts(&["pods,services"], "name")).await;
    res.unwrap();
    assert_eq!(out, "pods/a\nservices/s\n");

    let (res, out, _) = get(&fetcher, &opts(&["pods,services"], "json")).await;
    res.unwrap();
    let v: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(v["kind"], "List");
    assert_eq!(v["items"].as_array().unwrap().len(), 2);

    let single = FetchResult { items: vec![pod("web", "t")], errors: vec![], single_item_implied: true };
    let (res, out, _) = get(&FakeFetcher::ok(single), &opts(&["pods", "web"], "jsonpath={.kind}/{.metadata.name}")).await;
    res.unwrap();
    assert_eq!(out, "Pod/web");
}

#[tokio::test]
async fn spec_errors_fail_before_fetching() {
    let fetcher = FakeFetcher::ok(FetchResult::default());
    let (res, _, _) = get(&fetcher, &opts(&["pods"], "xml")).await;
    assert_eq!(res.unwrap_err().to_string(), "output format \"xml\" not recognized");

    let (res, _, _) = get(&fetcher, &opts(&["pods"], "go-template=")).await;
    assert_eq!(res.unwrap_err().to_string(), "template format specified but no template given");
    assert!(fetcher.last_request().is_none());
}

#[tokio::test]
async fn watch_errors_surface_from_the_command() {
    let fetcher = FakeFetcher::ok(FetchResult::from_items(vec![pod("a", "2020-01-01T00:00:00Z")]));
    let o = GetOptions { watch: true, ..opts(&["pods", "a"], "name") };
    let (res, out, _) = get(&fetcher, &o).await;
    assert_eq!(res.unwrap_err().to_string(), "not watchable");
    assert_eq!(out, "pods/a\n");
    assert!(!fetcher.last_request().unwrap().server_print);
}
