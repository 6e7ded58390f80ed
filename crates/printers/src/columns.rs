//! Built-in table columns and projectors for core Kubernetes kinds.
//!
//! - Stable column IDs + specs (header label, wide-only flag)
//! - A registry mapping group/kind to column sets, AGE placed where kubectl puts it
//! - A JSON projector that fills the cells for those columns

use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Name,
    /// Age since `metadata.creationTimestamp`.
    Age,
    /// Age since the RFC 3339 timestamp at this JSON pointer.
    Since(&'static str),
    Projected(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub kind: ColumnKind,
    pub label: &'static str,
    /// Only shown with `-o wide`.
    pub wide: bool,
}

pub type Cells = SmallVec<[(u32, String); 8]>;

// ---------------- Column IDs (stable) ----------------
// Pods
pub const POD_READY: u32 = 10_001;
pub const POD_STATUS: u32 = 10_002;
pub const POD_RESTARTS: u32 = 10_003;
pub const POD_NODE: u32 = 10_004;
pub const POD_IP: u32 = 10_005;

// Deployments
pub const DEP_READY: u32 = 11_001;
pub const DEP_UPDATED: u32 = 11_002;
pub const DEP_AVAILABLE: u32 = 11_003;
pub const DEP_CONTAINERS: u32 = 11_004;
pub const DEP_IMAGES: u32 = 11_005;
pub const DEP_SELECTOR: u32 = 11_006;

// StatefulSets
pub const STS_READY: u32 = 12_001;

// Services
pub const SVC_TYPE: u32 = 13_001;
pub const SVC_CLUSTER_IP: u32 = 13_002;
pub const SVC_EXTERNAL_IP: u32 = 13_003;
pub const SVC_PORTS: u32 = 13_004;
pub const SVC_SELECTOR: u32 = 13_005;

// Ingress
pub const ING_CLASS: u32 = 14_001;
pub const ING_HOSTS: u32 = 14_002;
pub const ING_ADDRESS: u32 = 14_003;
pub const ING_PORTS: u32 = 14_004;

// DaemonSets
pub const DS_DESIRED: u32 = 15_001;
pub const DS_CURRENT: u32 = 15_002;
pub const DS_READY: u32 = 15_003;
pub const DS_UPDATED: u32 = 15_004;
pub const DS_AVAILABLE: u32 = 15_005;

// Jobs
pub const JOB_COMPLETIONS: u32 = 16_001;
pub const JOB_STATUS: u32 = 16_002;

// CronJobs
pub const CJ_SCHEDULE: u32 = 17_001;
pub const CJ_SUSPEND: u32 = 17_002;
pub const CJ_ACTIVE: u32 = 17_003;

// PVCs
pub const PVC_STATUS: u32 = 18_001;
pub const PVC_VOLUME: u32 = 18_002;
pub const PVC_CAPACITY: u32 = 18_003;
pub const PVC_ACCESS_MODES: u32 = 18_004;
pub const PVC_STORAGECLASS: u32 = 18_005;

// Nodes
pub const NODE_STATUS: u32 = 19_001;
pub const NODE_ROLES: u32 = 19_002;
pub const NODE_VERSION: u32 = 19_003;
pub const NODE_INTERNAL_IP: u32 = 19_004;
pub const NODE_OS_IMAGE: u32 = 19_005;

// Namespaces
pub const NS_STATUS: u32 = 20_001;

fn col(kind: ColumnKind, label: &'static str) -> ColumnSpec {
    ColumnSpec { kind, label, wide: false }
}

fn wide(id: u32, label: &'static str) -> ColumnSpec {
    ColumnSpec { kind: ColumnKind::Projected(id), label, wide: true }
}

fn p(id: u32, label: &'static str) -> ColumnSpec {
    col(ColumnKind::Projected(id), label)
}

/// Full column set for a kind, NAME first. Kinds without opinionated columns get NAME and AGE.
/// Wide-only columns are included and flagged; the caller filters them.
pub fn builtin_columns_for(group: &str, kind: &str) -> Vec<ColumnSpec> {
    let mut cols = vec![col(ColumnKind::Name, "NAME")];
    let age = || col(ColumnKind::Age, "AGE");

    match (group, kind) {
        ("", "Pod") => cols.extend([
            p(POD_READY, "READY"),
            p(POD_STATUS, "STATUS"),
            p(POD_RESTARTS, "RESTARTS"),
            age(),
            wide(POD_IP, "IP"),
            wide(POD_NODE, "NODE"),
        ]),
        ("apps", "Deployment") => cols.extend([
            p(DEP_READY, "READY"),
            p(DEP_UPDATED, "UP-TO-DATE"),
            p(DEP_AVAILABLE, "AVAILABLE"),
            age(),
            wide(DEP_CONTAINERS, "CONTAINERS"),
            wide(DEP_IMAGES, "IMAGES"),
            wide(DEP_SELECTOR, "SELECTOR"),
        ]),
        ("apps", "StatefulSet") => cols.extend([p(STS_READY, "READY"), age()]),
        ("apps", "DaemonSet") => cols.extend([
            p(DS_DESIRED, "DESIRED"),
            p(DS_CURRENT, "CURRENT"),
            p(DS_READY, "READY"),
            p(DS_UPDATED, "UP-TO-DATE"),
            p(DS_AVAILABLE, "AVAILABLE"),
            age(),
        ]),
        ("", "Service") => cols.extend([
            p(SVC_TYPE, "TYPE"),
            p(SVC_CLUSTER_IP, "CLUSTER-IP"),
            p(SVC_EXTERNAL_IP, "EXTERNAL-IP"),
            p(SVC_PORTS, "PORT(S)"),
            age(),
            wide(SVC_SELECTOR, "SELECTOR"),
        ]),
        ("networking.k8s.io", "Ingress") => cols.extend([
            p(ING_CLASS, "CLASS"),
            p(ING_HOSTS, "HOSTS"),
            p(ING_ADDRESS, "ADDRESS"),
            p(ING_PORTS, "PORTS"),
            age(),
        ]),
        ("batch", "Job") => cols.extend([p(JOB_STATUS, "STATUS"), p(JOB_COMPLETIONS, "COMPLETIONS"), age()]),
        ("batch", "CronJob") => cols.extend([
            p(CJ_SCHEDULE, "SCHEDULE"),
            p(CJ_SUSPEND, "SUSPEND"),
            p(CJ_ACTIVE, "ACTIVE"),
            col(ColumnKind::Since("/status/lastScheduleTime"), "LAST SCHEDULE"),
            age(),
        ]),
        ("", "PersistentVolumeClaim") => cols.extend([
            p(PVC_STATUS, "STATUS"),
            p(PVC_VOLUME, "VOLUME"),
            p(PVC_CAPACITY, "CAPACITY"),
            p(PVC_ACCESS_MODES, "ACCESS MODES"),
            p(PVC_STORAGECLASS, "STORAGECLASS"),
            age(),
        ]),
        // cluster-scoped: NAME STATUS AGE
        ("", "Namespace") => cols.extend([p(NS_STATUS, "STATUS"), age()]),
        // cluster-scoped: NAME STATUS ROLES AGE VERSION
        ("", "Node") => cols.extend([
            p(NODE_STATUS, "STATUS"),
            p(NODE_ROLES, "ROLES"),
            age(),
            p(NODE_VERSION, "VERSION"),
            wide(NODE_INTERNAL_IP, "INTERNAL-IP"),
            wide(NODE_OS_IMAGE, "OS-IMAGE"),
        ]),
        _ => cols.push(age()),
    }
    cols
}

/// Projector for a supported built-in kind.
pub fn builtin_projector_for(group: &str, kind: &str) -> Option<BuiltinProjector> {
    let known = matches!(
        (group, kind),
        ("", "Pod")
            | ("apps", "Deployment")
            | ("apps", "StatefulSet")
            | ("apps", "DaemonSet")
            | ("", "Service")
            | ("networking.k8s.io", "Ingress")
            | ("batch", "Job")
            | ("batch", "CronJob")
            | ("", "PersistentVolumeClaim")
            | ("", "Node")
            | ("", "Namespace")
    );
    known.then(|| BuiltinProjector { kind: kind.to_string() })
}

pub struct BuiltinProjector {
    kind: String,
}

fn s<'a>(raw: &'a serde_json::Value, ptr: &str) -> Option<&'a str> {
    raw.pointer(ptr).and_then(|v| v.as_str())
}

fn n(raw: &serde_json::Value, ptr: &str) -> u64 {
    raw.pointer(ptr).and_then(|v| v.as_u64()).unwrap_or(0)
}

fn selector(map: Option<&serde_json::Value>) -> Option<String> {
    let m = map?.as_object()?;
    if m.is_empty() {
        return None;
    }
    let pairs: Vec<String> = m.iter().map(|(k, v)| format!("{}={}", k, v.as_str().unwrap_or_default())).collect();
    Some(pairs.join(","))
}

fn lb_ingress(raw: &serde_json::Value) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(arr) = raw.pointer("/status/loadBalancer/ingress").and_then(|v| v.as_array()) {
        for it in arr {
            if let Some(ip) = it.get("ip").and_then(|v| v.as_str()) {
                out.push(ip.to_string());
            } else if let Some(h) = it.get("hostname").and_then(|v| v.as_str()) {
                out.push(h.to_string());
            }
        }
    }
    out
}

impl BuiltinProjector {
    pub fn project(&self, raw: &serde_json::Value) -> Cells {
        match self.kind.as_str() {
            "Pod" => self.project_pod(raw),
            "Deployment" => self.project_deployment(raw),
            "StatefulSet" => self.project_statefulset(raw),
            "DaemonSet" => self.project_daemonset(raw),
            "Service" => self.project_service(raw),
            "Ingress" => self.project_ingress(raw),
            "Job" => self.project_job(raw),
            "CronJob" => self.project_cronjob(raw),
            "PersistentVolumeClaim" => self.project_pvc(raw),
            "Node" => self.project_node(raw),
            "Namespace" => self.project_namespace(raw),
            _ => SmallVec::new(),
        }
    }

    fn project_pod(&self, raw: &serde_json::Value) -> Cells {
        let mut out = SmallVec::new();
        let mut ready = 0u32;
        let mut restarts = 0u64;
        let mut waiting: Option<&str> = None;
        let statuses = raw.pointer("/status/containerStatuses").and_then(|v| v.as_array());
        let total = raw
            .pointer("/spec/containers")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .or_else(|| statuses.map(|a| a.len()))
            .unwrap_or(0);
        for c in statuses.into_iter().flatten() {
            if c.get("ready").and_then(|v| v.as_bool()).unwrap_or(false) {
                ready += 1;
            }
            restarts += c.get("restartCount").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some(r) = c.pointer("/state/waiting/reason").and_then(|v| v.as_str()) {
                waiting = Some(r);
            } else if let Some(r) = c.pointer("/state/terminated/reason").and_then(|v| v.as_str()) {
                if waiting.is_none() {
                    waiting = Some(r);
                }
            }
        }
        out.push((POD_READY, format!("{}/{}", ready, total)));
        out.push((POD_RESTARTS, restarts.to_string()));
        // Status: Terminating > container waiting reason > pod reason > phase
        let status = if raw.pointer("/metadata/deletionTimestamp").is_some() {
            Some("Terminating")
        } else {
            waiting.or_else(|| s(raw, "/status/reason")).or_else(|| s(raw, "/status/phase"))
        };
        if let Some(st) = status.filter(|st| !st.is_empty()) {
            out.push((POD_STATUS, st.to_string()));
        }
        if let Some(ip) = s(raw, "/status/podIP") {
            out.push((POD_IP, ip.to_string()));
        }
        if let Some(node) = s(raw, "/spec/nodeName") {
            out.push((POD_NODE, node.to_string()));
        }
        out
    }

    fn project_deployment(&self, raw: &serde_json::Value) -> Cells {
        let mut out = SmallVec::new();
        let desired = raw.pointer("/spec/replicas").and_then(|v| v.as_u64()).unwrap_or_else(|| n(raw, "/status/replicas"));
        out.push((DEP_READY, format!("{}/{}", n(raw, "/status/readyReplicas"), desired)));
        out.push((DEP_UPDATED, n(raw, "/status/updatedReplicas").to_string()));
        out.push((DEP_AVAILABLE, n(raw, "/status/availableReplicas").to_string()));
        if let Some(cs) = raw.pointer("/spec/template/spec/containers").and_then(|v| v.as_array()) {
            let names: Vec<&str> = cs.iter().filter_map(|c| c.get("name").and_then(|v| v.as_str())).collect();
            let images: Vec<&str> = cs.iter().filter_map(|c| c.get("image").and_then(|v| v.as_str())).collect();
            out.push((DEP_CONTAINERS, names.join(",")));
            out.push((DEP_IMAGES, images.join(",")));
        }
        if let Some(sel) = selector(raw.pointer("/spec/selector/matchLabels")) {
            out.push((DEP_SELECTOR, sel));
        }
        out
    }

    fn project_statefulset(&self, raw: &serde_json::Value) -> Cells {
        let mut out = SmallVec::new();
        let desired = raw.pointer("/spec/replicas").and_then(|v| v.as_u64()).unwrap_or_else(|| n(raw, "/status/replicas"));
        out.push((STS_READY, format!("{}/{}", n(raw, "/status/readyReplicas"), desired)));
        out
    }

    fn project_service(&self, raw: &serde_json::Value) -> Cells {
        let mut out = SmallVec::new();
        let svc_type = s(raw, "/spec/type").unwrap_or("ClusterIP");
        out.push((SVC_TYPE, svc_type.to_string()));
        if let Some(ip) = s(raw, "/spec/clusterIP") {
            out.push((SVC_CLUSTER_IP, ip.to_string()));
        }
        // External IPs from spec.externalIPs, then status.loadBalancer.ingress
        let mut eps: Vec<String> = raw
            .pointer("/spec/externalIPs")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if eps.is_empty() {
            eps = lb_ingress(raw);
        }
        if eps.is_empty() && svc_type == "LoadBalancer" {
            eps.push("<pending>".into());
        }
        if !eps.is_empty() {
            out.push((SVC_EXTERNAL_IP, eps.join(",")));
        }
        if let Some(ports) = raw.pointer("/spec/ports").and_then(|v| v.as_array()) {
            let v: Vec<String> = ports
                .iter()
                .map(|p| {
                    let port = p.get("port").and_then(|v| v.as_u64()).unwrap_or(0);
                    let proto = p.get("protocol").and_then(|v| v.as_str()).unwrap_or("TCP");
                    match p.get("nodePort").and_then(|v| v.as_u64()) {
                        Some(np) => format!("{}:{}/{}", port, np, proto),
                        None => format!("{}/{}", port, proto),
                    }
                })
                .collect();
            if !v.is_empty() {
                out.push((SVC_PORTS, v.join(",")));
            }
        }
        if let Some(sel) = selector(raw.pointer("/spec/selector")) {
            out.push((SVC_SELECTOR, sel));
        }
        out
    }

    fn project_ingress(&self, raw: &serde_json::Value) -> Cells {
        let mut out = SmallVec::new();
        if let Some(c) = s(raw, "/spec/ingressClassName") {
            out.push((ING_CLASS, c.to_string()));
        }
        if let Some(rules) = raw.pointer("/spec/rules").and_then(|v| v.as_array()) {
            let hosts: Vec<&str> = rules.iter().filter_map(|r| r.get("host").and_then(|v| v.as_str())).collect();
            out.push((ING_HOSTS, if hosts.is_empty() { "*".to_string() } else { hosts.join(",") }));
        }
        let addrs = lb_ingress(raw);
        if !addrs.is_empty() {
            out.push((ING_ADDRESS, addrs.join(",")));
        }
        let tls = raw.pointer("/spec/tls").and_then(|v| v.as_array()).map(|t| !t.is_empty()).unwrap_or(false);
        out.push((ING_PORTS, if tls { "80, 443".to_string() } else { "80".to_string() }));
        out
    }

    fn project_daemonset(&self, raw: &serde_json::Value) -> Cells {
        let mut out = SmallVec::new();
        out.push((DS_DESIRED, n(raw, "/status/desiredNumberScheduled").to_string()));
        out.push((DS_CURRENT, n(raw, "/status/currentNumberScheduled").to_string()));
        out.push((DS_READY, n(raw, "/status/numberReady").to_string()));
        out.push((DS_UPDATED, n(raw, "/status/updatedNumberScheduled").to_string()));
        out.push((DS_AVAILABLE, n(raw, "/status/numberAvailable").to_string()));
        out
    }

    fn project_job(&self, raw: &serde_json::Value) -> Cells {
        let mut out = SmallVec::new();
        let desired = raw.pointer("/spec/completions").and_then(|v| v.as_u64()).unwrap_or(1);
        out.push((JOB_COMPLETIONS, format!("{}/{}", n(raw, "/status/succeeded"), desired)));
        let mut status = String::new();
        if let Some(conds) = raw.pointer("/status/conditions").and_then(|v| v.as_array()) {
            for c in conds {
                let t = c.get("type").and_then(|v| v.as_str()).unwrap_or("");
                let st = c.get("status").and_then(|v| v.as_str()).unwrap_or("");
                if t == "Complete" && st == "True" {
                    status = "Complete".into();
                    break;
                }
                if t == "Failed" && st == "True" {
                    status = "Failed".into();
                }
            }
        }
        if status.is_empty() {
            status = "Running".into();
        }
        out.push((JOB_STATUS, status));
        out
    }

    fn project_cronjob(&self, raw: &serde_json::Value) -> Cells {
        let mut out = SmallVec::new();
        if let Some(sch) = s(raw, "/spec/schedule") {
            out.push((CJ_SCHEDULE, sch.to_string()));
        }
        let suspend = raw.pointer("/spec/suspend").and_then(|v| v.as_bool()).unwrap_or(false);
        out.push((CJ_SUSPEND, if suspend { "True".into() } else { "False".into() }));
        let active = raw.pointer("/status/active").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0);
        out.push((CJ_ACTIVE, active.to_string()));
        out
    }

    fn project_pvc(&self, raw: &serde_json::Value) -> Cells {
        let mut out = SmallVec::new();
        if let Some(st) = s(raw, "/status/phase") {
            out.push((PVC_STATUS, st.to_string()));
        }
        if let Some(v) = s(raw, "/spec/volumeName") {
            out.push((PVC_VOLUME, v.to_string()));
        }
        if let Some(cap) = s(raw, "/status/capacity/storage") {
            out.push((PVC_CAPACITY, cap.to_string()));
        }
        if let Some(modes) = raw.pointer("/status/accessModes").or_else(|| raw.pointer("/spec/accessModes")).and_then(|v| v.as_array()) {
            let vals: Vec<&str> = modes
                .iter()
                .filter_map(|m| m.as_str())
                .map(|m| match m {
                    "ReadWriteOnce" => "RWO",
                    "ReadOnlyMany" => "ROX",
                    "ReadWriteMany" => "RWX",
                    "ReadWriteOncePod" => "RWOP",
                    other => other,
                })
                .collect();
            if !vals.is_empty() {
                out.push((PVC_ACCESS_MODES, vals.join(",")));
            }
        }
        if let Some(sc) = s(raw, "/spec/storageClassName") {
            out.push((PVC_STORAGECLASS, sc.to_string()));
        }
        out
    }

    fn project_node(&self, raw: &serde_json::Value) -> Cells {
        let mut out = SmallVec::new();
        let mut status = "Unknown".to_string();
        if let Some(conds) = raw.pointer("/status/conditions").and_then(|v| v.as_array()) {
            for c in conds {
                if c.get("type").and_then(|v| v.as_str()) == Some("Ready") {
                    status = if c.get("status").and_then(|v| v.as_str()) == Some("True") { "Ready".into() } else { "NotReady".into() };
                    break;
                }
            }
        }
        if raw.pointer("/spec/unschedulable").and_then(|v| v.as_bool()).unwrap_or(false) {
            status.push_str(",SchedulingDisabled");
        }
        out.push((NODE_STATUS, status));
        // Roles from node-role.kubernetes.io/<role> labels
        let mut roles: Vec<String> = Vec::new();
        if let Some(lbls) = raw.pointer("/metadata/labels").and_then(|v| v.as_object()) {
            for k in lbls.keys() {
                if let Some(role) = k.strip_prefix("node-role.kubernetes.io/") {
                    if !role.is_empty() {
                        roles.push(role.to_string());
                    }
                }
            }
            if roles.is_empty() {
                if let Some(r) = lbls.get("kubernetes.io/role").and_then(|v| v.as_str()) {
                    roles.push(r.to_string());
                }
            }
        }
        if roles.is_empty() {
            roles.push("<none>".into());
        }
        out.push((NODE_ROLES, roles.join(",")));
        if let Some(v) = s(raw, "/status/nodeInfo/kubeletVersion") {
            out.push((NODE_VERSION, v.to_string()));
        }
        if let Some(addrs) = raw.pointer("/status/addresses").and_then(|v| v.as_array()) {
            let internal = addrs.iter().find(|a| a.get("type").and_then(|v| v.as_str()) == Some("InternalIP"));
            if let Some(ip) = internal.and_then(|a| a.get("address")).and_then(|v| v.as_str()) {
                out.push((NODE_INTERNAL_IP, ip.to_string()));
            }
        }
        if let Some(os) = s(raw, "/status/nodeInfo/osImage") {
            out.push((NODE_OS_IMAGE, os.to_string()));
        }
        out
    }

    fn project_namespace(&self, raw: &serde_json::Value) -> Cells {
        let mut out = SmallVec::new();
        if let Some(st) = s(raw, "/status/phase") {
            out.push((NS_STATUS, st.to_string()));
        }
        out
    }
}
