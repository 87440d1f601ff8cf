// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-memory collaborators for tests: a fake cluster, container engine,
//! chart installer and registry, a scripted readiness probe, and a mock HTTP
//! service for driving a real kube client.

use crate::engine::{ChartInstaller, ContainerEngine, Credentials};
use crate::error::{AirliftError, Result};
use crate::kubernetes::{parse_manifest, ClusterApi};
use crate::reconcile::poller::{ProbeResult, Readiness, ReadinessProbe};
use crate::reconcile::sequencer::InstallAction;
use crate::registry::RegistryApi;
use crate::types::{ImageReference, ResourceKind, ResourceRef};
use async_trait::async_trait;
use http::{Method, Request, Response};
use kube::client::Body;
use kube::Client;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

fn not_found(resource: &ResourceRef) -> AirliftError {
    AirliftError::KubeError(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} not found", resource),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

/// RFC 7386 JSON merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Value::Object(existing) = target {
        for (key, value) in fields {
            if value.is_null() {
                existing.remove(key);
            } else {
                merge_patch(existing.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn resource_ref_of(kind: ResourceKind, object: &Value) -> ResourceRef {
    let name = object["metadata"]["name"].as_str().unwrap_or_default();
    match object["metadata"]["namespace"].as_str() {
        Some(ns) if kind.is_namespaced() => ResourceRef::namespaced(kind, ns, name),
        _ => ResourceRef::cluster_scoped(kind, name),
    }
}

#[derive(Default)]
struct ClusterState {
    objects: BTreeMap<ResourceRef, Value>,
    calls: Vec<String>,
    gets: HashMap<ResourceRef, usize>,
    /// Objects that show up on the nth lookup
    pending: Vec<(ResourceRef, usize, Value)>,
    manifests: Vec<String>,
}

/// A cluster kept in memory. Every operation is recorded as
/// `"<op> <resource>"`, e.g. `"create Secret ns/regcred"`.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
    denied: BTreeSet<ResourceKind>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every operation on `kind` as forbidden
    pub fn deny(mut self, kind: ResourceKind) -> Self {
        self.denied.insert(kind);
        self
    }

    pub fn insert(&self, object: Value) {
        let kind = object["kind"]
            .as_str()
            .and_then(ResourceKind::from_kind)
            .expect("object has a known kind");
        let key = resource_ref_of(kind, &object);
        self.state.lock().unwrap().objects.insert(key, object);
    }

    /// Make `object` exist from its `nth` lookup on (1-based)
    pub fn appear_on_get(&self, object: Value, nth: usize) {
        let kind = object["kind"]
            .as_str()
            .and_then(ResourceKind::from_kind)
            .expect("object has a known kind");
        let key = resource_ref_of(kind, &object);
        self.state.lock().unwrap().pending.push((key, nth, object));
    }

    pub fn object(&self, resource: &ResourceRef) -> Option<Value> {
        self.state.lock().unwrap().objects.get(resource).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<ResourceRef, Value> {
        self.state.lock().unwrap().objects.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn get_count(&self, resource: &ResourceRef) -> usize {
        self.state
            .lock()
            .unwrap()
            .gets
            .get(resource)
            .copied()
            .unwrap_or_default()
    }

    /// Manifests passed to `apply_manifest`, in order
    pub fn manifests(&self) -> Vec<String> {
        self.state.lock().unwrap().manifests.clone()
    }

    pub fn record(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }

    fn check_allowed(&self, kind: ResourceKind) -> Result<()> {
        if self.denied.contains(&kind) {
            return Err(AirliftError::Unrecoverable(format!(
                "{} is forbidden for this account",
                kind
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_resource(&self, resource: &ResourceRef) -> Result<Option<Value>> {
        self.record(format!("get {}", resource));
        self.check_allowed(resource.kind)?;

        let mut state = self.state.lock().unwrap();
        let count = {
            let entry = state.gets.entry(resource.clone()).or_default();
            *entry += 1;
            *entry
        };
        if let Some(pos) = state
            .pending
            .iter()
            .position(|(key, nth, _)| key == resource && *nth <= count)
        {
            let (key, _, object) = state.pending.remove(pos);
            state.objects.insert(key, object);
        }
        Ok(state.objects.get(resource).cloned())
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>> {
        self.record(format!("list {}", kind));
        self.check_allowed(kind)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .filter(|(key, _)| namespace.is_none() || key.namespace.as_deref() == namespace)
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create_resource(&self, kind: ResourceKind, spec: &Value) -> Result<bool> {
        let key = resource_ref_of(kind, spec);
        self.record(format!("create {}", key));
        self.check_allowed(kind)?;
        let mut state = self.state.lock().unwrap();
        if state.objects.contains_key(&key) {
            return Ok(false);
        }
        state.objects.insert(key, spec.clone());
        Ok(true)
    }

    async fn patch_resource(&self, resource: &ResourceRef, patch: &Value) -> Result<()> {
        self.record(format!("patch {}", resource));
        self.check_allowed(resource.kind)?;
        let mut state = self.state.lock().unwrap();
        let object = state
            .objects
            .get_mut(resource)
            .ok_or_else(|| not_found(resource))?;
        merge_patch(object, patch);
        Ok(())
    }

    async fn delete_resource(&self, resource: &ResourceRef) -> Result<bool> {
        self.record(format!("delete {}", resource));
        self.check_allowed(resource.kind)?;
        Ok(self.state.lock().unwrap().objects.remove(resource).is_some())
    }

    async fn apply_manifest(&self, yaml: &str) -> Result<usize> {
        let objects = parse_manifest(yaml)?;
        let mut state = self.state.lock().unwrap();
        state.manifests.push(yaml.to_string());
        for obj in &objects {
            let value = serde_json::to_value(obj)?;
            let kind = obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
            match ResourceKind::from_kind(&kind) {
                Some(known) => {
                    let key = resource_ref_of(known, &value);
                    state.calls.push(format!("apply {}", key));
                    let slot = state.objects.entry(key).or_insert(Value::Null);
                    merge_patch(slot, &value);
                }
                None => state.calls.push(format!("apply {} {}", kind, value["metadata"]["name"])),
            }
        }
        Ok(objects.len())
    }

    async fn restart_workloads(&self, namespace: &str) -> Result<usize> {
        self.record(format!("restart {}", namespace));
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .keys()
            .filter(|k| k.kind == ResourceKind::Deployment && k.namespace.as_deref() == Some(namespace))
            .count())
    }
}

/// Install step that records `"install <name>"` into a fake cluster's call log
#[derive(Clone)]
pub struct RecordingAction {
    cluster: Arc<FakeCluster>,
    name: String,
    installs: Arc<AtomicUsize>,
    fail: bool,
}

impl RecordingAction {
    pub fn new(cluster: Arc<FakeCluster>) -> Self {
        Self {
            cluster,
            name: "action".to_string(),
            installs: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    /// A copy sharing the install counter, recorded under `name`
    pub fn named(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstallAction for RecordingAction {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn install(&self) -> Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        self.cluster.record(format!("install {}", self.name));
        if self.fail {
            return Err(AirliftError::CommandFailed {
                program: "helm".to_string(),
                args: "upgrade --install".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "chart not found".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct EngineState {
    ops: Vec<String>,
    /// References known to the remote registries
    registry: BTreeSet<String>,
    local: BTreeSet<String>,
}

/// Container engine whose "registry" is a set of reference strings
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
    failing_pushes: BTreeSet<String>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `reference` is already in its registry
    pub fn with_image(self, reference: &str) -> Self {
        self.state.lock().unwrap().registry.insert(reference.to_string());
        self
    }

    pub fn failing_push(mut self, reference: &str) -> Self {
        self.failing_pushes.insert(reference.to_string());
        self
    }

    /// Number of times an operation (`pull`, `save`, `load`, `tag`, `push`, `login`) ran
    pub fn count(&self, op: &str) -> usize {
        self.state.lock().unwrap().ops.iter().filter(|o| *o == op).count()
    }

    pub fn has_image(&self, reference: &str) -> bool {
        self.state.lock().unwrap().registry.contains(reference)
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn pull(&self, image: &ImageReference) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("pull".to_string());
        state.local.insert(image.to_string());
        Ok(())
    }

    async fn save(&self, images: &[ImageReference], archive: &Path) -> Result<()> {
        self.state.lock().unwrap().ops.push("save".to_string());
        let listing: Vec<String> = images.iter().map(ToString::to_string).collect();
        std::fs::write(archive, listing.join("\n"))?;
        Ok(())
    }

    async fn load(&self, _archive: &Path) -> Result<()> {
        self.state.lock().unwrap().ops.push("load".to_string());
        Ok(())
    }

    async fn tag(&self, _source: &ImageReference, destination: &ImageReference) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("tag".to_string());
        state.local.insert(destination.to_string());
        Ok(())
    }

    async fn push(&self, image: &ImageReference) -> Result<()> {
        let reference = image.to_string();
        let mut state = self.state.lock().unwrap();
        state.ops.push("push".to_string());
        if self.failing_pushes.contains(&reference) {
            return Err(AirliftError::CommandFailed {
                program: "docker".to_string(),
                args: format!("push {}", reference),
                status: "exit status: 1".to_string(),
                stderr: "denied: requested access to the resource is denied".to_string(),
            });
        }
        state.registry.insert(reference);
        Ok(())
    }

    async fn image_exists(&self, image: &ImageReference) -> Result<bool> {
        Ok(self.state.lock().unwrap().registry.contains(&image.to_string()))
    }

    async fn login(&self, _registry: &str, _credentials: &Credentials) -> Result<()> {
        self.state.lock().unwrap().ops.push("login".to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartInstall {
    pub release: String,
    pub namespace: String,
    pub values: BTreeMap<String, String>,
}

/// Chart installer that remembers releases per namespace
#[derive(Default)]
pub struct FakeInstaller {
    installs: Mutex<Vec<ChartInstall>>,
    releases: Mutex<BTreeSet<(String, String)>>,
    uninstalls: Mutex<Vec<String>>,
}

impl FakeInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(self, release: &str, namespace: &str) -> Self {
        self.releases
            .lock()
            .unwrap()
            .insert((release.to_string(), namespace.to_string()));
        self
    }

    pub fn installs(&self) -> Vec<ChartInstall> {
        self.installs.lock().unwrap().clone()
    }

    pub fn uninstalls(&self) -> Vec<String> {
        self.uninstalls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChartInstaller for FakeInstaller {
    async fn install_or_upgrade(
        &self,
        release: &str,
        chart: &Path,
        namespace: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<()> {
        if !chart.exists() {
            return Err(AirliftError::ConfigError(format!(
                "chart {} does not exist",
                chart.display()
            )));
        }
        self.installs.lock().unwrap().push(ChartInstall {
            release: release.to_string(),
            namespace: namespace.to_string(),
            values: values.clone(),
        });
        self.releases
            .lock()
            .unwrap()
            .insert((release.to_string(), namespace.to_string()));
        Ok(())
    }

    async fn uninstall(&self, release: &str, namespace: &str) -> Result<bool> {
        self.uninstalls.lock().unwrap().push(release.to_string());
        Ok(self
            .releases
            .lock()
            .unwrap()
            .remove(&(release.to_string(), namespace.to_string())))
    }
}

/// Registry holding `(repository, tag, digest)` triples in insertion order
#[derive(Default)]
pub struct FakeRegistry {
    tags: Mutex<Vec<(String, String, String)>>,
    failing: BTreeSet<String>,
    deleted: Mutex<Vec<(String, String)>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(self, repository: &str, tag: &str, digest: &str) -> Self {
        self.tags.lock().unwrap().push((
            repository.to_string(),
            tag.to_string(),
            digest.to_string(),
        ));
        self
    }

    pub fn failing_deletes_for(mut self, repository: &str) -> Self {
        self.failing.insert(repository.to_string());
        self
    }

    /// Successful deletions as `(repository, digest)`
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        Ok(self
            .tags
            .lock()
            .unwrap()
            .iter()
            .filter(|(repo, _, _)| repo == repository)
            .map(|(_, tag, _)| tag.clone())
            .collect())
    }

    async fn get_digest(&self, repository: &str, tag: &str) -> Result<Option<String>> {
        Ok(self
            .tags
            .lock()
            .unwrap()
            .iter()
            .find(|(repo, t, _)| repo == repository && t == tag)
            .map(|(_, _, digest)| digest.clone()))
    }

    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<bool> {
        if self.failing.contains(repository) {
            return Err(AirliftError::Unrecoverable(format!(
                "deleting {}@{} is not allowed",
                repository, digest
            )));
        }
        let mut tags = self.tags.lock().unwrap();
        let before = tags.len();
        tags.retain(|(repo, _, d)| !(repo == repository && d == digest));
        if tags.len() == before {
            return Ok(false);
        }
        self.deleted
            .lock()
            .unwrap()
            .push((repository.to_string(), digest.to_string()));
        Ok(true)
    }
}

#[derive(Default)]
struct ProbeScript {
    steps: Vec<Readiness>,
    calls: usize,
    failures_left: usize,
    answered: usize,
}

/// Probe that plays back a list of readiness states, repeating the last one.
/// Clones share their script.
#[derive(Clone)]
pub struct ScriptedProbe {
    script: Arc<Mutex<ProbeScript>>,
}

impl ScriptedProbe {
    pub fn new(steps: Vec<Readiness>) -> Self {
        Self {
            script: Arc::new(Mutex::new(ProbeScript {
                steps,
                ..Default::default()
            })),
        }
    }

    /// Fail the first `n` probes with a transient error
    pub fn failing_first(self, n: usize) -> Self {
        self.script.lock().unwrap().failures_left = n;
        self
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().calls
    }
}

#[async_trait]
impl ReadinessProbe for ScriptedProbe {
    fn describe(&self) -> String {
        "scripted probe".to_string()
    }

    async fn probe(&self) -> Result<ProbeResult> {
        let mut script = self.script.lock().unwrap();
        script.calls += 1;
        if script.failures_left > 0 {
            script.failures_left -= 1;
            return Err(AirliftError::Transient("probe unavailable".to_string()));
        }
        let index = script.answered.min(script.steps.len().saturating_sub(1));
        script.answered += 1;
        let readiness = script.steps.get(index).cloned().unwrap_or(Readiness::Pending);
        Ok(ProbeResult::new(readiness, json!({ "probe": script.calls })))
    }
}

type Canned = (u16, String);

/// A request seen by [`MockService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub content_type: Option<String>,
}

/// HTTP service answering kube client requests from canned responses.
/// Unmatched requests get a 404 Status. Every request is recorded.
#[derive(Clone, Default)]
pub struct MockService {
    routes: Arc<Mutex<Vec<(Method, String, Canned)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` on `path` (exact, or as a path prefix)
    pub fn respond(self, method: Method, path: &str, status: u16, body: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .push((method, path.to_string(), (status, body.to_string())));
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.respond(Method::GET, path, status, body)
    }

    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.respond(Method::POST, path, status, body)
    }

    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.respond(Method::PATCH, path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.respond(Method::DELETE, path, status, body)
    }

    /// A client backed by this service; clones share routes and the request log
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded requests with the given method, in order
    pub fn requests_with(&self, method: Method) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<Canned> {
        let routes = self.routes.lock().unwrap();
        let matching = |exact: bool| {
            routes.iter().find(|(m, p, _)| {
                m == method && if exact { p == path } else { path.starts_with(p.as_str()) }
            })
        };
        matching(true)
            .or_else(|| matching(false))
            .map(|(_, _, canned)| canned.clone())
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            query: req.uri().query().unwrap_or_default().to_string(),
            content_type: req
                .headers()
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });
        let (status, body) = self
            .lookup(req.method(), req.uri().path())
            .unwrap_or_else(|| (404, not_found_json("resource", req.uri().path())));

        Box::pin(async move {
            let response = Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))?;
            Ok(response)
        })
    }
}

pub fn namespace_json(name: &str) -> String {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name, "uid": format!("uid-{}", name) }
    })
    .to_string()
}

pub fn not_found_json(resource: &str, name: &str) -> String {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}
