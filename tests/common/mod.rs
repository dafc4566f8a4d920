//! Shared fixtures for integration tests
//!
//! In-memory fakes for every collaborator of the render pipeline, plus a
//! fixture repository on disk that the fake fetcher hands out.

#![allow(dead_code)]

use application_template_controller::controller::reconciler::matching::{
    ClusterRef, ClusterRegistry, RegistryError,
};
use application_template_controller::controller::reconciler::render::{
    Checkout, ExecutorSettings, HelmRenderer, HelmRequest, KustomizeRenderer, LocalManifestStore,
    PassContext, RenderError, RenderExecutor, SourceFetcher, TemplateScope,
};
use application_template_controller::controller::backoff::RetryBackoff;
use application_template_controller::controller::reconciler::RenderPipeline;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Registry whose cluster list and availability tests can change between passes
#[derive(Default)]
pub struct FakeRegistry {
    clusters: Mutex<Vec<ClusterRef>>,
    unavailable: AtomicBool,
}

impl FakeRegistry {
    pub fn with_clusters(clusters: Vec<ClusterRef>) -> Self {
        Self {
            clusters: Mutex::new(clusters),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_clusters(&self, clusters: Vec<ClusterRef>) {
        *self.clusters.lock().expect("registry lock in test") = clusters;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClusterRegistry for FakeRegistry {
    async fn list_clusters(&self) -> Result<Vec<ClusterRef>, RegistryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("connection refused".to_string()));
        }
        Ok(self.clusters.lock().expect("registry lock in test").clone())
    }
}

pub fn cluster(name: &str, labels: &[(&str, &str)]) -> ClusterRef {
    ClusterRef::new(name, labels.iter().map(|(k, v)| (k.to_string(), v.to_string())))
}

/// Hands out the fixture repository and counts fetches
pub struct DirFetcher {
    dir: PathBuf,
    pub fetches: AtomicUsize,
}

impl DirFetcher {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceFetcher for DirFetcher {
    async fn fetch(&self, _repo_url: &str, _revision: &str) -> Result<Checkout, RenderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(Checkout::new(self.dir.clone()))
    }
}

/// Failure scripted for a renderer input
#[derive(Clone, Debug)]
pub enum Scripted {
    /// Fail with a terminal error on every attempt
    Terminal(String),
    /// Fail transiently this many times, then succeed
    TransientTimes(usize),
    /// Never return
    Hang,
}

#[derive(Default)]
pub struct Script {
    failures: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl Script {
    pub fn fail(&self, input: &str, failure: Scripted) {
        self.failures
            .lock()
            .expect("script lock in test")
            .insert(input.to_string(), failure);
    }

    pub fn clear(&self, input: &str) {
        self.failures.lock().expect("script lock in test").remove(input);
    }

    pub fn calls(&self, input: &str) -> usize {
        self.calls
            .lock()
            .expect("script lock in test")
            .get(input)
            .copied()
            .unwrap_or(0)
    }

    async fn run(&self, input: &str, output: Vec<u8>) -> Result<Vec<u8>, RenderError> {
        let call = {
            let mut calls = self.calls.lock().expect("script lock in test");
            let count = calls.entry(input.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let failure = self
            .failures
            .lock()
            .expect("script lock in test")
            .get(input)
            .cloned();
        match failure {
            Some(Scripted::Terminal(message)) => Err(RenderError::terminal(message)),
            Some(Scripted::TransientTimes(times)) if call <= times => {
                Err(RenderError::transient("connection reset by peer"))
            }
            Some(Scripted::Hang) => {
                futures::future::pending::<()>().await;
                Err(RenderError::terminal("unreachable"))
            }
            _ => Ok(output),
        }
    }
}

/// Helm fake keyed by the last values file, relative to the checkout
pub struct FakeHelm {
    pub script: Script,
}

#[async_trait]
impl HelmRenderer for FakeHelm {
    async fn render(&self, request: &HelmRequest<'_>) -> Result<Vec<u8>, RenderError> {
        let relative: Vec<String> = request
            .values_files
            .iter()
            .map(|file| {
                file.strip_prefix(request.workdir)
                    .unwrap_or(file)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        let key = relative.last().cloned().unwrap_or_default();
        let manifest = format!(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\ndata:\n  values: \"{}\"\n",
            request.release,
            relative.join(",")
        );
        self.script.run(&key, manifest.into_bytes()).await
    }
}

/// Kustomize fake keyed by the overlay directory, relative to the checkout
pub struct FakeKustomize {
    pub root: PathBuf,
    pub script: Script,
}

#[async_trait]
impl KustomizeRenderer for FakeKustomize {
    async fn render(&self, overlay_dir: &Path) -> Result<Vec<u8>, RenderError> {
        let key = overlay_dir
            .strip_prefix(&self.root)
            .unwrap_or(overlay_dir)
            .to_string_lossy()
            .into_owned();
        let manifest = format!(
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\n  annotations:\n    overlay: \"{key}\"\n"
        );
        self.script.run(&key, manifest.into_bytes()).await
    }
}

/// Fixture repository, fakes and a real manifest store in temp directories
pub struct Harness {
    pub repo: TempDir,
    pub output: TempDir,
    pub registry: Arc<FakeRegistry>,
    pub fetcher: Arc<DirFetcher>,
    pub helm: Arc<FakeHelm>,
    pub kustomize: Arc<FakeKustomize>,
    pub store: Arc<LocalManifestStore>,
    pub pipeline: RenderPipeline,
}

impl Harness {
    pub fn new(clusters: Vec<ClusterRef>) -> Self {
        let repo = tempfile::tempdir().expect("repo tempdir in test");
        write_fixture_repo(repo.path());
        let output = tempfile::tempdir().expect("output tempdir in test");

        let registry = Arc::new(FakeRegistry::with_clusters(clusters));
        let fetcher = Arc::new(DirFetcher::new(repo.path()));
        let helm = Arc::new(FakeHelm {
            script: Script::default(),
        });
        let kustomize = Arc::new(FakeKustomize {
            root: repo.path().to_path_buf(),
            script: Script::default(),
        });
        let store = Arc::new(LocalManifestStore::new(output.path()));

        let executor = RenderExecutor::new(
            fetcher.clone(),
            helm.clone(),
            kustomize.clone(),
            store.clone(),
        );
        let pipeline = RenderPipeline::new(registry.clone(), executor);

        Self {
            repo,
            output,
            registry,
            fetcher,
            helm,
            kustomize,
            store,
            pipeline,
        }
    }

    pub fn scope_dir(&self) -> PathBuf {
        self.store.scope_dir(&scope())
    }
}

pub fn scope() -> TemplateScope {
    TemplateScope {
        namespace: "apps".to_string(),
        name: "web".to_string(),
    }
}

pub fn context() -> PassContext {
    PassContext {
        scope: scope(),
        repo_url: "https://git.example.com/web.git".to_string(),
        revision: "main".to_string(),
        release: "web".to_string(),
    }
}

/// Fast retries so transient scenarios finish quickly
pub fn settings() -> ExecutorSettings {
    ExecutorSettings {
        workers: 4,
        retry: RetryBackoff::new(Duration::from_millis(5), Duration::from_millis(20), 3),
        pass_timeout: Duration::from_secs(30),
    }
}

fn write_fixture_repo(root: &Path) {
    let files: BTreeMap<&str, &str> = BTreeMap::from([
        ("values.yaml", "replicas: 1\n"),
        ("values-prod.yaml", "replicas: 3\n"),
        ("values-eu.yaml", "region: eu\n"),
        ("envs/prod/values.yaml", "replicas: 3\n"),
        ("envs/dev/values.yaml", "replicas: 1\n"),
        ("overlays/prod/kustomization.yaml", "resources: []\n"),
        ("overlays/dev/kustomization.yaml", "resources: []\n"),
        ("app/values.yaml", "replicas: 2\n"),
        ("app/kustomization.yaml", "resources: []\n"),
    ]);
    for (path, content) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("fixture dir in test");
        }
        std::fs::write(full, content).expect("fixture file in test");
    }
}
