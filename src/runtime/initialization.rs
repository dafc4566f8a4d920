//! # Initialization
//!
//! Controller startup: rustls, tracing, metrics, the health server, the
//! Kubernetes client and the render collaborators.

use crate::config::watch::start_configmap_watch;
use crate::config::{ControllerConfig, ServerConfig, SharedControllerConfig, SharedServerConfig};
use crate::controller::reconciler::matching::ArgoCdClusterRegistry;
use crate::controller::reconciler::render::{
    CliHelmRenderer, CliKustomizeRenderer, GitSourceFetcher, LocalManifestStore, RenderExecutor,
};
use crate::controller::reconciler::{start_deletion_watch, Reconciler};
use crate::controller::server::{start_server, ServerState};
use crate::crd::ApplicationTemplate;
use crate::observability;
use anyhow::{Context, Result};
use kube::{api::Api, Client};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    pub client: Client,
    /// API for ApplicationTemplates in all namespaces
    pub templates: Api<ApplicationTemplate>,
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Shared controller configuration (hot-reloadable)
    pub controller_config: SharedControllerConfig,
    /// Shared server configuration (hot-reloadable)
    pub server_config: SharedServerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// # Errors
///
/// Fails when the health server cannot start, metrics cannot be registered or
/// no Kubernetes client can be built.
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let controller_config_value = ControllerConfig::from_env();
    init_tracing(&controller_config_value);

    info!("Starting ApplicationTemplate Controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let controller_config: SharedControllerConfig = Arc::new(RwLock::new(controller_config_value));
    let server_config: SharedServerConfig = Arc::new(RwLock::new(ServerConfig::from_env()));
    let server_state = Arc::new(ServerState::default());

    let server_port = server_config.read().await.metrics_port;
    let server_state_clone = server_state.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let templates: Api<ApplicationTemplate> = Api::all(client.clone());

    let config = controller_config.read().await.clone();
    check_binaries(&config);

    let job_timeout = config.render_job_timeout();
    let executor = RenderExecutor::new(
        Arc::new(GitSourceFetcher::new(
            config.git_binary.clone(),
            config.checkout_cache_dir.clone(),
            job_timeout,
        )),
        Arc::new(CliHelmRenderer::new(config.helm_binary.clone(), job_timeout)),
        Arc::new(CliKustomizeRenderer::new(config.kustomize_binary.clone(), job_timeout)),
        Arc::new(LocalManifestStore::new(config.render_output_dir.clone())),
    );
    let registry = Arc::new(ArgoCdClusterRegistry::new(
        client.clone(),
        &config.cluster_registry_namespace,
    ));

    info!(
        registry_namespace = %config.cluster_registry_namespace,
        checkout_cache_dir = %config.checkout_cache_dir.display(),
        render_output_dir = %config.render_output_dir.display(),
        render_workers = config.render_workers,
        "Render pipeline configured"
    );

    let reconciler = Arc::new(Reconciler::new(
        client.clone(),
        controller_config.clone(),
        registry,
        executor,
    ));

    start_deletion_watch(reconciler.clone());

    match std::env::var("CONFIG_MAP_NAME") {
        Ok(configmap_name) if !configmap_name.trim().is_empty() => {
            info!(
                "Hot-reload enabled: watching ConfigMap '{}' in namespace '{}'",
                configmap_name, config.controller_namespace
            );
            start_configmap_watch(
                client.clone(),
                &config.controller_namespace,
                configmap_name.trim(),
                controller_config.clone(),
                server_config.clone(),
            );
        }
        _ => info!("Hot-reload disabled - configuration changes require pod restart"),
    }

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        templates,
        reconciler,
        server_state,
        controller_config,
        server_config,
    })
}

fn init_tracing(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "application_template_controller={}",
            config.log_level.to_lowercase()
        )
        .into()
    });

    let result = if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(config.log_enable_color)
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Warn about renderer binaries missing from PATH; their jobs fail terminally
fn check_binaries(config: &ControllerConfig) {
    for (what, binary) in [
        ("git", &config.git_binary),
        ("helm", &config.helm_binary),
        ("kustomize", &config.kustomize_binary),
    ] {
        match which::which(binary) {
            Ok(path) => info!(tool = what, path = %path.display(), "Found binary"),
            Err(e) => warn!(tool = what, binary = %binary, error = %e, "Binary not found, render jobs using it will fail"),
        }
    }
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &SharedServerConfig,
) -> Result<()> {
    let (startup_timeout, poll_interval) = {
        let config = server_config.read().await;
        (config.startup_timeout(), config.poll_interval())
    };
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
