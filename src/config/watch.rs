//! # ConfigMap Watch
//!
//! Watches the controller ConfigMap and hot-reloads configuration.

use crate::config::{ControllerConfig, ServerConfig, SharedControllerConfig, SharedServerConfig};
use futures::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Api;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// Start watching the named ConfigMap and hot-reload configuration on change
///
/// Keys present in the ConfigMap take precedence over the process environment;
/// keys absent from it fall back to the environment and then to defaults.
/// Settings consumed only at startup (metrics port, binaries, cache roots) take
/// effect on the next restart.
pub fn start_configmap_watch(
    client: kube::Client,
    namespace: &str,
    configmap_name: &str,
    controller_config: SharedControllerConfig,
    server_config: SharedServerConfig,
) {
    let namespace = namespace.to_string();
    let configmap_name = configmap_name.to_string();
    tokio::spawn(async move {
        let configmaps: Api<ConfigMap> = Api::namespaced(client, &namespace);
        let watcher_config =
            watcher::Config::default().fields(&format!("metadata.name={configmap_name}"));

        info!(
            configmap = %configmap_name,
            namespace = %namespace,
            "Starting ConfigMap watch for configuration hot-reload"
        );

        let stream = watcher(configmaps, watcher_config).default_backoff();
        pin_mut!(stream);

        while let Some(event_result) = stream.next().await {
            match event_result {
                Ok(watcher::Event::Apply(configmap)) => {
                    info!(configmap = %configmap_name, "ConfigMap changed, reloading configuration");
                    apply_configmap(configmap.data.as_ref(), &controller_config, &server_config)
                        .await;
                }
                Ok(watcher::Event::Delete(_)) => {
                    warn!(configmap = %configmap_name, "ConfigMap deleted, reverting to environment");
                    apply_configmap(None, &controller_config, &server_config).await;
                }
                // Startup already loaded configuration from the environment
                Ok(
                    watcher::Event::Init
                    | watcher::Event::InitApply(_)
                    | watcher::Event::InitDone,
                ) => {}
                Err(e) => {
                    error!("Error watching ConfigMap: {}", e);
                }
            }
        }

        warn!("ConfigMap watch stream ended");
    });
}

async fn apply_configmap(
    data: Option<&BTreeMap<String, String>>,
    controller_config: &SharedControllerConfig,
    server_config: &SharedServerConfig,
) {
    let lookup = |key: &str| configmap_lookup(data, key);
    let new_controller_config = ControllerConfig::from_lookup(lookup);
    let new_server_config = ServerConfig::from_lookup(lookup);

    info!(
        resync_interval_secs = new_controller_config.resync_interval_secs,
        render_workers = new_controller_config.render_workers,
        render_max_attempts = new_controller_config.render_max_attempts,
        "Configuration reloaded"
    );

    *controller_config.write().await = new_controller_config;
    *server_config.write().await = new_server_config;
}

/// ConfigMap keys may be written in lower case (`render_workers`) or as the
/// environment variable name (`RENDER_WORKERS`).
fn configmap_lookup(data: Option<&BTreeMap<String, String>>, key: &str) -> Option<String> {
    data.and_then(|data| {
        data.get(key)
            .or_else(|| data.get(&key.to_lowercase()))
            .cloned()
    })
    .or_else(|| std::env::var(key).ok())
}
