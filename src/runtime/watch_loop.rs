//! # Watch Loop
//!
//! Controller watch loop over ApplicationTemplates. ArgoCD cluster secrets are
//! watched alongside so a registry change re-queues every template.

use crate::config::SharedControllerConfig;
use crate::constants::ARGOCD_CLUSTER_SECRET_SELECTOR;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::ApplicationTemplate;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::{self, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Run the controller watch loop until shutdown
///
/// The controller is rebuilt whenever its stream ends so configuration
/// changes to concurrency and debounce take effect on restart.
pub async fn run_watch_loop(
    templates: Api<ApplicationTemplate>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    controller_config: SharedControllerConfig,
) -> Result<(), anyhow::Error> {
    info!("Starting controller watch loop...");

    let backoff_ms = Arc::new(AtomicU64::new(
        controller_config.read().await.watch_restart_delay_secs.max(1) * 1_000,
    ));

    let shutdown_state = server_state.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal, initiating graceful shutdown...");
        shutdown_state.set_ready(false);
    });

    loop {
        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let config = controller_config.read().await.clone();
        let secrets: Api<Secret> =
            Api::namespaced(reconciler.client.clone(), &config.cluster_registry_namespace);

        let controller = Controller::new(templates.clone(), watcher::Config::default().any_semantic())
            .with_config(
                controller::Config::default()
                    .debounce(config.reconcile_debounce())
                    .concurrency(config.max_concurrent_reconciles),
            );
        let store = controller.store();
        let mapper_reconciler = reconciler.clone();

        let backoff_for_stream = backoff_ms.clone();
        let config_for_stream = controller_config.clone();
        controller
            .watches(
                secrets,
                watcher::Config::default().labels(ARGOCD_CLUSTER_SECRET_SELECTOR),
                move |secret: Secret| {
                    let templates = store.state();
                    debug!(
                        secret = %secret.name_any(),
                        templates = templates.len(),
                        "Cluster registry changed, re-queueing templates"
                    );
                    let keys: Vec<String> = templates
                        .iter()
                        .map(|t| {
                            format!(
                                "{}/{}",
                                t.namespace().unwrap_or_else(|| "default".to_string()),
                                t.name_any()
                            )
                        })
                        .collect();
                    mapper_reconciler.note_registry_change(keys.iter().map(String::as_str));
                    templates
                        .iter()
                        .map(|t| ObjectRef::from_obj(t.as_ref()))
                        .collect::<Vec<_>>()
                },
            )
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, reconciler.clone())
            .filter_map(move |result| {
                let backoff = backoff_for_stream.clone();
                let config = config_for_stream.clone();
                async move {
                    match &result {
                        Ok((object, _action)) => {
                            debug!(template = %object.name, "watch.event.success");
                            let start = config.read().await.watch_restart_delay_secs.max(1) * 1_000;
                            backoff.store(start, Ordering::Relaxed);
                            Some(result)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            let (max_backoff_ms, restart_delay) = {
                                let c = config.read().await;
                                (c.backoff_max_minutes * 60_000, c.watch_restart_delay_duration())
                            };
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                max_backoff_ms,
                                restart_delay,
                            )
                            .await
                            .map(|()| result)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(tracing::info_span!("controller.watch", operation = "watch_loop"))
            .await;

        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = controller_config.read().await.watch_restart_delay_after_end_duration();
        warn!(
            delay_secs = delay.as_secs(),
            "Controller watch stream ended, restarting"
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
