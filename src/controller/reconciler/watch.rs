//! # Deletion Watch
//!
//! Side watcher over ApplicationTemplates that cancels the in-flight pass of a
//! template as soon as it is deleted or marked for deletion. The main
//! controller only sees the object again after the pass returns, which is too
//! late to stop its status write.

use super::types::Reconciler;
use crate::crd::ApplicationTemplate;
use crate::observability::metrics;
use futures::{pin_mut, StreamExt};
use kube::{Api, ResourceExt};
use kube_runtime::{watcher, WatchStreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

fn template_key(template: &ApplicationTemplate) -> (String, String) {
    (
        template.namespace().unwrap_or_else(|| "default".to_string()),
        template.name_any(),
    )
}

/// Start watching for template deletions
pub fn start_deletion_watch(reconciler: Arc<Reconciler>) {
    tokio::spawn(async move {
        let templates: Api<ApplicationTemplate> = Api::all(reconciler.client.clone());
        info!("Starting ApplicationTemplate deletion watch");

        let stream = watcher(templates, watcher::Config::default()).default_backoff();
        pin_mut!(stream);

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Delete(template)) => {
                    let (namespace, name) = template_key(&template);
                    let key = format!("{namespace}/{name}");
                    if reconciler.passes.cancel(&key) {
                        info!(namespace = %namespace, name = %name, "Template deleted, cancelled in-flight pass");
                    }
                    reconciler.forget(&key);
                    metrics::remove_template_gauges(&namespace, &name);
                }
                Ok(watcher::Event::Apply(template) | watcher::Event::InitApply(template))
                    if template.metadata.deletion_timestamp.is_some() =>
                {
                    let (namespace, name) = template_key(&template);
                    if reconciler.passes.cancel(&format!("{namespace}/{name}")) {
                        info!(namespace = %namespace, name = %name, "Template terminating, cancelled in-flight pass");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error watching ApplicationTemplates for deletion: {}", e);
                }
            }
        }

        warn!("ApplicationTemplate deletion watch stream ended");
    });
}
