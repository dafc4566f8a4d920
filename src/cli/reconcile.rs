//! # Reconcile Command
//!
//! Requests a pass by stamping the reconcile annotation with the current time.
//! The controller runs one pass per distinct annotation value.

use anyhow::{Context, Result};
use application_template_controller::constants::RECONCILE_ANNOTATION;
use application_template_controller::crd::ApplicationTemplate;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;

pub async fn reconcile_command(
    client: Client,
    name: String,
    namespace: Option<String>,
) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let api: Api<ApplicationTemplate> = Api::namespaced(client, ns);

    println!("🔄 Triggering reconciliation for ApplicationTemplate '{ns}/{name}'...");

    api.get(&name)
        .await
        .with_context(|| format!("Failed to get ApplicationTemplate '{ns}/{name}'"))?;

    let requested_at = chrono::Utc::now().to_rfc3339();
    let patch = json!({
        "metadata": {
            "annotations": {
                RECONCILE_ANNOTATION: requested_at
            }
        }
    });

    api.patch(&name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| {
            format!("Failed to trigger reconciliation for ApplicationTemplate '{ns}/{name}'")
        })?;

    println!("✅ Reconciliation triggered successfully");
    println!("   Resource: {ns}/{name}");
    println!("   Annotation: {RECONCILE_ANNOTATION}={requested_at}");
    println!("\nThe controller will reconcile this resource shortly.");

    Ok(())
}
