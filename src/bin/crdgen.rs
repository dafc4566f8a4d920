//! # CRD Generator
//!
//! Prints the `ApplicationTemplate` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/applicationtemplate.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use application_template_controller::crd::ApplicationTemplate;
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = serde_yaml::to_string(&ApplicationTemplate::crd())?;
    print!("{crd}");
    Ok(())
}
