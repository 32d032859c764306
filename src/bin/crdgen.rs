//! # CRD Generator
//!
//! Prints the `HubCluster` CustomResourceDefinition as YAML.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > deploy/crds/onprem.operators.io_hubclusters_crd.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use hubcluster_operator::crd::HubCluster;
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&HubCluster::crd())?);
    Ok(())
}
