//! # HubCluster Operator
//!
//! Watches `HubCluster` resources (`onprem.operators.io/v1alpha1`) and, for
//! each one, installs a bundle of manifest resources read from disk:
//!
//! 1. **Transform** - owner reference, namespace and binding subjects are bound to the instance
//! 2. **Apply** - every resource is server-side applied in manifest order
//! 3. **Record status** - `status.version` is set to the operator version
//! 4. **Refresh** - the manifest is reparsed for the next cycle
//!
//! Deleting the instance deletes the bundle.
//!
//! ## Usage
//!
//! ```bash
//! hubcluster-operator --filename deploy/resources --recursive --namespace '$POD_NAMESPACE'
//! ```

use anyhow::Result;
use clap::Parser;
use hubcluster_operator::config::Args;
use hubcluster_operator::runtime::initialization::initialize;
use hubcluster_operator::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let init = initialize(args).await?;

    run_watch_loop(
        init.hubclusters,
        init.owned,
        init.reconciler,
        init.server_state,
        init.config,
        init.shutdown,
    )
    .await
}
