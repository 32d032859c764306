//! # HubCluster Status

use serde::{Deserialize, Serialize};

/// Observed state of a `HubCluster`
///
/// Only written after a fully successful install, so an empty or stale
/// version is the signal that reconciliation is failing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HubClusterStatus {
    /// The version of the installed release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
