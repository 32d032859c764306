//! # Command-line Flags

use crate::constants::DEFAULT_MANIFEST_PATH;
use crate::manifest::ManifestSource;
use crate::transform::resolve_env;
use clap::Parser;
use std::path::PathBuf;

/// HubCluster operator
#[derive(Debug, Clone, Parser)]
#[command(name = "hubcluster-operator", version, about, long_about = None)]
pub struct Args {
    /// The filename containing the YAML resources to apply
    #[arg(long, env = "MANIFEST_FILENAME", default_value = DEFAULT_MANIFEST_PATH)]
    pub filename: PathBuf,

    /// If filename is a directory, process all manifests recursively
    #[arg(long, env = "MANIFEST_RECURSIVE")]
    pub recursive: bool,

    /// Overrides namespace in manifest (env vars resolved in-container)
    #[arg(long, env = "NAMESPACE_OVERRIDE")]
    pub namespace: Option<String>,
}

impl Args {
    #[must_use]
    pub fn manifest_source(&self) -> ManifestSource {
        ManifestSource::new(&self.filename, self.recursive)
    }

    /// The namespace override with environment variables expanded.
    /// An override that expands to nothing counts as unset.
    #[must_use]
    pub fn namespace_override(&self) -> Option<String> {
        self.namespace
            .as_deref()
            .map(resolve_env)
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
    }
}
