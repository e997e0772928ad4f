use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// One `[[package]]` entry of a Cargo lockfile.
#[derive(Debug, Clone, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl LockedPackage {
    pub fn download_url(&self) -> String {
        format!(
            "https://crates.io/api/v1/crates/{}/{}/download",
            self.name, self.version
        )
    }

    /// Local file name for the stored artifact, `{name}_{version}.crate`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.crate", self.name, self.version)
    }

    fn is_registry(&self) -> bool {
        self.source
            .as_deref()
            .is_some_and(|s| s.starts_with("registry+"))
    }
}

#[derive(Debug, Deserialize)]
struct Lockfile {
    #[serde(default)]
    package: Vec<LockedPackage>,
}

/// Parse a lockfile and keep the registry-sourced dependencies; local path
/// and git dependencies have no registry artifact to fetch.
pub fn parse(contents: &str) -> anyhow::Result<Vec<LockedPackage>> {
    let lockfile: Lockfile = toml::from_str(contents).context("parse lockfile")?;
    Ok(lockfile
        .package
        .into_iter()
        .filter(LockedPackage::is_registry)
        .collect())
}

pub fn load(path: &Path) -> anyhow::Result<Vec<LockedPackage>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse(&contents)
}
