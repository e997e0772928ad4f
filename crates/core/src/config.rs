use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "licenspect.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub index_url: Option<String>,
    pub output_width: Option<usize>,
    pub log_level: Option<String>,
    pub scancode: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let read_and_parse = || -> anyhow::Result<Self> {
            let text = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&text)?)
        };
        read_and_parse().with_context(|| format!("unusable config file {}", path.display()))
    }

    /// Find a `licenspect.toml` for this invocation: the working directory
    /// first, then its ancestors, so runs from a subdirectory of a project
    /// still pick up the project file. An unreadable file is logged and
    /// treated as absent.
    pub fn discover() -> Option<Self> {
        let start = std::env::current_dir().ok()?;
        let found = start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())?;
        match Config::load(&found) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("ignoring {}: {:#}", found.display(), e);
                None
            }
        }
    }
}
