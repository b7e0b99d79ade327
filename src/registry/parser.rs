//! Registry file discovery and loading.

use super::Registry;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "port-warden.yaml";

/// Loads the environment registry from `port-warden.yaml`, falling back to
/// the built-in defaults when no file is present.
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Parser
    }

    /// Walk from `start` up to the filesystem root looking for the config file.
    pub fn find_config_file(&self, start: &Path) -> Option<PathBuf> {
        let mut dir = Some(start);
        while let Some(d) = dir {
            let candidate = d.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            dir = d.parent();
        }
        None
    }

    /// Load and validate a registry from an explicit path.
    pub fn load(&self, path: &Path) -> Result<Registry> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("could not read {}: {}", path.display(), e))
        })?;
        let mut registry: Registry = serde_yaml::from_str(&raw)?;

        // Environment names live as map keys in the file; copy them into the
        // structs so every Environment is self-describing.
        for (name, env) in registry.environments.iter_mut() {
            env.name = name.clone();
        }

        registry.validate()?;
        tracing::debug!(
            path = %path.display(),
            environments = registry.environments.len(),
            "loaded registry"
        );
        Ok(registry)
    }

    /// Load from the discovered config file, or fall back to built-ins.
    pub fn load_or_builtin(&self, workdir: &Path) -> Result<Registry> {
        match self.find_config_file(workdir) {
            Some(path) => self.load(&path),
            None => {
                tracing::debug!("no {} found, using built-in registry", CONFIG_FILE_NAME);
                Ok(Registry::builtin())
            }
        }
    }

    /// Serialize the built-in registry as a starter config file.
    pub fn starter_config(&self) -> Result<String> {
        let registry = Registry::builtin();
        let body = serde_yaml::to_string(&registry)?;
        Ok(format!(
            "# port-warden environment registry.\n\
             # Each environment owns a disjoint port band; services map to fixed ports\n\
             # inside that band. Edit ranges and assignments to match your deployment.\n{}",
            body
        ))
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
