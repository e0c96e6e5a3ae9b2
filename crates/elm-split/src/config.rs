//! Layered configuration
//!
//! Layers, later ones overriding earlier ones key by key:
//! built-in defaults, the user config file, `elm-split.toml` in the working
//! directory, and finally a file given with `--config`.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result, bail};
use etcetera::{BaseStrategy, choose_base_strategy};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{ambient_globals::AmbientGlobals, types::FxIndexMap};

/// Project-local config file name
pub const PROJECT_CONFIG_FILE: &str = "elm-split.toml";

/// Directory under the user config dir
const USER_CONFIG_DIR: &str = "elm-split";

/// Elm runtime slots that hold process-wide mutable state; two copies would
/// split one runtime into two
const DEFAULT_FORCED_SHARED: &[&str] = &[
    "_VirtualDom_divertHrefToApp",
    "_Platform_effectManagers",
    "_Platform_effectsQueue",
    "_Platform_effectsActive",
    "_Scheduler_guid",
    "_Scheduler_queue",
    "_Scheduler_working",
];

static JS_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Names placed in the shared module even when one program uses them
    pub forced_shared: Vec<String>,
    /// Extra names the environment provides
    pub ambient_globals: Vec<String>,
    /// Declaration name to literal source text emitted in its place
    pub replacements: FxIndexMap<String, String>,
    /// Namespace the program modules import the shared module under
    pub shared_alias: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            forced_shared: DEFAULT_FORCED_SHARED
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
            ambient_globals: Vec::new(),
            replacements: FxIndexMap::default(),
            shared_alias: "shared".to_owned(),
        }
    }
}

/// One config file; absent keys leave the previous layer untouched
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigLayer {
    forced_shared: Option<Vec<String>>,
    ambient_globals: Option<Vec<String>>,
    replacements: Option<FxIndexMap<String, String>>,
    shared_alias: Option<String>,
}

impl Config {
    /// Load every layer; `explicit` must exist when given
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut candidates = Vec::new();
        if let Some(path) = user_config_path() {
            candidates.push(path);
        }
        candidates.push(PathBuf::from(PROJECT_CONFIG_FILE));
        Self::layered(&candidates, explicit)
    }

    /// Apply the `candidates` that exist in order, then `explicit`
    pub fn layered(candidates: &[PathBuf], explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        for path in candidates {
            if path.is_file() {
                config.apply_file(path)?;
            }
        }
        if let Some(path) = explicit {
            config.apply_file(path)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Built-in ambient globals extended with the configured ones
    pub fn ambient(&self) -> AmbientGlobals {
        AmbientGlobals::with_extra(&self.ambient_globals)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let layer: ConfigLayer = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("Applying config layer {}", path.display());
        self.merge(layer);
        Ok(())
    }

    fn merge(&mut self, layer: ConfigLayer) {
        if let Some(forced_shared) = layer.forced_shared {
            self.forced_shared = forced_shared;
        }
        if let Some(ambient_globals) = layer.ambient_globals {
            self.ambient_globals = ambient_globals;
        }
        if let Some(replacements) = layer.replacements {
            self.replacements = replacements;
        }
        if let Some(shared_alias) = layer.shared_alias {
            self.shared_alias = shared_alias;
        }
    }

    fn validate(&self) -> Result<()> {
        if !JS_IDENTIFIER.is_match(&self.shared_alias) {
            bail!(
                "shared-alias `{}` is not a valid JavaScript identifier",
                self.shared_alias
            );
        }
        Ok(())
    }
}

/// `<config dir>/elm-split/config.toml`, when a home directory is known
fn user_config_path() -> Option<PathBuf> {
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join(USER_CONFIG_DIR).join("config.toml"))
}
