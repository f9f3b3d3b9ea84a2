use std::ffi::OsString;
use std::fs;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::dsl::transpile::LoweringOptions;
use crate::error::LoomError;

// ── Build config ─────────────────────────────────────────────────

/// Per-project build settings stored in `loom.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct BuildConfig {
    pub version: u32,
    /// Model names known to the lowering pass in addition to the ones the
    /// script declares.
    #[serde(default)]
    pub models: Vec<String>,
    /// Lines preceding the script in its host file. Ignored for embedded
    /// scripts, whose offset comes from the host itself.
    #[serde(default)]
    pub line_offset: usize,
    #[serde(default = "default_true")]
    pub emit_prelude: bool,
    /// Write `<input>.map.json` next to the output.
    #[serde(default)]
    pub source_map: bool,
}

const CONFIG_VERSION: u32 = 1;

fn default_true() -> bool {
    true
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            models: Vec::new(),
            line_offset: 0,
            emit_prelude: true,
            source_map: false,
        }
    }
}

impl BuildConfig {
    pub fn lowering_options(&self) -> LoweringOptions {
        LoweringOptions {
            emit_prelude: self.emit_prelude,
        }
    }

    /// Append models named on the command line, keeping the first occurrence.
    pub fn merge_models(&mut self, extra: &[String]) {
        for m in extra {
            if !self.models.contains(m) {
                self.models.push(m.clone());
            }
        }
    }
}

/// Load the config at `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<BuildConfig, LoomError> {
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(BuildConfig::default());
    }
    let config: BuildConfig = read_json(path)?;
    if config.version > CONFIG_VERSION {
        return Err(LoomError::ConfigError {
            message: format!(
                "{} has version {}, newest supported is {CONFIG_VERSION}",
                path.display(),
                config.version
            ),
        });
    }
    Ok(config)
}

pub fn save_config(path: &Path, config: &BuildConfig) -> Result<(), LoomError> {
    write_json(path, config)
}

/// JSON Schema for `loom.json`, pretty-printed.
pub fn config_schema() -> Result<String, LoomError> {
    let schema = schemars::schema_for!(BuildConfig);
    Ok(serde_json::to_string_pretty(&schema)?)
}

// ── JSON helpers ─────────────────────────────────────────────────

/// Write through a sibling `.tmp` file so readers never see a partial file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), LoomError> {
    let file_name = path.file_name().unwrap_or_default();
    let mut tmp_name = OsString::from(file_name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(&tmp_name);

    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), LoomError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoomError> {
    let data = fs::read_to_string(path).map_err(|e| LoomError::io(path, &e))?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}
