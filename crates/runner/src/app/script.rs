use std::fs;
use std::path::{Path, PathBuf};

use sce_engine::ArgValue;
use serde::Deserialize;

use super::bootstrap::StartupError;

pub(crate) const DEFAULT_TICK_SECONDS: f32 = 0.25;

/// An already-decoded opcode stream plus the scene objects to exercise after it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RunScript {
    #[serde(default)]
    pub(crate) data_root: Option<PathBuf>,
    #[serde(default)]
    pub(crate) archive_extension: Option<String>,
    pub(crate) instructions: Vec<ScriptInstruction>,
    #[serde(default)]
    pub(crate) objects: Vec<ScriptObject>,
    #[serde(default)]
    pub(crate) team_size: usize,
    #[serde(default = "default_tick_seconds")]
    pub(crate) tick_seconds: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScriptInstruction {
    pub(crate) opcode: u32,
    #[serde(default)]
    pub(crate) args: Vec<ArgValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum ScriptObject {
    SceneSfx {
        sfx_name: String,
    },
    GravitySwitch {
        required_headcount: usize,
        times: u32,
    },
}

fn default_tick_seconds() -> f32 {
    DEFAULT_TICK_SECONDS
}

pub(crate) fn load_run_script(path: &Path) -> Result<RunScript, StartupError> {
    let raw = fs::read_to_string(path).map_err(|source| StartupError::ReadScript {
        path: path.to_path_buf(),
        source,
    })?;
    parse_run_script(&raw, path)
}

pub(crate) fn parse_run_script(raw: &str, path: &Path) -> Result<RunScript, StartupError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, RunScript>(&mut deserializer).map_err(|error| {
        let location = error.path().to_string();
        StartupError::ParseScript {
            path: path.to_path_buf(),
            location: if location.is_empty() {
                ".".to_string()
            } else {
                location
            },
            source: error.into_inner(),
        }
    })
}
