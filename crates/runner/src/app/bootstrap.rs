use std::cell::RefCell;
use std::env;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use sce_engine::{
    sce_catalog, ArchiveCacheManager, ArchiveError, ArchiveLayout, CatalogError, CommandCatalog,
    CommandDispatcher, DiskArchiveFileSystem,
};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::console::ScriptConsole;
use super::scene_controller::SceneController;
use super::script::RunScript;

pub(crate) const DATA_ROOT_ENV_VAR: &str = "SCE_DATA_ROOT";
pub(crate) const ARCHIVE_EXTENSION_ENV_VAR: &str = "SCE_ARCHIVE_EXTENSION";

#[derive(Debug, Error)]
pub(crate) enum StartupError {
    #[error("failed to read run script {path}: {source}")]
    ReadScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse run script {path} at {location}: {source}")]
    ParseScript {
        path: PathBuf,
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error(
        "no data root configured\n\
Set data_root in the run script or export {env_var}=/path/to/archives"
    )]
    MissingDataRoot { env_var: &'static str },
    #[error("data root is not a directory: {0}")]
    InvalidDataRoot(PathBuf),
    #[error("failed to mount archives under {root}: {source}")]
    Mount {
        root: PathBuf,
        #[source]
        source: ArchiveError,
    },
    #[error("failed to build opcode catalog: {0}")]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunnerConfig {
    pub(crate) data_root: PathBuf,
    pub(crate) layout: ArchiveLayout,
}

impl RunnerConfig {
    /// Environment variables win over the run script. A relative script
    /// `data_root` is taken relative to the script's directory.
    pub(crate) fn resolve(script: &RunScript, script_dir: &Path) -> Result<Self, StartupError> {
        Self::resolve_with(script, script_dir, |var| env::var(var))
    }

    fn resolve_with(
        script: &RunScript,
        script_dir: &Path,
        lookup: impl Fn(&'static str) -> Result<String, env::VarError>,
    ) -> Result<Self, StartupError> {
        let data_root = match read_override(&lookup, DATA_ROOT_ENV_VAR)? {
            Some(raw) => PathBuf::from(raw),
            None => match &script.data_root {
                Some(path) if path.is_relative() => script_dir.join(path),
                Some(path) => path.clone(),
                None => {
                    return Err(StartupError::MissingDataRoot {
                        env_var: DATA_ROOT_ENV_VAR,
                    })
                }
            },
        };
        if !data_root.is_dir() {
            return Err(StartupError::InvalidDataRoot(data_root));
        }

        let extension = read_override(&lookup, ARCHIVE_EXTENSION_ENV_VAR)?
            .or_else(|| script.archive_extension.clone());
        let layout = match extension {
            Some(extension) => ArchiveLayout::with_extension(extension),
            None => ArchiveLayout::default(),
        };

        Ok(Self { data_root, layout })
    }
}

fn read_override(
    lookup: &impl Fn(&'static str) -> Result<String, env::VarError>,
    var: &'static str,
) -> Result<Option<String>, StartupError> {
    match lookup(var) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(StartupError::EnvVar { var, source }),
    }
}

/// Everything the dispatcher reaches. The dispatcher only holds weak
/// references, so the executors live exactly as long as this value.
pub(crate) struct RunnerWiring {
    pub(crate) catalog: CommandCatalog,
    pub(crate) dispatcher: Rc<CommandDispatcher>,
    pub(crate) cache: Rc<RefCell<ArchiveCacheManager<DiskArchiveFileSystem>>>,
    pub(crate) scene_controller: Rc<RefCell<SceneController<DiskArchiveFileSystem>>>,
    pub(crate) console: Rc<RefCell<ScriptConsole>>,
}

pub(crate) fn build_runner(config: &RunnerConfig) -> Result<RunnerWiring, StartupError> {
    let file_system =
        DiskArchiveFileSystem::mount(&config.data_root, &config.layout).map_err(|source| {
            StartupError::Mount {
                root: config.data_root.clone(),
                source,
            }
        })?;
    let catalog = sce_catalog()?.build();
    let dispatcher = Rc::new(CommandDispatcher::new());
    let cache = ArchiveCacheManager::attach(file_system, config.layout.clone(), &dispatcher);
    let scene_controller = SceneController::attach(&dispatcher, &cache);
    let console = ScriptConsole::attach(&dispatcher);

    info!(
        data_root = %config.data_root.display(),
        extension = %config.layout.extension,
        opcode_count = catalog.len(),
        "runner_wired"
    );
    Ok(RunnerWiring {
        catalog,
        dispatcher,
        cache,
        scene_controller,
        console,
    })
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::app::script::DEFAULT_TICK_SECONDS;

    fn script(data_root: Option<&str>, extension: Option<&str>) -> RunScript {
        RunScript {
            data_root: data_root.map(PathBuf::from),
            archive_extension: extension.map(ToString::to_string),
            instructions: Vec::new(),
            objects: Vec::new(),
            team_size: 0,
            tick_seconds: DEFAULT_TICK_SECONDS,
        }
    }

    fn no_env(_: &'static str) -> Result<String, env::VarError> {
        Err(env::VarError::NotPresent)
    }

    #[test]
    fn relative_data_root_resolves_against_script_dir() {
        let temp = TempDir::new().expect("temp");
        std::fs::create_dir(temp.path().join("data")).expect("data dir");

        let config = RunnerConfig::resolve_with(&script(Some("data"), None), temp.path(), no_env)
            .expect("config");
        assert_eq!(config.data_root, temp.path().join("data"));
        assert_eq!(config.layout, ArchiveLayout::default());
    }

    #[test]
    fn environment_overrides_script() {
        let temp = TempDir::new().expect("temp");
        let root = temp.path().to_string_lossy().into_owned();
        let lookup = move |var: &'static str| match var {
            DATA_ROOT_ENV_VAR => Ok(root.clone()),
            ARCHIVE_EXTENSION_ENV_VAR => Ok("cpk".to_string()),
            _ => Err(env::VarError::NotPresent),
        };

        let config = RunnerConfig::resolve_with(
            &script(Some("/nowhere"), Some(".dat")),
            Path::new("."),
            lookup,
        )
        .expect("config");
        assert_eq!(config.data_root, temp.path());
        assert_eq!(config.layout.extension, ".cpk");
    }

    #[test]
    fn missing_data_root_is_reported() {
        let error = RunnerConfig::resolve_with(&script(None, None), Path::new("."), no_env)
            .expect_err("no root");
        assert!(matches!(
            error,
            StartupError::MissingDataRoot {
                env_var: DATA_ROOT_ENV_VAR
            }
        ));
    }

    #[test]
    fn data_root_must_be_a_directory() {
        let temp = TempDir::new().expect("temp");
        let error = RunnerConfig::resolve_with(
            &script(Some("absent"), None),
            temp.path(),
            no_env,
        )
        .expect_err("absent dir");
        assert!(matches!(error, StartupError::InvalidDataRoot(_)));
    }
}
