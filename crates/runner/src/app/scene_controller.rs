use std::cell::RefCell;
use std::rc::Rc;

use sce_engine::command::{SceneInfo, SceneLoadCommand, ScenePreLoadingNotification};
use sce_engine::{
    ArchiveCacheManager, ArchiveError, ArchiveFileSystem, CommandDispatcher, CommandExecutor,
    ExecutorError,
};
use tracing::{info, warn};

pub(crate) const SCENE_ENTRY_FILE: &str = "scene.scn";

/// Executes scene loads: announces the transition so the archive cache can
/// settle residency, then reads the new scene's entry from the cache.
pub(crate) struct SceneController<F: ArchiveFileSystem> {
    dispatcher: Rc<CommandDispatcher>,
    cache: Rc<RefCell<ArchiveCacheManager<F>>>,
    current: Option<SceneInfo>,
    entry_len: Option<usize>,
}

impl<F: ArchiveFileSystem + 'static> SceneController<F> {
    pub(crate) fn attach(
        dispatcher: &Rc<CommandDispatcher>,
        cache: &Rc<RefCell<ArchiveCacheManager<F>>>,
    ) -> Rc<RefCell<Self>> {
        let controller = Rc::new(RefCell::new(Self {
            dispatcher: Rc::clone(dispatcher),
            cache: Rc::clone(cache),
            current: None,
            entry_len: None,
        }));
        dispatcher.register::<SceneLoadCommand, _>(&controller);
        controller
    }
}

impl<F: ArchiveFileSystem> SceneController<F> {
    pub(crate) fn current_scene(&self) -> Option<&SceneInfo> {
        self.current.as_ref()
    }

    /// Size of the current scene's entry, if the scene has one.
    pub(crate) fn entry_len(&self) -> Option<usize> {
        self.entry_len
    }

    fn read_scene_entry(&self) -> Result<Option<Vec<u8>>, ArchiveError> {
        let cache = self.cache.borrow();
        let Some(path) = cache.scene_entry_path(SCENE_ENTRY_FILE) else {
            return Ok(None);
        };
        match cache.read_entry(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(ArchiveError::EntryNotFound { path }) => {
                warn!(path = %path, "scene_entry_missing");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

impl<F: ArchiveFileSystem> CommandExecutor<SceneLoadCommand> for SceneController<F> {
    fn execute(&mut self, command: &SceneLoadCommand) -> Result<(), ExecutorError> {
        let next = SceneInfo::new(&command.city_name, &command.scene_name);
        self.dispatcher.dispatch(&ScenePreLoadingNotification {
            previous: self.current.clone(),
            new: next.clone(),
        })?;

        let entry = self.read_scene_entry()?;
        self.entry_len = entry.as_ref().map(Vec::len);
        info!(
            city = %next.city_name,
            scene = %next.scene_name,
            entry_bytes = ?self.entry_len,
            "scene_entered"
        );
        self.current = Some(next);
        Ok(())
    }
}
