use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::ScenePreLoadingNotification;
use crate::dispatch::{CommandDispatcher, CommandExecutor, ExecutorError, ExecutorId};

use super::file_system::ArchiveFileSystem;
use super::format::ArchiveError;
use super::layout::{resolve_archive, ArchiveLayout};

#[derive(Debug, Error)]
pub enum ArchiveCacheError {
    #[error("no archive for city '{city}' scene '{scene}' (resolved to {archive})")]
    ArchiveNotFound {
        city: String,
        scene: String,
        archive: String,
    },
    #[error("failed to load archive {archive} for city '{city}': {source}")]
    Load {
        city: String,
        archive: String,
        #[source]
        source: ArchiveError,
    },
    #[error("archive cache manager is disposed")]
    Disposed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The city did not change; the resident archive was left alone.
    SameCity,
    Switched {
        evicted: Option<String>,
        loaded: String,
    },
}

/// Keeps the archive of the current city resident in memory.
///
/// On every scene change to a different city the previous archive is evicted
/// first and the new one is loaded before the notification returns, so at most
/// one archive is resident at a time. City and scene names compare
/// case-insensitively.
pub struct ArchiveCacheManager<F: ArchiveFileSystem> {
    file_system: F,
    layout: ArchiveLayout,
    registration: Option<(Rc<CommandDispatcher>, ExecutorId)>,
    current_city: Option<String>,
    current_scene: Option<String>,
    resident: Option<String>,
    disposed: bool,
}

impl<F: ArchiveFileSystem> ArchiveCacheManager<F> {
    /// Unsubscribed manager, driven through [`ArchiveCacheManager::transition`].
    pub fn new(file_system: F, layout: ArchiveLayout) -> Self {
        Self {
            file_system,
            layout,
            registration: None,
            current_city: None,
            current_scene: None,
            resident: None,
            disposed: false,
        }
    }

    pub fn attach(
        file_system: F,
        layout: ArchiveLayout,
        dispatcher: &Rc<CommandDispatcher>,
    ) -> Rc<RefCell<Self>>
    where
        F: 'static,
    {
        let manager = Rc::new(RefCell::new(Self::new(file_system, layout)));
        let executor = dispatcher.register::<ScenePreLoadingNotification, _>(&manager);
        manager.borrow_mut().registration = Some((Rc::clone(dispatcher), executor));
        manager
    }

    pub fn transition(
        &mut self,
        city: &str,
        scene: &str,
    ) -> Result<TransitionOutcome, ArchiveCacheError> {
        if self.disposed {
            return Err(ArchiveCacheError::Disposed);
        }
        let new_city = city.to_lowercase();
        let new_scene = scene.to_lowercase();

        if self.current_city.as_deref() == Some(new_city.as_str()) {
            debug!(city = %new_city, scene = %new_scene, "archive_cache_same_city");
            self.current_scene = Some(new_scene);
            return Ok(TransitionOutcome::SameCity);
        }

        // Eviction is the point of no return: a failed load below leaves
        // nothing resident.
        let evicted = self.evict_current();

        let target = resolve_archive(&self.file_system, &self.layout, &new_city, &new_scene);
        let archive = target.archive_name().to_string();
        if let Err(error) = self.file_system.load_archive_into_memory(&archive) {
            warn!(
                city = %new_city,
                scene = %new_scene,
                archive = %archive,
                error = %error,
                "archive_load_failed"
            );
            return Err(match error {
                ArchiveError::NotFound { .. } => ArchiveCacheError::ArchiveNotFound {
                    city: new_city,
                    scene: new_scene,
                    archive,
                },
                source => ArchiveCacheError::Load {
                    city: new_city,
                    archive,
                    source,
                },
            });
        }

        info!(
            city = %new_city,
            scene = %new_scene,
            archive = %archive,
            evicted = ?evicted,
            "archive_cache_switched"
        );
        self.current_city = Some(new_city);
        self.current_scene = Some(new_scene);
        self.resident = Some(archive.clone());
        Ok(TransitionOutcome::Switched {
            evicted,
            loaded: archive,
        })
    }

    /// Evicts the resident archive and leaves the dispatcher. Later calls do
    /// nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        let evicted = self.evict_current();
        if let Some((dispatcher, executor)) = self.registration.take() {
            dispatcher.unregister::<ScenePreLoadingNotification>(executor);
        }
        info!(evicted = ?evicted, "archive_cache_manager_disposed");
    }

    pub fn read_entry(&self, virtual_path: &str) -> Result<Vec<u8>, ArchiveError> {
        self.file_system.read_entry(virtual_path)
    }

    /// Virtual path of `file_name` inside the current scene's folder.
    pub fn scene_entry_path(&self, file_name: &str) -> Option<String> {
        let city = self.current_city.as_deref()?;
        let scene = self.current_scene.as_deref()?;
        Some(format!(
            "{}{}{}",
            self.layout.scene_folder_path(city, scene),
            self.layout.separator,
            file_name
        ))
    }

    pub fn current_city(&self) -> Option<&str> {
        self.current_city.as_deref()
    }

    pub fn current_scene(&self) -> Option<&str> {
        self.current_scene.as_deref()
    }

    pub fn resident_archive(&self) -> Option<&str> {
        self.resident.as_deref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn file_system(&self) -> &F {
        &self.file_system
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    fn evict_current(&mut self) -> Option<String> {
        let loaded = self.resident.take();
        let city = self.current_city.take()?;
        let scene = self.current_scene.take().unwrap_or_default();

        let target = resolve_archive(&self.file_system, &self.layout, &city, &scene);
        let evicted = target.archive_name().to_string();
        if !self.file_system.dispose_in_memory_archive(&evicted) {
            warn!(city = %city, archive = %evicted, "archive_eviction_target_not_resident");
        }
        if let Some(loaded) = loaded.filter(|loaded| *loaded != evicted) {
            warn!(archive = %loaded, resolved = %evicted, "archive_evicting_stale_resident");
            self.file_system.dispose_in_memory_archive(&loaded);
        }
        info!(city = %city, archive = %evicted, "archive_evicted");
        Some(evicted)
    }
}

impl<F: ArchiveFileSystem> CommandExecutor<ScenePreLoadingNotification>
    for ArchiveCacheManager<F>
{
    fn execute(&mut self, notification: &ScenePreLoadingNotification) -> Result<(), ExecutorError> {
        self.transition(&notification.new.city_name, &notification.new.scene_name)?;
        Ok(())
    }
}

impl<F: ArchiveFileSystem> Drop for ArchiveCacheManager<F> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use tempfile::TempDir;

    use super::*;
    use crate::archive::file_system::DiskArchiveFileSystem;
    use crate::archive::format::{write_archive, ArchiveEntry};
    use crate::command::SceneInfo;
    use crate::dispatch::DispatchError;

    /// Records every load/dispose so tests can check the exact sequence.
    #[derive(Default)]
    struct FakeFileSystem {
        archives: HashSet<String>,
        segment_folders: HashMap<String, String>,
        resident: HashSet<String>,
        ops: Vec<String>,
    }

    impl FakeFileSystem {
        fn with_archives(names: &[&str]) -> Self {
            Self {
                archives: names.iter().map(|name| name.to_string()).collect(),
                ..Self::default()
            }
        }

        fn with_segment(mut self, folder: &str, container: &str) -> Self {
            self.segment_folders
                .insert(folder.to_string(), container.to_string());
            self
        }

        fn ops(&self) -> Vec<String> {
            self.ops.clone()
        }
    }

    impl ArchiveFileSystem for FakeFileSystem {
        fn segmented_archive_containing(&self, virtual_path: &str) -> Option<String> {
            self.segment_folders.get(virtual_path).cloned()
        }

        fn load_archive_into_memory(&mut self, archive_name: &str) -> Result<(), ArchiveError> {
            self.ops.push(format!("load:{archive_name}"));
            if !self.archives.contains(archive_name) {
                return Err(ArchiveError::NotFound {
                    name: archive_name.to_string(),
                });
            }
            self.resident.insert(archive_name.to_string());
            Ok(())
        }

        fn dispose_in_memory_archive(&mut self, archive_name: &str) -> bool {
            self.ops.push(format!("dispose:{archive_name}"));
            self.resident.remove(archive_name)
        }

        fn is_resident(&self, archive_name: &str) -> bool {
            self.resident.contains(archive_name)
        }

        fn entry_exists(&self, _virtual_path: &str) -> bool {
            false
        }

        fn read_entry(&self, virtual_path: &str) -> Result<Vec<u8>, ArchiveError> {
            Err(ArchiveError::EntryNotFound {
                path: virtual_path.to_string(),
            })
        }
    }

    fn manager(file_system: FakeFileSystem) -> ArchiveCacheManager<FakeFileSystem> {
        ArchiveCacheManager::new(file_system, ArchiveLayout::default())
    }

    #[test]
    fn first_transition_loads_without_evicting() {
        let mut cache = manager(FakeFileSystem::with_archives(&["citya.pak"]));
        let outcome = cache.transition("CityA", "Scene1").expect("transition");

        assert_eq!(
            outcome,
            TransitionOutcome::Switched {
                evicted: None,
                loaded: "citya.pak".to_string(),
            }
        );
        assert_eq!(cache.file_system().ops(), vec!["load:citya.pak"]);
        assert_eq!(cache.current_city(), Some("citya"));
        assert_eq!(cache.current_scene(), Some("scene1"));
    }

    #[test]
    fn same_city_scene_change_keeps_archive() {
        let mut cache = manager(FakeFileSystem::with_archives(&["citya.pak"]));
        cache.transition("cityA", "scene1").expect("first");
        let outcome = cache.transition("cityA", "scene2").expect("second");

        assert_eq!(outcome, TransitionOutcome::SameCity);
        assert_eq!(cache.file_system().ops(), vec!["load:citya.pak"]);
        assert_eq!(cache.current_scene(), Some("scene2"));
    }

    #[test]
    fn city_comparison_ignores_case() {
        let mut cache = manager(FakeFileSystem::with_archives(&["citya.pak"]));
        cache.transition("CityA", "s1").expect("first");
        let outcome = cache.transition("cityA", "s2").expect("second");

        assert_eq!(outcome, TransitionOutcome::SameCity);
        assert_eq!(cache.file_system().ops(), vec!["load:citya.pak"]);
        assert!(cache.file_system().is_resident("citya.pak"));
    }

    #[test]
    fn segmented_city_evicts_container_then_loads_whole_archive() {
        let file_system = FakeFileSystem::with_archives(&["segx.pak", "cityb.pak"])
            .with_segment("citya.pak/scene1", "segx.pak");
        let mut cache = manager(file_system);
        cache.transition("cityA", "scene1").expect("enter city a");
        let outcome = cache.transition("cityB", "scene2").expect("enter city b");

        assert_eq!(
            outcome,
            TransitionOutcome::Switched {
                evicted: Some("segx.pak".to_string()),
                loaded: "cityb.pak".to_string(),
            }
        );
        assert_eq!(
            cache.file_system().ops(),
            vec!["load:segx.pak", "dispose:segx.pak", "load:cityb.pak"]
        );
        assert!(!cache.file_system().is_resident("segx.pak"));
        assert!(cache.file_system().is_resident("cityb.pak"));
    }

    #[test]
    fn missing_archive_fails_transition_and_leaves_nothing_resident() {
        let mut cache = manager(FakeFileSystem::with_archives(&["citya.pak"]));
        cache.transition("citya", "1").expect("first");

        let error = cache.transition("Ghost", "1").expect_err("missing");
        assert!(matches!(
            error,
            ArchiveCacheError::ArchiveNotFound { ref city, ref archive, .. }
                if city == "ghost" && archive == "ghost.pak"
        ));
        assert_eq!(
            cache.file_system().ops(),
            vec!["load:citya.pak", "dispose:citya.pak", "load:ghost.pak"]
        );
        assert_eq!(cache.current_city(), None);
        assert_eq!(cache.resident_archive(), None);

        cache.transition("citya", "1").expect("recover");
        assert!(cache.file_system().is_resident("citya.pak"));
    }

    #[test]
    fn dispose_twice_evicts_once() {
        let mut cache = manager(FakeFileSystem::with_archives(&["citya.pak"]));
        cache.transition("citya", "1").expect("load");
        cache.dispose();
        cache.dispose();

        assert_eq!(
            cache.file_system().ops(),
            vec!["load:citya.pak", "dispose:citya.pak"]
        );
        assert!(cache.is_disposed());
        assert!(matches!(
            cache.transition("citya", "1"),
            Err(ArchiveCacheError::Disposed)
        ));
    }

    #[test]
    fn dispose_with_nothing_resident_is_quiet() {
        let mut cache = manager(FakeFileSystem::default());
        cache.dispose();
        assert!(cache.file_system().ops().is_empty());
    }

    fn notification(city: &str, scene: &str) -> ScenePreLoadingNotification {
        ScenePreLoadingNotification {
            previous: None,
            new: SceneInfo::new(city, scene),
        }
    }

    #[test]
    fn notifications_drive_transitions_and_stop_after_dispose() {
        let dispatcher = Rc::new(CommandDispatcher::new());
        let cache = ArchiveCacheManager::attach(
            FakeFileSystem::with_archives(&["m01.pak", "m02.pak"]),
            ArchiveLayout::default(),
            &dispatcher,
        );

        assert_eq!(dispatcher.dispatch(&notification("M01", "1")).expect("m01"), 1);
        assert_eq!(cache.borrow().resident_archive(), Some("m01.pak"));

        cache.borrow_mut().dispose();
        assert_eq!(
            dispatcher.executor_count::<ScenePreLoadingNotification>(),
            0
        );
        assert_eq!(dispatcher.dispatch(&notification("m02", "1")).expect("m02"), 0);
        assert_eq!(
            cache.borrow().file_system().ops(),
            vec!["load:m01.pak", "dispose:m01.pak"]
        );
    }

    #[test]
    fn archive_not_found_propagates_to_dispatch_caller() {
        let dispatcher = Rc::new(CommandDispatcher::new());
        let _cache = ArchiveCacheManager::attach(
            FakeFileSystem::default(),
            ArchiveLayout::default(),
            &dispatcher,
        );

        let error = dispatcher
            .dispatch(&notification("nowhere", "1"))
            .expect_err("transition must fail");
        assert!(matches!(error, DispatchError::ExecutorFailed { .. }));
        assert!(matches!(
            error.executor_error::<ArchiveCacheError>(),
            Some(ArchiveCacheError::ArchiveNotFound { .. })
        ));
    }

    #[test]
    fn dropping_attached_manager_unregisters_it() {
        let dispatcher = Rc::new(CommandDispatcher::new());
        let cache = ArchiveCacheManager::attach(
            FakeFileSystem::with_archives(&["m01.pak"]),
            ArchiveLayout::default(),
            &dispatcher,
        );
        dispatcher.dispatch(&notification("m01", "1")).expect("load");
        drop(cache);

        assert_eq!(
            dispatcher.executor_count::<ScenePreLoadingNotification>(),
            0
        );
    }

    #[test]
    fn disk_archives_stay_resident_for_current_city_only() {
        let temp = TempDir::new().expect("temp");
        write_archive(
            &temp.path().join("m01.pak"),
            false,
            &[ArchiveEntry::new("1/scene.bin", b"m01 scene 1".to_vec())],
        )
        .expect("m01");
        write_archive(
            &temp.path().join("seg.pak"),
            true,
            &[
                ArchiveEntry::new("q01.pak/a/scene.bin", b"q01 scene a".to_vec()),
                ArchiveEntry::new("q02.pak/a/scene.bin", b"q02 scene a".to_vec()),
            ],
        )
        .expect("segmented");
        let layout = ArchiveLayout::default();
        let file_system = DiskArchiveFileSystem::mount(temp.path(), &layout).expect("mount");
        let mut cache = ArchiveCacheManager::new(file_system, layout);

        cache.transition("M01", "1").expect("m01");
        assert_eq!(cache.file_system().resident_archive_names(), vec!["m01.pak"]);
        let path = cache.scene_entry_path("scene.bin").expect("scene path");
        assert_eq!(path, "m01.pak/1/scene.bin");
        assert_eq!(cache.read_entry(&path).expect("read"), b"m01 scene 1");

        cache.transition("q01", "A").expect("q01");
        assert_eq!(cache.file_system().resident_archive_names(), vec!["seg.pak"]);
        let path = cache.scene_entry_path("scene.bin").expect("scene path");
        assert_eq!(cache.read_entry(&path).expect("read"), b"q01 scene a");

        cache.transition("q02", "a").expect("q02");
        assert_eq!(cache.file_system().resident_archive_names(), vec!["seg.pak"]);

        cache.dispose();
        assert!(cache.file_system().resident_archive_names().is_empty());
    }
}
