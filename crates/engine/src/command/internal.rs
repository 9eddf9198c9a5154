use super::Command;

/// A (city, scene) pair as named by the scene data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneInfo {
    pub city_name: String,
    pub scene_name: String,
}

impl SceneInfo {
    pub fn new(city_name: impl Into<String>, scene_name: impl Into<String>) -> Self {
        Self {
            city_name: city_name.into(),
            scene_name: scene_name.into(),
        }
    }
}

/// Sent once per scene change, before the new scene is entered.
///
/// Executors may rely on every earlier executor having finished with the
/// notification, so archive residency is settled before scene loading reads data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenePreLoadingNotification {
    pub previous: Option<SceneInfo>,
    pub new: SceneInfo,
}

impl Command for ScenePreLoadingNotification {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Gameplay,
    Cutscene,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameStateChangeRequest {
    pub state: GameState,
}

impl Command for GameStateChangeRequest {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiDisplayNoteCommand {
    pub note: String,
}

impl Command for UiDisplayNoteCommand {}
