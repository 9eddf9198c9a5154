use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use sce_engine::command::{
    CameraFadeInWhiteCommand, DialogueRenderTextCommand, GameState, GameStateChangeRequest,
    PlaySfxCommand, SceneOpenDoorCommand, UiDisplayCaptionCommand, UiDisplayNoteCommand,
};
use sce_engine::{CommandDispatcher, CommandExecutor, ExecutorError};
use tracing::info;

pub(crate) const MAX_TRANSCRIPT_LINES: usize = 256;

/// Stand-in for the presentation layer: every command it receives becomes a
/// transcript line and a log event.
#[derive(Debug, Default)]
pub(crate) struct ScriptConsole {
    transcript: VecDeque<String>,
    game_state: Option<GameState>,
}

impl ScriptConsole {
    pub(crate) fn attach(dispatcher: &CommandDispatcher) -> Rc<RefCell<Self>> {
        let console = Rc::new(RefCell::new(Self::default()));
        dispatcher.register::<PlaySfxCommand, _>(&console);
        dispatcher.register::<DialogueRenderTextCommand, _>(&console);
        dispatcher.register::<UiDisplayCaptionCommand, _>(&console);
        dispatcher.register::<UiDisplayNoteCommand, _>(&console);
        dispatcher.register::<SceneOpenDoorCommand, _>(&console);
        dispatcher.register::<CameraFadeInWhiteCommand, _>(&console);
        dispatcher.register::<GameStateChangeRequest, _>(&console);
        console
    }

    pub(crate) fn transcript(&self) -> impl Iterator<Item = &str> {
        self.transcript.iter().map(String::as_str)
    }

    pub(crate) fn game_state(&self) -> Option<GameState> {
        self.game_state
    }

    fn push_line(&mut self, line: String) {
        if self.transcript.len() == MAX_TRANSCRIPT_LINES {
            self.transcript.pop_front();
        }
        self.transcript.push_back(line);
    }
}

impl CommandExecutor<PlaySfxCommand> for ScriptConsole {
    fn execute(&mut self, command: &PlaySfxCommand) -> Result<(), ExecutorError> {
        info!(sfx = %command.sfx_name, loop_count = command.loop_count, "sfx_played");
        self.push_line(format!("sfx {} x{}", command.sfx_name, command.loop_count));
        Ok(())
    }
}

impl CommandExecutor<DialogueRenderTextCommand> for ScriptConsole {
    fn execute(&mut self, command: &DialogueRenderTextCommand) -> Result<(), ExecutorError> {
        info!(text = %command.dialogue_text, "dialogue_rendered");
        self.push_line(format!("dialogue: {}", command.dialogue_text));
        Ok(())
    }
}

impl CommandExecutor<UiDisplayCaptionCommand> for ScriptConsole {
    fn execute(&mut self, command: &UiDisplayCaptionCommand) -> Result<(), ExecutorError> {
        info!(
            texture = %command.texture_name,
            lines = command.number_of_lines,
            "caption_displayed"
        );
        self.push_line(format!(
            "caption {} ({} lines)",
            command.texture_name, command.number_of_lines
        ));
        Ok(())
    }
}

impl CommandExecutor<UiDisplayNoteCommand> for ScriptConsole {
    fn execute(&mut self, command: &UiDisplayNoteCommand) -> Result<(), ExecutorError> {
        info!(note = %command.note, "note_displayed");
        self.push_line(format!("note: {}", command.note));
        Ok(())
    }
}

impl CommandExecutor<SceneOpenDoorCommand> for ScriptConsole {
    fn execute(&mut self, command: &SceneOpenDoorCommand) -> Result<(), ExecutorError> {
        info!(object_id = command.object_id, "door_opened");
        self.push_line(format!("door {} opened", command.object_id));
        Ok(())
    }
}

impl CommandExecutor<CameraFadeInWhiteCommand> for ScriptConsole {
    fn execute(&mut self, _command: &CameraFadeInWhiteCommand) -> Result<(), ExecutorError> {
        info!("camera_fade_in_white");
        self.push_line("fade in from white".to_string());
        Ok(())
    }
}

impl CommandExecutor<GameStateChangeRequest> for ScriptConsole {
    fn execute(&mut self, command: &GameStateChangeRequest) -> Result<(), ExecutorError> {
        info!(state = ?command.state, "game_state_changed");
        self.game_state = Some(command.state);
        self.push_line(format!("state {:?}", command.state));
        Ok(())
    }
}
