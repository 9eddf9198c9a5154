use sce_engine::command::{GameState, GameStateChangeRequest, PlaySfxCommand, UiDisplayNoteCommand};
use sce_engine::{
    CancelSignal, CommandDispatcher, DispatchError, DispatchStep, InteractionSequence,
    SequenceError, SequenceState, WaitStep,
};
use tracing::{debug, info};

const SWITCH_PRESS_SECONDS: f32 = 1.0;
const SWITCH_DESCEND_SECONDS: f32 = 2.5;
const SWITCH_PRESS_SFX: &str = "we026";
const SWITCH_DESCEND_SFX: &str = "wg005";
const NOT_HEAVY_ENOUGH_NOTE: &str = "Not heavy enough to activate";

/// Ambient sound emitter: starts its looping effect when the scene activates it.
#[derive(Debug, Clone)]
pub(crate) struct SceneSfxObject {
    sfx_name: String,
}

impl SceneSfxObject {
    pub(crate) fn new(sfx_name: impl Into<String>) -> Self {
        Self {
            sfx_name: sfx_name.into(),
        }
    }

    pub(crate) fn activate(&self, dispatcher: &CommandDispatcher) -> Result<usize, DispatchError> {
        debug!(sfx = %self.sfx_name, "scene_sfx_activated");
        dispatcher.dispatch(&PlaySfxCommand {
            sfx_name: self.sfx_name.clone(),
            loop_count: 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwitchResponse {
    Triggered,
    TooLight,
    Exhausted,
}

/// Floor plate that sinks once enough of the team stands on it.
///
/// A trigger puts the game into a cutscene and runs the press sequence; the
/// sequence hands control back to gameplay when the plate has descended.
pub(crate) struct GravitySwitchObject {
    required_headcount: usize,
    remaining_times: u32,
    sequence: InteractionSequence,
}

impl GravitySwitchObject {
    pub(crate) fn new(required_headcount: usize, times: u32) -> Self {
        let sequence = InteractionSequence::new("gravity_switch")
            .then(DispatchStep::new(PlaySfxCommand {
                sfx_name: SWITCH_PRESS_SFX.to_string(),
                loop_count: 1,
            }))
            .then(WaitStep::seconds(SWITCH_PRESS_SECONDS))
            .then(DispatchStep::new(PlaySfxCommand {
                sfx_name: SWITCH_DESCEND_SFX.to_string(),
                loop_count: 1,
            }))
            .then(WaitStep::seconds(SWITCH_DESCEND_SECONDS))
            .then(DispatchStep::new(GameStateChangeRequest {
                state: GameState::Gameplay,
            }));
        Self {
            required_headcount,
            remaining_times: times,
            sequence,
        }
    }

    pub(crate) fn on_player_entered(
        &mut self,
        team_size: usize,
        dispatcher: &CommandDispatcher,
    ) -> Result<SwitchResponse, DispatchError> {
        if team_size < self.required_headcount {
            if self.remaining_times > 0 {
                dispatcher.dispatch(&UiDisplayNoteCommand {
                    note: NOT_HEAVY_ENOUGH_NOTE.to_string(),
                })?;
            }
            return Ok(SwitchResponse::TooLight);
        }
        if self.remaining_times == 0 {
            return Ok(SwitchResponse::Exhausted);
        }

        self.remaining_times -= 1;
        dispatcher.dispatch(&GameStateChangeRequest {
            state: GameState::Cutscene,
        })?;
        self.sequence.start();
        info!(
            team_size,
            remaining_times = self.remaining_times,
            "gravity_switch_triggered"
        );
        Ok(SwitchResponse::Triggered)
    }

    pub(crate) fn tick(
        &mut self,
        dispatcher: &CommandDispatcher,
        dt_seconds: f32,
    ) -> Result<SequenceState, SequenceError> {
        self.sequence.tick(dispatcher, dt_seconds)
    }

    pub(crate) fn state(&self) -> SequenceState {
        self.sequence.state()
    }

    pub(crate) fn cancel_signal(&self) -> CancelSignal {
        self.sequence.cancel_signal()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::app::console::ScriptConsole;

    #[test]
    fn sfx_object_loops_its_effect() {
        let dispatcher = CommandDispatcher::new();
        let console = ScriptConsole::attach(&dispatcher);

        let delivered = SceneSfxObject::new("wind")
            .activate(&dispatcher)
            .expect("activate");
        assert_eq!(delivered, 1);
        assert_eq!(console.borrow().transcript().collect::<Vec<_>>(), vec!["sfx wind x0"]);
    }

    fn run_to_end(switch: &mut GravitySwitchObject, dispatcher: &CommandDispatcher) {
        for _ in 0..32 {
            if switch.tick(dispatcher, 0.5).expect("tick") != SequenceState::Running {
                return;
            }
        }
    }

    #[test]
    fn triggered_switch_plays_cutscene_and_returns_control() {
        let dispatcher = CommandDispatcher::new();
        let console: Rc<RefCell<ScriptConsole>> = ScriptConsole::attach(&dispatcher);
        let mut switch = GravitySwitchObject::new(2, 1);

        let response = switch.on_player_entered(3, &dispatcher).expect("enter");
        assert_eq!(response, SwitchResponse::Triggered);
        assert_eq!(console.borrow().game_state(), Some(GameState::Cutscene));

        run_to_end(&mut switch, &dispatcher);
        assert_eq!(switch.state(), SequenceState::Completed);
        assert_eq!(
            console.borrow().transcript().collect::<Vec<_>>(),
            vec!["state Cutscene", "sfx we026 x1", "sfx wg005 x1", "state Gameplay"]
        );

        let again = switch.on_player_entered(3, &dispatcher).expect("re-enter");
        assert_eq!(again, SwitchResponse::Exhausted);
    }

    #[test]
    fn switch_cutscene_spans_both_waits_without_losing_tick_time() {
        let dispatcher = CommandDispatcher::new();
        let console = ScriptConsole::attach(&dispatcher);
        let mut switch = GravitySwitchObject::new(1, 1);
        switch.on_player_entered(1, &dispatcher).expect("enter");

        let mut ticks = 0;
        while switch.tick(&dispatcher, 0.5).expect("tick") == SequenceState::Running {
            ticks += 1;
            assert!(ticks < 32, "cutscene never finished");
        }
        assert_eq!(ticks + 1, 7);
        assert_eq!(console.borrow().game_state(), Some(GameState::Gameplay));
    }

    #[test]
    fn light_team_gets_a_note_only_while_usable() {
        let dispatcher = CommandDispatcher::new();
        let console = ScriptConsole::attach(&dispatcher);
        let mut switch = GravitySwitchObject::new(3, 1);

        assert_eq!(
            switch.on_player_entered(1, &dispatcher).expect("enter"),
            SwitchResponse::TooLight
        );
        assert_eq!(
            console.borrow().transcript().collect::<Vec<_>>(),
            vec![format!("note: {NOT_HEAVY_ENOUGH_NOTE}")]
        );

        let mut spent = GravitySwitchObject::new(3, 0);
        spent.on_player_entered(1, &dispatcher).expect("enter spent");
        assert_eq!(console.borrow().transcript().count(), 1);
    }

    #[test]
    fn cancelled_switch_restarts_from_the_press() {
        let dispatcher = CommandDispatcher::new();
        let console = ScriptConsole::attach(&dispatcher);
        let mut switch = GravitySwitchObject::new(1, 2);

        switch.on_player_entered(1, &dispatcher).expect("enter");
        switch.tick(&dispatcher, 0.5).expect("press");
        switch.cancel_signal().cancel();
        assert_eq!(
            switch.tick(&dispatcher, 0.5).expect("cancel"),
            SequenceState::Interrupted
        );

        switch.on_player_entered(1, &dispatcher).expect("enter again");
        run_to_end(&mut switch, &dispatcher);
        let presses = console
            .borrow()
            .transcript()
            .filter(|line| *line == "sfx we026 x1")
            .count();
        assert_eq!(presses, 2);
    }
}
