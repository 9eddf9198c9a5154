use sce_engine::{DispatchError, SequenceError, SequenceState};
use thiserror::Error;
use tracing::{info, warn};

use super::bootstrap::RunnerWiring;
use super::objects::{GravitySwitchObject, SceneSfxObject, SwitchResponse};
use super::script::{RunScript, ScriptObject};

const MAX_SEQUENCE_TICKS: usize = 10_000;

#[derive(Debug, Error)]
pub(crate) enum RunError {
    #[error("instruction {index} (opcode {opcode}) failed: {source}")]
    Dispatch {
        index: usize,
        opcode: u32,
        #[source]
        source: DispatchError,
    },
    #[error("scene object {index} failed: {source}")]
    Object {
        index: usize,
        #[source]
        source: DispatchError,
    },
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error("sequence of scene object {index} still running after {ticks} ticks")]
    SequenceStalled { index: usize, ticks: usize },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) dispatched: usize,
    pub(crate) skipped: usize,
    pub(crate) unhandled: usize,
}

/// Decodes and dispatches every instruction in order, then exercises the
/// script's scene objects. Undecodable instructions are skipped; the first
/// dispatch failure ends the run.
pub(crate) fn execute_script(
    wiring: &RunnerWiring,
    script: &RunScript,
) -> Result<RunSummary, RunError> {
    let mut summary = RunSummary::default();

    for (index, instruction) in script.instructions.iter().enumerate() {
        let command = match wiring.catalog.decode(instruction.opcode, &instruction.args) {
            Ok(command) => command,
            Err(error) => {
                warn!(index, opcode = instruction.opcode, error = %error, "instruction_skipped");
                summary.skipped += 1;
                continue;
            }
        };
        let delivered = wiring
            .dispatcher
            .dispatch_dyn(command.as_ref())
            .map_err(|source| RunError::Dispatch {
                index,
                opcode: instruction.opcode,
                source,
            })?;
        if delivered == 0 {
            warn!(index, command = command.command_name(), "instruction_unhandled");
            summary.unhandled += 1;
        }
        summary.dispatched += 1;
    }

    for (index, object) in script.objects.iter().enumerate() {
        match object {
            ScriptObject::SceneSfx { sfx_name } => {
                SceneSfxObject::new(sfx_name.as_str())
                    .activate(&wiring.dispatcher)
                    .map_err(|source| RunError::Object { index, source })?;
            }
            ScriptObject::GravitySwitch {
                required_headcount,
                times,
            } => {
                let mut switch = GravitySwitchObject::new(*required_headcount, *times);
                let response = switch
                    .on_player_entered(script.team_size, &wiring.dispatcher)
                    .map_err(|source| RunError::Object { index, source })?;
                if response == SwitchResponse::Triggered {
                    drive_to_end(&mut switch, wiring, script.tick_seconds, index)?;
                }
            }
        }
    }

    info!(
        dispatched = summary.dispatched,
        skipped = summary.skipped,
        unhandled = summary.unhandled,
        "script_finished"
    );
    Ok(summary)
}

fn drive_to_end(
    switch: &mut GravitySwitchObject,
    wiring: &RunnerWiring,
    tick_seconds: f32,
    index: usize,
) -> Result<(), RunError> {
    for _ in 0..MAX_SEQUENCE_TICKS {
        if switch.tick(&wiring.dispatcher, tick_seconds)? != SequenceState::Running {
            return Ok(());
        }
    }
    switch.cancel_signal().cancel();
    switch.tick(&wiring.dispatcher, 0.0)?;
    Err(RunError::SequenceStalled {
        index,
        ticks: MAX_SEQUENCE_TICKS,
    })
}
