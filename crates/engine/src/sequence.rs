use std::cell::Cell;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

use crate::command::{AnyCommand, Command};
use crate::dispatch::{CommandDispatcher, ExecutorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Idle,
    Running,
    Completed,
    Interrupted,
}

#[derive(Debug, Error)]
#[error("sequence {sequence} failed at step {step}: {source}")]
pub struct SequenceError {
    pub sequence: String,
    pub step: usize,
    #[source]
    pub source: ExecutorError,
}

pub struct StepContext<'a> {
    pub dispatcher: &'a CommandDispatcher,
    pub dt_seconds: f32,
}

pub trait SequenceStep {
    fn poll(&mut self, context: &mut StepContext<'_>) -> Result<StepStatus, ExecutorError>;

    /// Returns the step to its initial state before a restart.
    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Rc<Cell<bool>>);

impl CancelSignal {
    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }

    fn clear(&self) {
        self.0.set(false);
    }
}

/// Ordered steps driven by [`InteractionSequence::tick`].
///
/// Interruption, by the cancel signal or by a failing step, restarts the
/// sequence from scratch: every step is reset and the next
/// [`InteractionSequence::start`] begins again at the first step.
pub struct InteractionSequence {
    name: String,
    steps: Vec<Box<dyn SequenceStep>>,
    cursor: usize,
    state: SequenceState,
    cancel: CancelSignal,
}

impl InteractionSequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            cursor: 0,
            state: SequenceState::Idle,
            cancel: CancelSignal::default(),
        }
    }

    pub fn then(mut self, step: impl SequenceStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn start(&mut self) {
        self.reset_steps();
        self.cancel.clear();
        self.state = SequenceState::Running;
        debug!(sequence = %self.name, step_count = self.steps.len(), "interaction_sequence_started");
    }

    pub fn tick(
        &mut self,
        dispatcher: &CommandDispatcher,
        dt_seconds: f32,
    ) -> Result<SequenceState, SequenceError> {
        if self.state != SequenceState::Running {
            return Ok(self.state);
        }
        let mut context = StepContext {
            dispatcher,
            dt_seconds,
        };

        while self.cursor < self.steps.len() {
            if self.cancel.is_cancelled() {
                self.interrupt("cancelled");
                return Ok(self.state);
            }
            match self.steps[self.cursor].poll(&mut context) {
                Ok(StepStatus::Pending) => return Ok(self.state),
                Ok(StepStatus::Complete) => self.cursor += 1,
                Err(source) => {
                    let step = self.cursor;
                    self.interrupt("step_failed");
                    return Err(SequenceError {
                        sequence: self.name.clone(),
                        step,
                        source,
                    });
                }
            }
        }

        self.state = SequenceState::Completed;
        info!(sequence = %self.name, "interaction_sequence_completed");
        Ok(self.state)
    }

    fn interrupt(&mut self, reason: &'static str) {
        info!(sequence = %self.name, step = self.cursor, reason, "interaction_sequence_interrupted");
        self.reset_steps();
        self.state = SequenceState::Interrupted;
    }

    fn reset_steps(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
        self.cursor = 0;
    }
}

pub struct DispatchStep {
    command: Box<dyn AnyCommand>,
}

impl DispatchStep {
    pub fn new<C: Command>(command: C) -> Self {
        Self {
            command: Box::new(command),
        }
    }
}

impl SequenceStep for DispatchStep {
    fn poll(&mut self, context: &mut StepContext<'_>) -> Result<StepStatus, ExecutorError> {
        context.dispatcher.dispatch_dyn(self.command.as_ref())?;
        Ok(StepStatus::Complete)
    }
}

/// Waits for `duration_seconds` of tick time. Time left over from the tick
/// that completes the wait carries into the following steps.
pub struct WaitStep {
    duration_seconds: f32,
    elapsed_seconds: f32,
}

impl WaitStep {
    pub fn seconds(duration_seconds: f32) -> Self {
        Self {
            duration_seconds,
            elapsed_seconds: 0.0,
        }
    }
}

impl SequenceStep for WaitStep {
    fn poll(&mut self, context: &mut StepContext<'_>) -> Result<StepStatus, ExecutorError> {
        self.elapsed_seconds += context.dt_seconds;
        if self.elapsed_seconds >= self.duration_seconds {
            context.dt_seconds = self.elapsed_seconds - self.duration_seconds;
            Ok(StepStatus::Complete)
        } else {
            context.dt_seconds = 0.0;
            Ok(StepStatus::Pending)
        }
    }

    fn reset(&mut self) {
        self.elapsed_seconds = 0.0;
    }
}

pub struct WaitUntil {
    predicate: Box<dyn FnMut() -> bool>,
}

impl WaitUntil {
    pub fn new(predicate: impl FnMut() -> bool + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }
}

impl SequenceStep for WaitUntil {
    fn poll(&mut self, _context: &mut StepContext<'_>) -> Result<StepStatus, ExecutorError> {
        if (self.predicate)() {
            Ok(StepStatus::Complete)
        } else {
            Ok(StepStatus::Pending)
        }
    }
}
