use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::rc::{Rc, Weak};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::command::{AnyCommand, Command};

pub type ExecutorError = Box<dyn StdError + Send + Sync + 'static>;

/// Receives every dispatched command of type `C` while registered.
pub trait CommandExecutor<C: Command> {
    fn execute(&mut self, command: &C) -> Result<(), ExecutorError>;
}

/// Identity of a registered handler, derived from its shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutorId(usize);

impl ExecutorId {
    pub fn of<H>(handler: &Rc<RefCell<H>>) -> Self {
        Self(Rc::as_ptr(handler) as *const () as usize)
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("executor #{position} for {command} failed: {source}")]
    ExecutorFailed {
        command: &'static str,
        position: usize,
        #[source]
        source: ExecutorError,
    },
    #[error("executor #{position} for {command} is already executing (re-entrant dispatch)")]
    ExecutorBusy {
        command: &'static str,
        position: usize,
    },
}

impl DispatchError {
    /// Finds the first executor failure of type `E`, looking through failures of
    /// nested dispatches made from inside an executor.
    pub fn executor_error<E: StdError + 'static>(&self) -> Option<&E> {
        let DispatchError::ExecutorFailed { source, .. } = self else {
            return None;
        };
        if let Some(found) = source.downcast_ref::<E>() {
            return Some(found);
        }
        source
            .downcast_ref::<DispatchError>()
            .and_then(|nested| nested.executor_error::<E>())
    }
}

enum Delivery {
    Delivered,
    Skipped,
    HandlerDropped,
    Busy,
    Failed(ExecutorError),
}

type InvokeFn = dyn Fn(&dyn Any) -> Delivery;

#[derive(Clone)]
struct Registration {
    executor: ExecutorId,
    active: Rc<Cell<bool>>,
    invoke: Rc<InvokeFn>,
}

/// Publish/subscribe bus keyed by a command's concrete runtime type.
///
/// Delivery order is registration order. A dispatch works on a snapshot of the
/// registrations taken when it starts: executors registered during the dispatch
/// are not called, executors unregistered before their turn are skipped.
///
/// Failure policy is fail-fast: the first executor error stops the dispatch and
/// is returned to the caller; executors after it are not called for that
/// command. The registry itself is left untouched by a failure.
#[derive(Default)]
pub struct CommandDispatcher {
    registrations: RefCell<HashMap<TypeId, Vec<Registration>>>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `C`. Registering the same pair again is a no-op.
    pub fn register<C, H>(&self, handler: &Rc<RefCell<H>>) -> ExecutorId
    where
        C: Command,
        H: CommandExecutor<C> + 'static,
    {
        let executor = ExecutorId::of(handler);
        let mut registrations = self.registrations.borrow_mut();
        let list = registrations.entry(TypeId::of::<C>()).or_default();
        if list.iter().any(|registration| registration.executor == executor) {
            return executor;
        }

        let weak = Rc::downgrade(handler);
        list.push(Registration {
            executor,
            active: Rc::new(Cell::new(true)),
            invoke: Rc::new(move |command: &dyn Any| invoke_executor::<C, H>(&weak, command)),
        });
        trace!(
            command = crate::command::short_type_name::<C>(),
            executor_count = list.len(),
            "command_executor_registered"
        );
        executor
    }

    /// Removes the (`executor`, `C`) pair. Returns false if it was not registered.
    pub fn unregister<C: Command>(&self, executor: ExecutorId) -> bool {
        self.remove(TypeId::of::<C>(), executor)
    }

    pub fn unregister_all(&self, executor: ExecutorId) -> usize {
        let mut removed = 0usize;
        let mut registrations = self.registrations.borrow_mut();
        for list in registrations.values_mut() {
            list.retain(|registration| {
                if registration.executor == executor {
                    registration.active.set(false);
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        registrations.retain(|_, list| !list.is_empty());
        removed
    }

    pub fn is_registered<C: Command>(&self, executor: ExecutorId) -> bool {
        self.registrations
            .borrow()
            .get(&TypeId::of::<C>())
            .is_some_and(|list| list.iter().any(|registration| registration.executor == executor))
    }

    pub fn executor_count<C: Command>(&self) -> usize {
        self.registrations
            .borrow()
            .get(&TypeId::of::<C>())
            .map_or(0, Vec::len)
    }

    /// Delivers `command` to every executor registered for its type and returns
    /// how many received it.
    pub fn dispatch<C: Command>(&self, command: &C) -> Result<usize, DispatchError> {
        self.dispatch_dyn(command)
    }

    pub fn dispatch_dyn(&self, command: &dyn AnyCommand) -> Result<usize, DispatchError> {
        let payload = command.as_any();
        let key = (*payload).type_id();
        let name = command.command_name();

        let snapshot = match self.registrations.borrow().get(&key) {
            Some(list) => list.clone(),
            None => Vec::new(),
        };
        if snapshot.is_empty() {
            trace!(command = name, "command_dispatched_without_executors");
            return Ok(0);
        }

        let mut delivered = 0usize;
        let mut dropped = Vec::new();
        for (position, registration) in snapshot.iter().enumerate() {
            if !registration.active.get() {
                continue;
            }
            match (registration.invoke)(payload) {
                Delivery::Delivered => delivered += 1,
                Delivery::Skipped => {}
                Delivery::HandlerDropped => dropped.push(registration.executor),
                Delivery::Busy => {
                    self.prune(key, &dropped);
                    warn!(command = name, position, "command_executor_busy");
                    return Err(DispatchError::ExecutorBusy {
                        command: name,
                        position,
                    });
                }
                Delivery::Failed(source) => {
                    self.prune(key, &dropped);
                    warn!(command = name, position, error = %source, "command_executor_failed");
                    return Err(DispatchError::ExecutorFailed {
                        command: name,
                        position,
                        source,
                    });
                }
            }
        }

        self.prune(key, &dropped);
        trace!(command = name, delivered, "command_dispatched");
        Ok(delivered)
    }

    fn remove(&self, key: TypeId, executor: ExecutorId) -> bool {
        let mut registrations = self.registrations.borrow_mut();
        let Some(list) = registrations.get_mut(&key) else {
            return false;
        };
        let Some(index) = list
            .iter()
            .position(|registration| registration.executor == executor)
        else {
            return false;
        };

        let registration = list.remove(index);
        registration.active.set(false);
        if list.is_empty() {
            registrations.remove(&key);
        }
        true
    }

    fn prune(&self, key: TypeId, dropped: &[ExecutorId]) {
        for executor in dropped {
            if self.remove(key, *executor) {
                debug!(?executor, "command_executor_pruned_after_drop");
            }
        }
    }
}

fn invoke_executor<C, H>(handler: &Weak<RefCell<H>>, command: &dyn Any) -> Delivery
where
    C: Command,
    H: CommandExecutor<C>,
{
    let Some(handler) = handler.upgrade() else {
        return Delivery::HandlerDropped;
    };
    let Some(command) = command.downcast_ref::<C>() else {
        return Delivery::Skipped;
    };
    let Ok(mut executor) = handler.try_borrow_mut() else {
        return Delivery::Busy;
    };
    match executor.execute(command) {
        Ok(()) => Delivery::Delivered,
        Err(error) => Delivery::Failed(error),
    }
}
