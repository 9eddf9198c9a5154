mod catalog;
mod internal;
mod sce_commands;
mod value;

use std::any::Any;
use std::fmt;

pub use catalog::{CatalogBuilder, CatalogError, CommandCatalog, DecodeError, OpcodeDescriptor};
pub use internal::{
    GameState, GameStateChangeRequest, SceneInfo, ScenePreLoadingNotification,
    UiDisplayNoteCommand,
};
pub use sce_commands::{
    sce_catalog, CameraFadeInWhiteCommand, DialogueRenderTextCommand, PlaySfxCommand,
    SceneLoadCommand, SceneOpenDoorCommand, UiDisplayCaptionCommand,
};
pub use value::{ArgCursor, ArgValue, ParamKind};

/// A value that can travel on the command bus.
///
/// Commands are immutable data holders; behavior lives in the executors that
/// receive them.
pub trait Command: fmt::Debug + 'static {}

/// Type-erased view of a [`Command`], used for decoded instances whose concrete
/// type is only known at runtime.
pub trait AnyCommand: fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn command_name(&self) -> &'static str;
}

impl<T: Command> AnyCommand for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn command_name(&self) -> &'static str {
        short_type_name::<T>()
    }
}

/// A command that can be decoded from a script opcode's raw arguments.
///
/// The opcode and description are not part of the type; they are supplied when
/// the type is registered into a [`CatalogBuilder`].
pub trait DecodeCommand: Command + Sized {
    const PARAMS: &'static [ParamKind];

    fn decode(args: &mut ArgCursor<'_>) -> Result<Self, DecodeError>;
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
