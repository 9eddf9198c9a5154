pub mod archive;
pub mod command;
pub mod dispatch;
pub mod sequence;

pub use archive::{
    ArchiveCacheError, ArchiveCacheManager, ArchiveEntry, ArchiveError, ArchiveFileSystem,
    ArchiveLayout, DiskArchiveFileSystem, ResolvedArchive, TransitionOutcome,
};
pub use command::{
    sce_catalog, AnyCommand, ArgValue, CatalogBuilder, CatalogError, Command, CommandCatalog,
    DecodeCommand, DecodeError, OpcodeDescriptor, ParamKind,
};
pub use dispatch::{CommandDispatcher, CommandExecutor, DispatchError, ExecutorError, ExecutorId};
pub use sequence::{
    CancelSignal, DispatchStep, InteractionSequence, SequenceError, SequenceState, SequenceStep,
    StepContext, StepStatus, WaitStep, WaitUntil,
};
