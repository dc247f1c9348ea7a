#![warn(missing_docs)]

//! Sandboxed workspace store for scriptoria
//!
//! Confines every client path to a single workspace root and provides
//! atomic file operations, regex-driven edits, append-only versioned
//! documents and ordered inter-agent message logs on top of it.

pub mod error;
pub mod fsutil;
pub mod guard;
pub mod hooks;
pub mod locks;
pub mod messages;
pub mod models;
pub mod pattern;
mod sequence;
pub mod store;
pub mod verifier;
pub mod versions;
pub mod workspace;
pub mod writer;

// Re-export public API
pub use error::FileError;
pub use guard::{PathGuard, WorkspacePath};
pub use hooks::{HookSet, WriteHook};
pub use locks::LockRegistry;
pub use messages::MessageLog;
pub use models::{
    ConflictResolution, EntryInfo, FileEntry, Message, OperationType, PatternEdit,
    PatternOptions, VersionInfo, VersionRecord, WriteEvent,
};
pub use pattern::PatternEditor;
pub use store::WorkspaceStore;
pub use verifier::ContentVerifier;
pub use versions::DocVersioner;
pub use workspace::Workspace;
pub use writer::{SafeWriter, StagedWrite};
