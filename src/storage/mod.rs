//! Collaborator stores for autotrain.
//!
//! This module defines the behavior source, curriculum artifact store and
//! ledger store interfaces, with file-based and in-memory backends.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::{FileCurriculumStore, FileLedgerStore, JsonlBehaviorSource};
pub use memory::{MemoryBehaviorSource, MemoryCurriculumStore, MemoryLedgerStore};
pub use traits::{BehaviorSource, CurriculumStore, LedgerStore};
