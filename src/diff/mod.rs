//! Diff model: parsing, the immutable change set, and review ranges.

pub mod changeset;
pub mod parser;
pub mod review;

pub use changeset::{ChangeKind, ChangeSet, FileChange, Hunk, Line, LineKind};
pub use parser::parse;
pub use review::{
    resolve_range, Checkpoint, CheckpointSession, CheckpointStore, DiffRange, DiffSource,
    FileCheckpointStore, MemoryCheckpointStore, RangeBase, ReviewMode, SeedPolicy,
};
