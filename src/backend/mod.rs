//! The pluggable backend contract and its reference implementations.
//!
//! A `Backend` receives [`IOTask`]s in FIFO order and only has to act on
//! them when [`Backend::flush`] is called — the same split the teacher
//! draws between `WriteBuffer` (accumulate) and `SegmentWriter` (commit),
//! generalized here from graph records to openPMD hierarchy nodes. This
//! module holds the trait and the ordering contract; concrete backends
//! live in the sibling `memory` and `json_fs` modules.

pub mod json_fs;
pub mod memory;

use crate::error::Result;
use crate::task::{AdvanceStatus, IOTask};

/// How thoroughly a flush should realize queued tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushLevel {
    /// Create groups/datasets/attributes but do not necessarily commit
    /// chunk payloads; used when a backend needs the skeleton present to
    /// answer a `ListDatasets` task before the caller has written data.
    SkeletonOnly,
    /// Everything queued, including chunk payloads, must be committed.
    UserFlush,
}

/// Parameters threaded through a flush call. `collective` tells a backend
/// whether this flush is happening at an MPI-collective point
/// (`begin_step`/`end_step`/`close`) where a single rank's failure must be
/// treated as a failure for all ranks at the next collective boundary —
/// the backend itself does not perform the collective communication (out
/// of scope, per `spec.md` Non-goals), it only needs to know when it would
/// be required to.
#[derive(Debug, Clone, Copy)]
pub struct FlushParams {
    pub level: FlushLevel,
    pub collective: bool,
}

impl FlushParams {
    pub fn user_flush() -> Self {
        FlushParams {
            level: FlushLevel::UserFlush,
            collective: false,
        }
    }
}

/// Contract every storage backend implements.
///
/// Ordering guarantees the frontend relies on, which flush callers
/// (`Series::flush`) must uphold and backends may assume:
///
/// 1. A `CreatePath`/`CreateDataset` for a child is never enqueued before
///    the `CreatePath` for its parent.
/// 2. `CreateDataset` for a node precedes every `WriteChunk` against it.
/// 3. Node creation precedes `WriteAttribute` calls against that node.
/// 4. A `DeletePath`/`DeleteDataset` drains (and itself executes after)
///    every previously queued task against the same node; tasks queued
///    for that node after the delete are no-ops.
/// 5. `Advance` is a happens-before barrier: every task queued before it
///    completes before any task queued after it begins.
pub trait Backend {
    /// Enqueue a task. Must not block on backend I/O; deferred to `flush`.
    fn enqueue(&mut self, task: IOTask);

    /// Execute every task enqueued since the last flush, in FIFO order.
    /// A backend may itself enqueue further tasks while flushing (e.g. a
    /// `CreateDataset` silently prepending a `CreatePath` for a group that
    /// was never explicitly created) — `flush` keeps draining until the
    /// queue is empty.
    fn flush(&mut self, params: FlushParams) -> Result<()>;

    /// Whether the most recent call to `flush` completed without error.
    /// Surfaced so a caller can distinguish "never flushed" from
    /// "flushed and failed" without re-inspecting the `Result`.
    fn last_flush_successful(&self) -> bool;

    /// How the most recently flushed `Advance` task should be interpreted
    /// by the stateful-iterator loop (`spec.md` §4.8). Neither reference
    /// backend here actually streams, so both report `RandomAccess`
    /// unconditionally; a real ADIOS2-backed implementation would instead
    /// report `Ok`/`Over` as steps are consumed.
    fn advance_status(&self) -> AdvanceStatus {
        AdvanceStatus::RandomAccess
    }

    /// The iteration indices the most recent `Advance { mode: BeginStep }`
    /// announced for the step just entered, if the backend is capable of
    /// reporting that (`spec.md` §4.8: "preferred"). `None` tells the
    /// stateful-iterator loop to fall back to one-iteration-per-step in
    /// ascending index order; neither reference backend here streams, so
    /// both use this default.
    fn announced_iterations(&self) -> Option<Vec<u64>> {
        None
    }
}
