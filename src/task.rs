//! Deferred I/O operations and the buffers they carry.
//!
//! Grounded on `original_source/include/openPMD/Chunk.hpp` for
//! [`ChunkInfo`]/[`WrittenChunkInfo`], and on the task-queue design
//! described for the abstract backend handler: every mutation to the
//! hierarchy is recorded as an [`IOTask`] rather than performed
//! immediately, and only executed when [`crate::series::Series::flush`]
//! walks the dirty subtree. The teacher's own deferred-write-then-flush
//! split (`storage_v2::write_buffer` buffering mutations ahead of an
//! explicit flush to a segment writer) is the same shape applied here to
//! hierarchy metadata and chunk payloads instead of graph records.
//!
//! Every task carries both the [`WritableId`] of the node it concerns
//! (useful for in-process bookkeeping and logging) and that node's
//! slash-joined path at enqueue time, since backends address nodes by
//! path rather than by the frontend's arena index.

use std::sync::Arc;

use crate::attribute::Attribute;
use crate::datatype::Datatype;
use crate::writable::WritableId;

/// Origin/size of a chunk within a dataset's extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub offset: Vec<u64>,
    pub extent: Vec<u64>,
}

/// A [`ChunkInfo`] annotated with the MPI rank that produced it, as
/// returned by `RecordComponent::available_chunks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenChunkInfo {
    pub offset: Vec<u64>,
    pub extent: Vec<u64>,
    pub source_rank: u32,
}

pub type ChunkTable = Vec<WrittenChunkInfo>;

/// Ownership of a chunk payload being written. Mirrors the four
/// `storeChunk` overloads of the original (shared pointer, unique pointer
/// with custom deleter, raw non-owning pointer, owned contiguous buffer)
/// collapsed onto what Rust ownership already expresses naturally: either
/// the caller keeps its own data and the task borrows a reference-counted
/// copy, or the task takes outright ownership of a buffer built to be
/// handed over.
#[derive(Debug, Clone)]
pub enum ChunkBuffer {
    /// Reference-counted, so the same payload can be handed to multiple
    /// concurrently-queued backends sharing one `Series` (MPI ranks with
    /// a shared in-process buffer).
    Shared(Arc<[u8]>),
    /// A buffer the queue now owns outright, e.g. one built expressly to
    /// be moved via `store_chunk_span`.
    Owned(Vec<u8>),
}

impl ChunkBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ChunkBuffer::Shared(b) => b,
            ChunkBuffer::Owned(b) => b,
        }
    }
}

/// What [`IOTask::Advance`] is asking the backend to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceMode {
    BeginStep,
    EndStep,
}

/// Result of an [`AdvanceMode`] request, surfaced back up to the
/// `Iteration`/stateful-iterator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceStatus {
    /// The step exists and standard operations may proceed.
    Ok,
    /// The backend cannot stream and random access must be used instead.
    RandomAccess,
    /// No further steps are available.
    Over,
}

/// A single deferred operation against the hierarchy. Enqueued onto a
/// [`crate::backend::Backend`]'s FIFO and executed in order during flush.
///
/// Attribute and chunk payloads are carried inline since they must
/// reflect the value at enqueue time, not at flush time (the frontend
/// object may already have moved on to a new value by the time flush
/// runs).
#[derive(Debug, Clone)]
pub enum IOTask {
    CreatePath {
        node: WritableId,
        path: String,
    },
    CreateDataset {
        node: WritableId,
        path: String,
        extent: Vec<u64>,
        datatype: Datatype,
    },
    OpenPath {
        node: WritableId,
        path: String,
    },
    OpenDataset {
        node: WritableId,
        path: String,
        /// Datatype and extent the backend finds at `path`, if it exists
        /// as a dataset. Populated during `flush`; read back afterwards by
        /// a reparsing `Series::open`, which has no other way to learn a
        /// rediscovered component's shape before the first `load_chunk`.
        into: Arc<std::sync::Mutex<Option<(Datatype, Vec<u64>)>>>,
    },
    OpenFile {
        node: WritableId,
        path: String,
    },
    CloseFile {
        node: WritableId,
        path: String,
    },
    DeletePath {
        node: WritableId,
        path: String,
    },
    DeleteDataset {
        node: WritableId,
        path: String,
    },
    WriteAttribute {
        node: WritableId,
        path: String,
        name: String,
        value: Attribute,
    },
    ReadAttribute {
        node: WritableId,
        path: String,
        name: String,
        /// Where the backend deposits the value, if present. Populated
        /// during `flush`; read back by the caller afterwards.
        into: Arc<std::sync::Mutex<Option<Attribute>>>,
    },
    ListPaths {
        node: WritableId,
        path: String,
        into: Arc<std::sync::Mutex<Vec<String>>>,
    },
    ListDatasets {
        node: WritableId,
        path: String,
        into: Arc<std::sync::Mutex<Vec<String>>>,
    },
    ListAttributes {
        node: WritableId,
        path: String,
        into: Arc<std::sync::Mutex<Vec<String>>>,
    },
    WriteChunk {
        node: WritableId,
        path: String,
        offset: Vec<u64>,
        extent: Vec<u64>,
        datatype: Datatype,
        data: ChunkBuffer,
    },
    ReadChunk {
        node: WritableId,
        path: String,
        offset: Vec<u64>,
        extent: Vec<u64>,
        datatype: Datatype,
        /// Where the backend should write the decoded bytes; owned by the
        /// caller, kept alive across the flush by the task itself.
        into: Arc<std::sync::Mutex<Vec<u8>>>,
    },
    GetBufferView {
        node: WritableId,
        path: String,
        offset: Vec<u64>,
        extent: Vec<u64>,
        datatype: Datatype,
    },
    Advance {
        node: WritableId,
        path: String,
        mode: AdvanceMode,
    },
}

impl IOTask {
    pub fn node(&self) -> WritableId {
        match self {
            IOTask::CreatePath { node, .. }
            | IOTask::CreateDataset { node, .. }
            | IOTask::OpenPath { node, .. }
            | IOTask::OpenDataset { node, .. }
            | IOTask::OpenFile { node, .. }
            | IOTask::CloseFile { node, .. }
            | IOTask::DeletePath { node, .. }
            | IOTask::DeleteDataset { node, .. }
            | IOTask::WriteAttribute { node, .. }
            | IOTask::ReadAttribute { node, .. }
            | IOTask::ListPaths { node, .. }
            | IOTask::ListDatasets { node, .. }
            | IOTask::ListAttributes { node, .. }
            | IOTask::WriteChunk { node, .. }
            | IOTask::ReadChunk { node, .. }
            | IOTask::GetBufferView { node, .. }
            | IOTask::Advance { node, .. } => *node,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            IOTask::CreatePath { path, .. }
            | IOTask::CreateDataset { path, .. }
            | IOTask::OpenPath { path, .. }
            | IOTask::OpenDataset { path, .. }
            | IOTask::OpenFile { path, .. }
            | IOTask::CloseFile { path, .. }
            | IOTask::DeletePath { path, .. }
            | IOTask::DeleteDataset { path, .. }
            | IOTask::WriteAttribute { path, .. }
            | IOTask::ReadAttribute { path, .. }
            | IOTask::ListPaths { path, .. }
            | IOTask::ListDatasets { path, .. }
            | IOTask::ListAttributes { path, .. }
            | IOTask::WriteChunk { path, .. }
            | IOTask::ReadChunk { path, .. }
            | IOTask::GetBufferView { path, .. }
            | IOTask::Advance { path, .. } => path,
        }
    }

    /// Short tag for logging, matching the teacher's preference for a
    /// `%s` operation name over `{:?}`-dumping a whole payload.
    pub fn kind_name(&self) -> &'static str {
        match self {
            IOTask::CreatePath { .. } => "CreatePath",
            IOTask::CreateDataset { .. } => "CreateDataset",
            IOTask::OpenPath { .. } => "OpenPath",
            IOTask::OpenDataset { .. } => "OpenDataset",
            IOTask::OpenFile { .. } => "OpenFile",
            IOTask::CloseFile { .. } => "CloseFile",
            IOTask::DeletePath { .. } => "DeletePath",
            IOTask::DeleteDataset { .. } => "DeleteDataset",
            IOTask::WriteAttribute { .. } => "WriteAttribute",
            IOTask::ReadAttribute { .. } => "ReadAttribute",
            IOTask::ListPaths { .. } => "ListPaths",
            IOTask::ListDatasets { .. } => "ListDatasets",
            IOTask::ListAttributes { .. } => "ListAttributes",
            IOTask::WriteChunk { .. } => "WriteChunk",
            IOTask::ReadChunk { .. } => "ReadChunk",
            IOTask::GetBufferView { .. } => "GetBufferView",
            IOTask::Advance { .. } => "Advance",
        }
    }

    /// Rebuild this task with a different `path`, keeping every other field.
    /// Used by the flush engine to translate a node's logical openPMD path
    /// (fixed at enqueue time, into the component's own pending-chunk FIFO)
    /// into the physical path a specific backend addresses once the
    /// iteration encoding's file/group layout is known.
    pub fn with_path(self, path: String) -> Self {
        match self {
            IOTask::CreatePath { node, .. } => IOTask::CreatePath { node, path },
            IOTask::CreateDataset {
                node,
                extent,
                datatype,
                ..
            } => IOTask::CreateDataset {
                node,
                path,
                extent,
                datatype,
            },
            IOTask::OpenPath { node, .. } => IOTask::OpenPath { node, path },
            IOTask::OpenDataset { node, into, .. } => IOTask::OpenDataset { node, path, into },
            IOTask::OpenFile { node, .. } => IOTask::OpenFile { node, path },
            IOTask::CloseFile { node, .. } => IOTask::CloseFile { node, path },
            IOTask::DeletePath { node, .. } => IOTask::DeletePath { node, path },
            IOTask::DeleteDataset { node, .. } => IOTask::DeleteDataset { node, path },
            IOTask::WriteAttribute { node, name, value, .. } => IOTask::WriteAttribute {
                node,
                path,
                name,
                value,
            },
            IOTask::ReadAttribute { node, name, into, .. } => IOTask::ReadAttribute {
                node,
                path,
                name,
                into,
            },
            IOTask::ListPaths { node, into, .. } => IOTask::ListPaths { node, path, into },
            IOTask::ListDatasets { node, into, .. } => IOTask::ListDatasets { node, path, into },
            IOTask::ListAttributes { node, into, .. } => IOTask::ListAttributes { node, path, into },
            IOTask::WriteChunk {
                node,
                offset,
                extent,
                datatype,
                data,
                ..
            } => IOTask::WriteChunk {
                node,
                path,
                offset,
                extent,
                datatype,
                data,
            },
            IOTask::ReadChunk {
                node,
                offset,
                extent,
                datatype,
                into,
                ..
            } => IOTask::ReadChunk {
                node,
                path,
                offset,
                extent,
                datatype,
                into,
            },
            IOTask::GetBufferView {
                node,
                offset,
                extent,
                datatype,
                ..
            } => IOTask::GetBufferView {
                node,
                path,
                offset,
                extent,
                datatype,
            },
            IOTask::Advance { node, mode, .. } => IOTask::Advance { node, path, mode },
        }
    }

    /// Whether this task targets the same node a prior `DeletePath`/
    /// `DeleteDataset` removed, per ordering guarantee 4: such tasks are
    /// no-ops and the flush engine skips them rather than handing them to
    /// the backend.
    pub fn is_delete(&self) -> bool {
        matches!(self, IOTask::DeletePath { .. } | IOTask::DeleteDataset { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_and_path_extract_for_every_variant() {
        let id = WritableId::ROOT;
        let tasks = vec![
            IOTask::CreatePath {
                node: id,
                path: "/data/0".into(),
            },
            IOTask::WriteAttribute {
                node: id,
                path: "/data/0".into(),
                name: "unitSI".into(),
                value: Attribute::new(1.0f64),
            },
            IOTask::Advance {
                node: id,
                path: "/".into(),
                mode: AdvanceMode::BeginStep,
            },
        ];
        for t in tasks {
            assert_eq!(t.node(), id);
            assert!(!t.path().is_empty());
        }
    }

    #[test]
    fn chunk_buffer_exposes_bytes_regardless_of_ownership() {
        let shared = ChunkBuffer::Shared(Arc::from(vec![1u8, 2, 3]));
        let owned = ChunkBuffer::Owned(vec![1u8, 2, 3]);
        assert_eq!(shared.as_bytes(), owned.as_bytes());
    }

    #[test]
    fn with_path_preserves_other_fields() {
        let id = WritableId::ROOT;
        let task = IOTask::WriteChunk {
            node: id,
            path: "/data/0/meshes/E/x".into(),
            offset: vec![0],
            extent: vec![4],
            datatype: Datatype::Double,
            data: ChunkBuffer::Owned(vec![0u8; 32]),
        };
        let remapped = task.with_path("/out_0/data/0/meshes/E/x".into());
        assert_eq!(remapped.path(), "/out_0/data/0/meshes/E/x");
        assert_eq!(remapped.node(), id);
    }

    #[test]
    fn open_dataset_into_starts_empty() {
        let id = WritableId::ROOT;
        let into = Arc::new(std::sync::Mutex::new(None));
        let task = IOTask::OpenDataset {
            node: id,
            path: "/data/0/meshes/E/x".into(),
            into: into.clone(),
        };
        assert_eq!(task.path(), "/data/0/meshes/E/x");
        assert!(into.lock().unwrap().is_none());
    }

    #[test]
    fn delete_tasks_are_identified() {
        let id = WritableId::ROOT;
        assert!(IOTask::DeletePath {
            node: id,
            path: "/x".into()
        }
        .is_delete());
        assert!(!IOTask::CreatePath {
            node: id,
            path: "/x".into()
        }
        .is_delete());
    }
}
