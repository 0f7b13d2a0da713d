//! Volatile in-memory reference backend.
//!
//! Useful for unit tests that only need to observe task ordering and
//! dirty propagation without touching a filesystem. Each node is
//! addressed by its slash-joined path (`IOTask::path`) rather than by
//! `WritableId`, the same scheme the disk-persisting `json_fs` backend
//! uses, keeping the two backends structurally comparable
//! (`spec.md` §8 scenario 6: cross-backend isomorphism).

use std::collections::{HashMap, VecDeque};

use crate::attribute::Attribute;
use crate::datatype::Datatype;
use crate::error::Result;
use crate::task::IOTask;

use super::{Backend, FlushParams};

#[derive(Debug, Clone, Default)]
pub struct NodeState {
    pub exists: bool,
    pub is_dataset: bool,
    pub extent: Vec<u64>,
    pub datatype: Option<Datatype>,
    pub attributes: HashMap<String, Attribute>,
    pub chunks: Vec<(Vec<u64>, Vec<u64>, Vec<u8>)>,
}

/// Reference backend holding the entire hierarchy in memory, keyed by
/// path.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    nodes: HashMap<String, NodeState>,
    queue: VecDeque<IOTask>,
    last_flush_successful: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            nodes: HashMap::new(),
            queue: VecDeque::new(),
            last_flush_successful: true,
        }
    }

    pub fn node(&self, path: &str) -> Option<&NodeState> {
        self.nodes.get(path)
    }

    fn node_mut(&mut self, path: &str) -> &mut NodeState {
        self.nodes.entry(path.to_string()).or_default()
    }

    /// Immediate children of `parent` (`parent/child`, no further `/`),
    /// filtered to datasets or to groups depending on `datasets`.
    fn direct_children(&self, parent: &str, datasets: bool) -> Vec<String> {
        let prefix = if parent.ends_with('/') {
            parent.to_string()
        } else {
            format!("{parent}/")
        };
        let mut out: Vec<String> = self
            .nodes
            .iter()
            .filter_map(|(p, n)| {
                let rest = p.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    return None;
                }
                if n.is_dataset == datasets {
                    Some(rest.to_string())
                } else {
                    None
                }
            })
            .collect();
        out.sort();
        out
    }

    fn apply(&mut self, task: IOTask) -> Result<()> {
        let path = task.path().to_string();
        match task {
            IOTask::CreatePath { .. } => {
                self.node_mut(&path).exists = true;
            }
            IOTask::CreateDataset {
                extent, datatype, ..
            } => {
                let node = self.node_mut(&path);
                node.exists = true;
                node.is_dataset = true;
                node.extent = extent;
                node.datatype = Some(datatype);
            }
            IOTask::OpenPath { .. }
            | IOTask::OpenFile { .. }
            | IOTask::CloseFile { .. }
            | IOTask::Advance { .. }
            | IOTask::GetBufferView { .. } => {}
            IOTask::OpenDataset { into, .. } => {
                let meta = self
                    .nodes
                    .get(&path)
                    .filter(|n| n.is_dataset)
                    .map(|n| (n.datatype.expect("dataset nodes always carry a datatype"), n.extent.clone()));
                *into.lock().unwrap() = meta;
            }
            IOTask::DeletePath { .. } | IOTask::DeleteDataset { .. } => {
                self.nodes.remove(&path);
            }
            IOTask::ReadAttribute { name, into, .. } => {
                let value = self.nodes.get(&path).and_then(|n| n.attributes.get(&name)).cloned();
                *into.lock().unwrap() = value;
            }
            IOTask::ListAttributes { into, .. } => {
                let names = self
                    .nodes
                    .get(&path)
                    .map(|n| n.attributes.keys().cloned().collect())
                    .unwrap_or_default();
                *into.lock().unwrap() = names;
            }
            IOTask::ListPaths { into, .. } => {
                *into.lock().unwrap() = self.direct_children(&path, false);
            }
            IOTask::ListDatasets { into, .. } => {
                *into.lock().unwrap() = self.direct_children(&path, true);
            }
            IOTask::WriteAttribute { name, value, .. } => {
                self.node_mut(&path).attributes.insert(name, value);
            }
            IOTask::WriteChunk {
                offset, extent, data, ..
            } => {
                self.node_mut(&path)
                    .chunks
                    .push((offset, extent, data.as_bytes().to_vec()));
            }
            IOTask::ReadChunk { into, .. } => {
                if let Some(node) = self.nodes.get(&path) {
                    if let Some((_, _, bytes)) = node.chunks.last() {
                        *into.lock().unwrap() = bytes.clone();
                    }
                }
            }
        }
        Ok(())
    }
}

impl Backend for MemoryBackend {
    fn enqueue(&mut self, task: IOTask) {
        self.queue.push_back(task);
    }

    fn flush(&mut self, _params: FlushParams) -> Result<()> {
        let mut result = Ok(());
        while let Some(task) = self.queue.pop_front() {
            if let Err(e) = self.apply(task) {
                result = Err(e);
                break;
            }
        }
        self.last_flush_successful = result.is_ok();
        result
    }

    fn last_flush_successful(&self) -> bool {
        self.last_flush_successful
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ChunkBuffer;
    use crate::writable::WritableId;

    #[test]
    fn create_then_write_attribute_is_visible_after_flush() {
        let mut backend = MemoryBackend::new();
        let id = WritableId::ROOT;
        backend.enqueue(IOTask::CreatePath {
            node: id,
            path: "/data/0".into(),
        });
        backend.enqueue(IOTask::WriteAttribute {
            node: id,
            path: "/data/0".into(),
            name: "dt".into(),
            value: Attribute::new(0.5f64),
        });
        backend.flush(FlushParams::user_flush()).unwrap();
        let node = backend.node("/data/0").unwrap();
        assert!(node.exists);
        assert_eq!(node.attributes.get("dt").unwrap().get::<f64>().unwrap(), 0.5);
    }

    #[test]
    fn delete_removes_node_state() {
        let mut backend = MemoryBackend::new();
        let id = WritableId::ROOT;
        backend.enqueue(IOTask::CreatePath {
            node: id,
            path: "/data/0/x".into(),
        });
        backend.enqueue(IOTask::DeletePath {
            node: id,
            path: "/data/0/x".into(),
        });
        backend.flush(FlushParams::user_flush()).unwrap();
        assert!(backend.node("/data/0/x").is_none());
    }

    #[test]
    fn write_chunk_then_read_back() {
        let mut backend = MemoryBackend::new();
        let id = WritableId::ROOT;
        backend.enqueue(IOTask::CreateDataset {
            node: id,
            path: "/data/0/meshes/E/x".into(),
            extent: vec![4],
            datatype: Datatype::Double,
        });
        let bytes = 1.0f64.to_le_bytes().to_vec();
        backend.enqueue(IOTask::WriteChunk {
            node: id,
            path: "/data/0/meshes/E/x".into(),
            offset: vec![0],
            extent: vec![1],
            datatype: Datatype::Double,
            data: ChunkBuffer::Owned(bytes.clone()),
        });
        backend.flush(FlushParams::user_flush()).unwrap();
        let node = backend.node("/data/0/meshes/E/x").unwrap();
        assert_eq!(node.chunks.len(), 1);
        assert_eq!(node.chunks[0].2, bytes);
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut backend = MemoryBackend::new();
        let id = WritableId::ROOT;
        backend.enqueue(IOTask::CreatePath {
            node: id,
            path: "/a".into(),
        });
        backend.enqueue(IOTask::WriteAttribute {
            node: id,
            path: "/a".into(),
            name: "v".into(),
            value: Attribute::new(1i32),
        });
        backend.enqueue(IOTask::WriteAttribute {
            node: id,
            path: "/a".into(),
            name: "v".into(),
            value: Attribute::new(2i32),
        });
        backend.flush(FlushParams::user_flush()).unwrap();
        assert_eq!(
            backend.node("/a").unwrap().attributes["v"].get::<i32>().unwrap(),
            2
        );
    }
}
