//! Self-describing on-disk reference backend.
//!
//! Every openPMD path becomes a directory; each directory carries a
//! `.attributes.json` sidecar (the node's attribute map) and, for
//! datasets, a `.dataset.json` sidecar (datatype/extent/options) plus one
//! binary file per stored chunk. This is not HDF5 or ADIOS2 — per
//! `spec.md` §1, those wire formats are out of scope — but it is a real
//! persistent backend exercising the same `Backend` contract
//! (`MemoryBackend`'s path-keyed-`HashMap` sibling, now actually durable),
//! grounded on the teacher's own split between in-memory bookkeeping
//! (`storage_v2::write_buffer`) and an on-disk segment
//! (`storage_v2::segment`/`writer`).

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::attribute::Attribute;
use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::task::IOTask;

use super::{Backend, FlushParams};

#[derive(Debug, Serialize, Deserialize, Default)]
struct AttributesSidecar {
    attributes: std::collections::HashMap<String, Attribute>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DatasetSidecar {
    datatype: Datatype,
    extent: Vec<u64>,
    options: serde_json::Value,
    /// offset/extent of each stored chunk file, in write order; the file
    /// name is `chunk_<index>.bin`.
    chunks: Vec<(Vec<u64>, Vec<u64>)>,
}

pub struct JsonFsBackend {
    root: PathBuf,
    queue: VecDeque<IOTask>,
    last_flush_successful: bool,
}

impl JsonFsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonFsBackend {
            root: root.into(),
            queue: VecDeque::new(),
            last_flush_successful: true,
        }
    }

    fn dir_for(&self, path: &str) -> PathBuf {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            self.root.clone()
        } else {
            self.root.join(trimmed)
        }
    }

    fn attrs_sidecar_path(dir: &Path) -> PathBuf {
        dir.join(".attributes.json")
    }

    fn dataset_sidecar_path(dir: &Path) -> PathBuf {
        dir.join(".dataset.json")
    }

    fn load_attrs(dir: &Path) -> Result<AttributesSidecar> {
        let p = Self::attrs_sidecar_path(dir);
        if !p.exists() {
            return Ok(AttributesSidecar::default());
        }
        let text = fs::read_to_string(&p)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save_attrs(dir: &Path, sidecar: &AttributesSidecar) -> Result<()> {
        let text = serde_json::to_string_pretty(sidecar)?;
        fs::write(Self::attrs_sidecar_path(dir), text)?;
        Ok(())
    }

    fn load_dataset(dir: &Path) -> Result<Option<DatasetSidecar>> {
        let p = Self::dataset_sidecar_path(dir);
        if !p.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&p)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save_dataset(dir: &Path, sidecar: &DatasetSidecar) -> Result<()> {
        let text = serde_json::to_string_pretty(sidecar)?;
        fs::write(Self::dataset_sidecar_path(dir), text)?;
        Ok(())
    }

    /// Immediate subdirectories of `dir`, filtered to ones that are (or
    /// are not) dataset directories, identified by the presence of
    /// `.dataset.json`.
    fn direct_children(dir: &Path, datasets: bool) -> Result<Vec<String>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let is_dataset = Self::dataset_sidecar_path(&entry.path()).exists();
            if is_dataset == datasets {
                if let Some(name) = entry.file_name().to_str() {
                    out.push(name.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    fn apply(&mut self, task: IOTask) -> Result<()> {
        let path = task.path().to_string();
        let dir = self.dir_for(&path);
        match task {
            IOTask::CreatePath { .. } | IOTask::OpenPath { .. } | IOTask::OpenFile { .. } => {
                fs::create_dir_all(&dir)?;
            }
            IOTask::CreateDataset {
                extent, datatype, ..
            } => {
                fs::create_dir_all(&dir)?;
                let sidecar = DatasetSidecar {
                    datatype,
                    extent,
                    options: serde_json::Value::Null,
                    chunks: Vec::new(),
                };
                Self::save_dataset(&dir, &sidecar)?;
            }
            IOTask::CloseFile { .. } | IOTask::Advance { .. } | IOTask::GetBufferView { .. } => {}
            IOTask::OpenDataset { into, .. } => {
                let meta = Self::load_dataset(&dir)?.map(|s| (s.datatype, s.extent));
                *into.lock().unwrap() = meta;
            }
            IOTask::DeletePath { .. } | IOTask::DeleteDataset { .. } => {
                if dir.exists() {
                    fs::remove_dir_all(&dir)?;
                }
            }
            IOTask::ReadAttribute { name, into, .. } => {
                let sidecar = Self::load_attrs(&dir)?;
                *into.lock().unwrap() = sidecar.attributes.get(&name).cloned();
            }
            IOTask::ListAttributes { into, .. } => {
                let sidecar = Self::load_attrs(&dir)?;
                *into.lock().unwrap() = sidecar.attributes.keys().cloned().collect();
            }
            IOTask::ListPaths { into, .. } => {
                *into.lock().unwrap() = Self::direct_children(&dir, false)?;
            }
            IOTask::ListDatasets { into, .. } => {
                *into.lock().unwrap() = Self::direct_children(&dir, true)?;
            }
            IOTask::WriteAttribute { name, value, .. } => {
                fs::create_dir_all(&dir)?;
                let mut sidecar = Self::load_attrs(&dir)?;
                sidecar.attributes.insert(name, value);
                Self::save_attrs(&dir, &sidecar)?;
            }
            IOTask::WriteChunk {
                offset,
                extent,
                data,
                ..
            } => {
                fs::create_dir_all(&dir)?;
                let mut sidecar = Self::load_dataset(&dir)?.ok_or_else(|| {
                    Error::internal(format!("WriteChunk against undeclared dataset at {path}"))
                })?;
                let index = sidecar.chunks.len();
                fs::write(dir.join(format!("chunk_{index}.bin")), data.as_bytes())?;
                sidecar.chunks.push((offset, extent));
                Self::save_dataset(&dir, &sidecar)?;
            }
            IOTask::ReadChunk { into, .. } => {
                if let Some(sidecar) = Self::load_dataset(&dir)? {
                    if let Some(index) = sidecar.chunks.len().checked_sub(1) {
                        let bytes = fs::read(dir.join(format!("chunk_{index}.bin")))?;
                        *into.lock().unwrap() = bytes;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Backend for JsonFsBackend {
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
