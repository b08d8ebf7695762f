use std::path::PathBuf;

use drawlist_protocol::{HeaderTableError, IndexFormat, TokenDecodeError};

use crate::device::{BufferId, ListId, StateId};
use crate::replay::emulation::EmulationError;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device header table is unusable: {0}")]
    HeaderTable(#[from] HeaderTableError),
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),
    #[error("buffer {0:?} was not created writable")]
    BufferNotWritable(BufferId),
    #[error("write of {len} bytes at offset {offset} overruns buffer {buffer:?} of {size} bytes")]
    BufferOverrun {
        buffer: BufferId,
        offset: u64,
        len: usize,
        size: u64,
    },
    #[error("unknown state object {0:?}")]
    UnknownState(StateId),
    #[error("state object {0:?} was never captured")]
    UncapturedState(StateId),
    #[error("unknown command list {0:?}")]
    UnknownList(ListId),
    #[error("command list {0:?} was called before it was compiled")]
    ListNotCompiled(ListId),
    #[error("no resident buffer contains token range {address:#x}+{size}")]
    UnmappedTokenRange { address: u64, size: u32 },
    #[error("batch arrays disagree in length")]
    BatchArrayMismatch,
    #[error("hardware submission failed: {0}")]
    Submission(#[from] TokenDecodeError),
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("asset {0} not found")]
    NotFound(String),
    #[error("mesh {mesh} group {group}: index {index} does not fit {format:?}")]
    IndexOutOfRange {
        mesh: usize,
        group: usize,
        index: u32,
        format: IndexFormat,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("supersampling factor must be positive, got {0}")]
    Supersampling(f32),
}

#[derive(Debug, thiserror::Error)]
pub enum DrawListError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Decode(#[from] TokenDecodeError),
    #[error(transparent)]
    Emulation(#[from] EmulationError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("batch list used before its token buffers were uploaded")]
    UnresolvedBatches,
    #[error("batch {index} does not fit its token stream")]
    BatchOutOfRange { index: usize },
    #[error("viewport header stream used before the first resize")]
    MissingViewportHeader,
}
