//! Recording and replaying pre-compiled draw command lists.
//!
//! - [`compiler`] turns mesh assets into a token stream plus a list of state/surface batches.
//! - [`registry`] deduplicates the state objects those batches reference.
//! - [`replay`] plays the batches back, either through the device's command-list entry points
//!   or by decoding the tokens and issuing ordinary draw calls.
//! - [`scene`] owns the shared resources and drives models and the grid frame by frame.
//!
//! Every device interaction goes through the traits in [`device`]; [`recording::RecordingDevice`]
//! is an in-memory implementation used by the tests and the trace tool.

pub mod batch;
pub mod compiler;
pub mod config;
pub mod device;
pub mod error;
pub mod grid;
pub mod mesh;
pub mod model;
pub mod recording;
pub mod registry;
pub mod replay;
pub mod resident;
pub mod scene;
pub mod stats;
pub mod uniforms;
pub mod viewport;

pub use batch::{BatchDescriptor, BatchList, StreamSlot, TokenSources};
pub use compiler::{compile_stream, CompileParams, CompiledStream, Programs, StreamTargets};
pub use config::{GroupingStrategy, RenderConfig, RenderPath, SceneManifest};
pub use device::{
    BaselineDevice, BufferId, CommandListDevice, Device, ListId, ProgramId, StateId, SurfaceId,
};
pub use error::{AssetError, ConfigError, DeviceError, DrawListError};
pub use model::Model;
pub use recording::RecordingDevice;
pub use registry::{StateKey, StateRegistry};
pub use replay::{replay_batches, submit_indirect, CompiledCommandList, EmulationError};
pub use scene::{FrameView, Scene, SharedResources};
pub use stats::RenderStats;
