//! The two ways a recorded stream is executed.

pub mod emulation;
pub mod hardware;

pub use emulation::{replay_batches, EmulationError, EmulationReport};
pub use hardware::{submit_indirect, CompiledCommandList};
