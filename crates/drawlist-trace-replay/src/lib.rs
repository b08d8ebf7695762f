//! Headless driver for the draw-list recorder: compile a scene on the recording device and
//! inspect the token streams it produces.

pub mod compile;
pub mod token_dump;

pub use compile::{compile_scene, demo_mesh_file, BatchRow, CompileReport};
pub use token_dump::{decode_dump, format_token, recording_headers, TokenDumpError};
