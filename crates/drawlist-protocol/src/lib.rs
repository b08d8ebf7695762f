//! Binary token stream layouts for pre-recorded draw command lists.
//!
//! A token stream is a tightly packed run of fixed-size records. Each record begins with a
//! 32-bit header handed out by the device for its opcode (see [`HeaderTable`]), so a stream can
//! only be built or walked once that table exists.

pub mod header;
pub mod token;
pub mod topology;
pub mod writer;

pub use header::{HeaderQuery, HeaderTable, HeaderTableError, ShaderStage};
pub use token::{
    decode_token, encode_token, DecodedToken, Token, TokenDecodeError, TokenOpcode,
    TokenStreamIter,
};
pub use topology::{IndexFormat, Topology};
pub use writer::TokenWriter;
