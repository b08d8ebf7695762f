//! Device-assigned token headers and shader stage indices.
//!
//! The encoded header word at the start of every token is opaque: the device decides which
//! 32-bit value stands for which opcode (and record size). The table is filled once at startup
//! and shared by every writer and decoder afterwards.

use crate::token::TokenOpcode;

pub const STAGE_COUNT: usize = 5;

/// Shader stages that uniform-address tokens can target.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex = 0,
    TessControl = 1,
    TessEvaluation = 2,
    Geometry = 3,
    Fragment = 4,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; STAGE_COUNT] = [
        Self::Vertex,
        Self::TessControl,
        Self::TessEvaluation,
        Self::Geometry,
        Self::Fragment,
    ];
}

/// The two startup queries the device must answer before any token is built.
pub trait HeaderQuery {
    fn command_header(&self, opcode: TokenOpcode, size_bytes: u32) -> u32;
    fn stage_index(&self, stage: ShaderStage) -> u16;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderTableError {
    #[error("opcodes {first:?} and {second:?} share command header {header:#010x}")]
    DuplicateHeader {
        header: u32,
        first: TokenOpcode,
        second: TokenOpcode,
    },
}

/// Opcode -> header word and stage -> stage index mapping, plus the reverse lookup used when
/// decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderTable {
    headers: [u32; TokenOpcode::COUNT],
    stages: [u16; STAGE_COUNT],
}

impl HeaderTable {
    /// Query the device once per opcode (with that opcode's record size) and once per stage.
    pub fn from_device<Q: HeaderQuery + ?Sized>(query: &Q) -> Result<Self, HeaderTableError> {
        let mut headers = [0u32; TokenOpcode::COUNT];
        for opcode in TokenOpcode::ALL {
            headers[opcode as usize] = query.command_header(opcode, opcode.size_bytes() as u32);
        }
        let mut stages = [0u16; STAGE_COUNT];
        for stage in ShaderStage::ALL {
            stages[stage as usize] = query.stage_index(stage);
        }
        Self::from_parts(headers, stages)
    }

    pub fn from_parts(
        headers: [u32; TokenOpcode::COUNT],
        stages: [u16; STAGE_COUNT],
    ) -> Result<Self, HeaderTableError> {
        for (i, &a) in headers.iter().enumerate() {
            if let Some(j) = headers[i + 1..].iter().position(|&b| b == a) {
                return Err(HeaderTableError::DuplicateHeader {
                    header: a,
                    first: TokenOpcode::ALL[i],
                    second: TokenOpcode::ALL[i + 1 + j],
                });
            }
        }
        Ok(Self { headers, stages })
    }

    pub fn header(&self, opcode: TokenOpcode) -> u32 {
        self.headers[opcode as usize]
    }

    pub fn stage(&self, stage: ShaderStage) -> u16 {
        self.stages[stage as usize]
    }

    /// Reverse lookup of an encoded header word.
    pub fn lookup(&self, header: u32) -> Option<TokenOpcode> {
        self.headers
            .iter()
            .position(|&h| h == header)
            .map(|i| TokenOpcode::ALL[i])
    }
}
