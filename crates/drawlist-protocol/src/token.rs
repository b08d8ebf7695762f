//! Token record layouts and the decode side of the codec.
//!
//! Every record is `#[repr(C, packed)]` and little-endian. The record size is a function of the
//! opcode alone ([`TokenOpcode::size_bytes`]), which is what lets a stream be walked forward
//! without any side index.

use core::mem::{offset_of, size_of};

use crate::header::HeaderTable;
use crate::writer::TokenWriter;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenOpcode {
    TerminateSequence = 0x0,
    Nop = 0x1,
    DrawElements = 0x2,
    DrawArrays = 0x3,
    DrawElementsStrip = 0x4,
    DrawArraysStrip = 0x5,
    DrawElementsInstanced = 0x6,
    DrawArraysInstanced = 0x7,
    ElementAddress = 0x8,
    AttributeAddress = 0x9,
    UniformAddress = 0xA,
    BlendColor = 0xB,
    StencilRef = 0xC,
    LineWidth = 0xD,
    PolygonOffset = 0xE,
    AlphaRef = 0xF,
    Viewport = 0x10,
    Scissor = 0x11,
}

impl TokenOpcode {
    pub const COUNT: usize = 18;

    /// Every opcode, indexed by its discriminant.
    pub const ALL: [TokenOpcode; Self::COUNT] = [
        Self::TerminateSequence,
        Self::Nop,
        Self::DrawElements,
        Self::DrawArrays,
        Self::DrawElementsStrip,
        Self::DrawArraysStrip,
        Self::DrawElementsInstanced,
        Self::DrawArraysInstanced,
        Self::ElementAddress,
        Self::AttributeAddress,
        Self::UniformAddress,
        Self::BlendColor,
        Self::StencilRef,
        Self::LineWidth,
        Self::PolygonOffset,
        Self::AlphaRef,
        Self::Viewport,
        Self::Scissor,
    ];

    pub const fn from_u32(v: u32) -> Option<Self> {
        if (v as usize) < Self::COUNT {
            Some(Self::ALL[v as usize])
        } else {
            None
        }
    }

    /// Full record size, header included.
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::TerminateSequence | Self::Nop => 4,
            Self::LineWidth | Self::AlphaRef => 8,
            Self::DrawArrays | Self::DrawArraysStrip => 12,
            Self::StencilRef | Self::PolygonOffset => 12,
            Self::DrawElements | Self::DrawElementsStrip => 16,
            Self::ElementAddress | Self::AttributeAddress | Self::UniformAddress => 16,
            Self::BlendColor | Self::Viewport | Self::Scissor => 20,
            Self::DrawArraysInstanced => 24,
            Self::DrawElementsInstanced => 28,
        }
    }

    pub const fn is_draw(self) -> bool {
        matches!(
            self,
            Self::DrawElements
                | Self::DrawArrays
                | Self::DrawElementsStrip
                | Self::DrawArraysStrip
                | Self::DrawElementsInstanced
                | Self::DrawArraysInstanced
        )
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenHdr {
    pub encoded: u32,
}

impl TokenHdr {
    pub const SIZE_BYTES: usize = 4;
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenNop {
    pub hdr: TokenHdr,
}

/// Shared by `DRAW_ELEMENTS` and `DRAW_ELEMENTS_STRIP`.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenDrawElements {
    pub hdr: TokenHdr,
    pub count: u32,
    pub first_index: u32,
    pub base_vertex: u32,
}

/// Shared by `DRAW_ARRAYS` and `DRAW_ARRAYS_STRIP`.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenDrawArrays {
    pub hdr: TokenHdr,
    pub count: u32,
    pub first: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenDrawElementsInstanced {
    pub hdr: TokenHdr,
    pub mode: u32,
    pub count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: u32,
    pub base_instance: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenDrawArraysInstanced {
    pub hdr: TokenHdr,
    pub mode: u32,
    pub count: u32,
    pub instance_count: u32,
    pub first: u32,
    pub base_instance: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenElementAddress {
    pub hdr: TokenHdr,
    pub address: u64,
    pub type_size_in_byte: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenAttributeAddress {
    pub hdr: TokenHdr,
    pub index: u32,
    pub address: u64,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenUniformAddress {
    pub hdr: TokenHdr,
    pub index: u16,
    pub stage: u16,
    pub address: u64,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenBlendColor {
    pub hdr: TokenHdr,
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenStencilRef {
    pub hdr: TokenHdr,
    pub front_stencil_ref: u32,
    pub back_stencil_ref: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenLineWidth {
    pub hdr: TokenHdr,
    pub line_width: f32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenPolygonOffset {
    pub hdr: TokenHdr,
    pub scale: f32,
    pub bias: f32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenAlphaRef {
    pub hdr: TokenHdr,
    pub alpha_ref: f32,
}

/// Shared by `VIEWPORT` and `SCISSOR`.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TokenRect {
    pub hdr: TokenHdr,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

const _: () = {
    assert!(size_of::<TokenHdr>() == TokenOpcode::TerminateSequence.size_bytes());
    assert!(size_of::<TokenNop>() == TokenOpcode::Nop.size_bytes());
    assert!(size_of::<TokenDrawElements>() == TokenOpcode::DrawElements.size_bytes());
    assert!(size_of::<TokenDrawElements>() == TokenOpcode::DrawElementsStrip.size_bytes());
    assert!(size_of::<TokenDrawArrays>() == TokenOpcode::DrawArrays.size_bytes());
    assert!(size_of::<TokenDrawArrays>() == TokenOpcode::DrawArraysStrip.size_bytes());
    assert!(
        size_of::<TokenDrawElementsInstanced>()
            == TokenOpcode::DrawElementsInstanced.size_bytes()
    );
    assert!(
        size_of::<TokenDrawArraysInstanced>() == TokenOpcode::DrawArraysInstanced.size_bytes()
    );
    assert!(size_of::<TokenElementAddress>() == TokenOpcode::ElementAddress.size_bytes());
    assert!(size_of::<TokenAttributeAddress>() == TokenOpcode::AttributeAddress.size_bytes());
    assert!(size_of::<TokenUniformAddress>() == TokenOpcode::UniformAddress.size_bytes());
    assert!(size_of::<TokenBlendColor>() == TokenOpcode::BlendColor.size_bytes());
    assert!(size_of::<TokenStencilRef>() == TokenOpcode::StencilRef.size_bytes());
    assert!(size_of::<TokenLineWidth>() == TokenOpcode::LineWidth.size_bytes());
    assert!(size_of::<TokenPolygonOffset>() == TokenOpcode::PolygonOffset.size_bytes());
    assert!(size_of::<TokenAlphaRef>() == TokenOpcode::AlphaRef.size_bytes());
    assert!(size_of::<TokenRect>() == TokenOpcode::Viewport.size_bytes());
    assert!(size_of::<TokenRect>() == TokenOpcode::Scissor.size_bytes());
};

/// A decoded token payload.
///
/// `mode` in the instanced variants is kept raw: it is checked against the bound topology at
/// replay time, not at decode time. `stage` in [`Token::UniformAddress`] is the device's stage
/// index, not a [`crate::ShaderStage`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Token {
    TerminateSequence,
    Nop,
    DrawElements {
        count: u32,
        first_index: u32,
        base_vertex: u32,
    },
    DrawArrays {
        count: u32,
        first: u32,
    },
    DrawElementsStrip {
        count: u32,
        first_index: u32,
        base_vertex: u32,
    },
    DrawArraysStrip {
        count: u32,
        first: u32,
    },
    DrawElementsInstanced {
        mode: u32,
        count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: u32,
        base_instance: u32,
    },
    DrawArraysInstanced {
        mode: u32,
        count: u32,
        instance_count: u32,
        first: u32,
        base_instance: u32,
    },
    ElementAddress {
        address: u64,
        type_size_in_byte: u32,
    },
    AttributeAddress {
        index: u32,
        address: u64,
    },
    UniformAddress {
        index: u16,
        stage: u16,
        address: u64,
    },
    BlendColor {
        red: f32,
        green: f32,
        blue: f32,
        alpha: f32,
    },
    StencilRef {
        front: u32,
        back: u32,
    },
    LineWidth {
        width: f32,
    },
    PolygonOffset {
        scale: f32,
        bias: f32,
    },
    AlphaRef {
        alpha_ref: f32,
    },
    Viewport {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Scissor {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

impl Token {
    pub const fn opcode(&self) -> TokenOpcode {
        match self {
            Self::TerminateSequence => TokenOpcode::TerminateSequence,
            Self::Nop => TokenOpcode::Nop,
            Self::DrawElements { .. } => TokenOpcode::DrawElements,
            Self::DrawArrays { .. } => TokenOpcode::DrawArrays,
            Self::DrawElementsStrip { .. } => TokenOpcode::DrawElementsStrip,
            Self::DrawArraysStrip { .. } => TokenOpcode::DrawArraysStrip,
            Self::DrawElementsInstanced { .. } => TokenOpcode::DrawElementsInstanced,
            Self::DrawArraysInstanced { .. } => TokenOpcode::DrawArraysInstanced,
            Self::ElementAddress { .. } => TokenOpcode::ElementAddress,
            Self::AttributeAddress { .. } => TokenOpcode::AttributeAddress,
            Self::UniformAddress { .. } => TokenOpcode::UniformAddress,
            Self::BlendColor { .. } => TokenOpcode::BlendColor,
            Self::StencilRef { .. } => TokenOpcode::StencilRef,
            Self::LineWidth { .. } => TokenOpcode::LineWidth,
            Self::PolygonOffset { .. } => TokenOpcode::PolygonOffset,
            Self::AlphaRef { .. } => TokenOpcode::AlphaRef,
            Self::Viewport { .. } => TokenOpcode::Viewport,
            Self::Scissor { .. } => TokenOpcode::Scissor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenDecodeError {
    #[error("token header at offset {offset} is truncated")]
    BufferTooSmall { offset: usize },
    #[error("unregistered command header {header:#010x} at offset {offset}")]
    UnregisteredHeader { offset: usize, header: u32 },
    #[error(
        "token at offset {offset} ({token_size_bytes} bytes) overruns stream of {stream_size_bytes} bytes"
    )]
    TokenOverrunsStream {
        offset: usize,
        token_size_bytes: usize,
        stream_size_bytes: usize,
    },
    #[error("expected {expected:?} token at offset {offset}, found {found:?}")]
    UnexpectedOpcode {
        offset: usize,
        expected: TokenOpcode,
        found: Option<TokenOpcode>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecodedToken {
    pub token: Token,
    pub consumed: usize,
}

pub(crate) fn read_u16_at(buf: &[u8], offset: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_le_bytes(b)
}

pub(crate) fn read_u32_at(buf: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(b)
}

pub(crate) fn read_u64_at(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(b)
}

pub(crate) fn read_f32_at(buf: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32_at(buf, offset))
}

/// Encode a single token into a fresh buffer of exactly `opcode.size_bytes()` bytes.
pub fn encode_token(headers: &HeaderTable, token: &Token) -> Vec<u8> {
    let mut w = TokenWriter::new(*headers);
    w.push(token);
    w.finish()
}

/// Decode the token starting at `cursor`.
pub fn decode_token(
    stream: &[u8],
    cursor: usize,
    headers: &HeaderTable,
) -> Result<DecodedToken, TokenDecodeError> {
    let rest = match stream.get(cursor..) {
        Some(rest) if rest.len() >= TokenHdr::SIZE_BYTES => rest,
        _ => return Err(TokenDecodeError::BufferTooSmall { offset: cursor }),
    };

    let encoded = read_u32_at(rest, 0);
    let opcode = headers
        .lookup(encoded)
        .ok_or(TokenDecodeError::UnregisteredHeader {
            offset: cursor,
            header: encoded,
        })?;

    let size = opcode.size_bytes();
    if rest.len() < size {
        return Err(TokenDecodeError::TokenOverrunsStream {
            offset: cursor,
            token_size_bytes: size,
            stream_size_bytes: stream.len(),
        });
    }
    let rec = &rest[..size];

    let token = match opcode {
        TokenOpcode::TerminateSequence => Token::TerminateSequence,
        TokenOpcode::Nop => Token::Nop,
        TokenOpcode::DrawElements | TokenOpcode::DrawElementsStrip => {
            let count = read_u32_at(rec, offset_of!(TokenDrawElements, count));
            let first_index = read_u32_at(rec, offset_of!(TokenDrawElements, first_index));
            let base_vertex = read_u32_at(rec, offset_of!(TokenDrawElements, base_vertex));
            if opcode == TokenOpcode::DrawElements {
                Token::DrawElements {
                    count,
                    first_index,
                    base_vertex,
                }
            } else {
                Token::DrawElementsStrip {
                    count,
                    first_index,
                    base_vertex,
                }
            }
        }
        TokenOpcode::DrawArrays | TokenOpcode::DrawArraysStrip => {
            let count = read_u32_at(rec, offset_of!(TokenDrawArrays, count));
            let first = read_u32_at(rec, offset_of!(TokenDrawArrays, first));
            if opcode == TokenOpcode::DrawArrays {
                Token::DrawArrays { count, first }
            } else {
                Token::DrawArraysStrip { count, first }
            }
        }
        TokenOpcode::DrawElementsInstanced => Token::DrawElementsInstanced {
            mode: read_u32_at(rec, offset_of!(TokenDrawElementsInstanced, mode)),
            count: read_u32_at(rec, offset_of!(TokenDrawElementsInstanced, count)),
            instance_count: read_u32_at(
                rec,
                offset_of!(TokenDrawElementsInstanced, instance_count),
            ),
            first_index: read_u32_at(rec, offset_of!(TokenDrawElementsInstanced, first_index)),
            base_vertex: read_u32_at(rec, offset_of!(TokenDrawElementsInstanced, base_vertex)),
            base_instance: read_u32_at(
                rec,
                offset_of!(TokenDrawElementsInstanced, base_instance),
            ),
        },
        TokenOpcode::DrawArraysInstanced => Token::DrawArraysInstanced {
            mode: read_u32_at(rec, offset_of!(TokenDrawArraysInstanced, mode)),
            count: read_u32_at(rec, offset_of!(TokenDrawArraysInstanced, count)),
            instance_count: read_u32_at(
                rec,
                offset_of!(TokenDrawArraysInstanced, instance_count),
            ),
            first: read_u32_at(rec, offset_of!(TokenDrawArraysInstanced, first)),
            base_instance: read_u32_at(rec, offset_of!(TokenDrawArraysInstanced, base_instance)),
        },
        TokenOpcode::ElementAddress => Token::ElementAddress {
            address: read_u64_at(rec, offset_of!(TokenElementAddress, address)),
            type_size_in_byte: read_u32_at(
                rec,
                offset_of!(TokenElementAddress, type_size_in_byte),
            ),
        },
        TokenOpcode::AttributeAddress => Token::AttributeAddress {
            index: read_u32_at(rec, offset_of!(TokenAttributeAddress, index)),
            address: read_u64_at(rec, offset_of!(TokenAttributeAddress, address)),
        },
        TokenOpcode::UniformAddress => Token::UniformAddress {
            index: read_u16_at(rec, offset_of!(TokenUniformAddress, index)),
            stage: read_u16_at(rec, offset_of!(TokenUniformAddress, stage)),
            address: read_u64_at(rec, offset_of!(TokenUniformAddress, address)),
        },
        TokenOpcode::BlendColor => Token::BlendColor {
            red: read_f32_at(rec, offset_of!(TokenBlendColor, red)),
            green: read_f32_at(rec, offset_of!(TokenBlendColor, green)),
            blue: read_f32_at(rec, offset_of!(TokenBlendColor, blue)),
            alpha: read_f32_at(rec, offset_of!(TokenBlendColor, alpha)),
        },
        TokenOpcode::StencilRef => Token::StencilRef {
            front: read_u32_at(rec, offset_of!(TokenStencilRef, front_stencil_ref)),
            back: read_u32_at(rec, offset_of!(TokenStencilRef, back_stencil_ref)),
        },
        TokenOpcode::LineWidth => Token::LineWidth {
            width: read_f32_at(rec, offset_of!(TokenLineWidth, line_width)),
        },
        TokenOpcode::PolygonOffset => Token::PolygonOffset {
            scale: read_f32_at(rec, offset_of!(TokenPolygonOffset, scale)),
            bias: read_f32_at(rec, offset_of!(TokenPolygonOffset, bias)),
        },
        TokenOpcode::AlphaRef => Token::AlphaRef {
            alpha_ref: read_f32_at(rec, offset_of!(TokenAlphaRef, alpha_ref)),
        },
        TokenOpcode::Viewport | TokenOpcode::Scissor => {
            let x = read_u32_at(rec, offset_of!(TokenRect, x));
            let y = read_u32_at(rec, offset_of!(TokenRect, y));
            let width = read_u32_at(rec, offset_of!(TokenRect, width));
            let height = read_u32_at(rec, offset_of!(TokenRect, height));
            if opcode == TokenOpcode::Viewport {
                Token::Viewport {
                    x,
                    y,
                    width,
                    height,
                }
            } else {
                Token::Scissor {
                    x,
                    y,
                    width,
                    height,
                }
            }
        }
    };

    Ok(DecodedToken {
        token,
        consumed: size,
    })
}

/// Walks `stream[start..end]` token by token.
///
/// Yields `(offset, token)` with `offset` relative to the start of `stream`. The iterator does not
/// stop at [`Token::TerminateSequence`]; that is up to the consumer. After the first error it is
/// fused.
pub struct TokenStreamIter<'a> {
    stream: &'a [u8],
    headers: HeaderTable,
    offset: usize,
    done: bool,
}

impl<'a> TokenStreamIter<'a> {
    pub fn new(stream: &'a [u8], headers: &HeaderTable) -> Self {
        Self {
            stream,
            headers: *headers,
            offset: 0,
            done: false,
        }
    }

    /// Iterate over a sub-range; offsets stay relative to the full stream.
    pub fn with_range(
        stream: &'a [u8],
        headers: &HeaderTable,
        start: usize,
        end: usize,
    ) -> Self {
        let end = end.min(stream.len());
        Self {
            stream: &stream[..end],
            headers: *headers,
            offset: start.min(end),
            done: false,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for TokenStreamIter<'_> {
    type Item = Result<(usize, Token), TokenDecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.stream.len() {
            return None;
        }
        match decode_token(self.stream, self.offset, &self.headers) {
            Ok(decoded) => {
                let at = self.offset;
                self.offset += decoded.consumed;
                Some(Ok((at, decoded.token)))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{HeaderQuery, ShaderStage};

    struct Identity;

    impl HeaderQuery for Identity {
        fn command_header(&self, opcode: TokenOpcode, _size_bytes: u32) -> u32 {
            opcode as u32
        }

        fn stage_index(&self, stage: ShaderStage) -> u16 {
            stage as u16
        }
    }

    #[test]
    fn from_u32_covers_all_opcodes() {
        for (i, op) in TokenOpcode::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i);
            assert_eq!(TokenOpcode::from_u32(i as u32), Some(*op));
        }
        assert_eq!(TokenOpcode::from_u32(TokenOpcode::COUNT as u32), None);
    }

    #[test]
    fn decode_rejects_truncated_header() {
        let headers = HeaderTable::from_device(&Identity).unwrap();
        assert_eq!(
            decode_token(&[0, 0], 0, &headers),
            Err(TokenDecodeError::BufferTooSmall { offset: 0 })
        );
        assert_eq!(
            decode_token(&[0, 0, 0, 0], 4, &headers),
            Err(TokenDecodeError::BufferTooSmall { offset: 4 })
        );
    }

    #[test]
    fn decode_rejects_unregistered_header() {
        let headers = HeaderTable::from_device(&Identity).unwrap();
        let bytes = 0xDEAD_BEEFu32.to_le_bytes();
        assert_eq!(
            decode_token(&bytes, 0, &headers),
            Err(TokenDecodeError::UnregisteredHeader {
                offset: 0,
                header: 0xDEAD_BEEF
            })
        );
    }

    #[test]
    fn decode_rejects_overrun() {
        let headers = HeaderTable::from_device(&Identity).unwrap();
        let mut bytes = (TokenOpcode::Viewport as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        assert_eq!(
            decode_token(&bytes, 0, &headers),
            Err(TokenDecodeError::TokenOverrunsStream {
                offset: 0,
                token_size_bytes: 20,
                stream_size_bytes: 12,
            })
        );
    }

    #[test]
    fn iterator_fuses_after_error() {
        let headers = HeaderTable::from_device(&Identity).unwrap();
        let mut bytes = encode_token(&headers, &Token::Nop);
        bytes.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        bytes.extend_from_slice(&encode_token(&headers, &Token::Nop));

        let mut it = TokenStreamIter::new(&bytes, &headers);
        assert_eq!(it.next(), Some(Ok((0, Token::Nop))));
        assert!(matches!(
            it.next(),
            Some(Err(TokenDecodeError::UnregisteredHeader { offset: 4, .. }))
        ));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn ranged_iterator_reports_absolute_offsets() {
        let headers = HeaderTable::from_device(&Identity).unwrap();
        let mut bytes = encode_token(&headers, &Token::Nop);
        bytes.extend_from_slice(&encode_token(&headers, &Token::LineWidth { width: 2.0 }));
        bytes.extend_from_slice(&encode_token(&headers, &Token::Nop));

        let got: Vec<_> = TokenStreamIter::with_range(&bytes, &headers, 4, 12)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(got, vec![(4, Token::LineWidth { width: 2.0 })]);
    }
}
