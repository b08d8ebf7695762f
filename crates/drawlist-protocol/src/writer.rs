//! Token stream builder.
//!
//! Each builder appends one record of exactly its opcode's registered size and returns the byte
//! offset it was written at, so callers can cut batches or patch fields later.

use core::mem::offset_of;

use crate::header::{HeaderTable, ShaderStage};
use crate::token::{
    read_u32_at, Token, TokenAlphaRef, TokenAttributeAddress, TokenBlendColor, TokenDecodeError,
    TokenDrawArrays, TokenDrawArraysInstanced, TokenDrawElements, TokenDrawElementsInstanced,
    TokenElementAddress, TokenLineWidth, TokenOpcode, TokenPolygonOffset, TokenRect,
    TokenStencilRef, TokenUniformAddress,
};
use crate::topology::{IndexFormat, Topology};

#[derive(Debug, Clone)]
pub struct TokenWriter {
    headers: HeaderTable,
    buf: Vec<u8>,
}

impl TokenWriter {
    pub fn new(headers: HeaderTable) -> Self {
        Self {
            headers,
            buf: Vec::new(),
        }
    }

    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Append another writer's records. Returns the offset the first one landed at.
    pub fn append(&mut self, other: &TokenWriter) -> usize {
        debug_assert_eq!(self.headers, other.headers);
        let offset = self.buf.len();
        self.buf.extend_from_slice(&other.buf);
        offset
    }

    fn write_u16_at(&mut self, offset: usize, v: u16) {
        self.buf[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn write_u32_at(&mut self, offset: usize, v: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn write_u64_at(&mut self, offset: usize, v: u64) {
        self.buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
    }

    fn write_f32_at(&mut self, offset: usize, v: f32) {
        self.write_u32_at(offset, v.to_bits());
    }

    fn append_raw(&mut self, opcode: TokenOpcode) -> usize {
        let offset = self.buf.len();
        self.buf.resize(offset + opcode.size_bytes(), 0);
        self.write_u32_at(offset, self.headers.header(opcode));
        offset
    }

    /// Append an already-typed token.
    pub fn push(&mut self, token: &Token) -> usize {
        let base = self.append_raw(token.opcode());
        match *token {
            Token::TerminateSequence | Token::Nop => {}
            Token::DrawElements {
                count,
                first_index,
                base_vertex,
            }
            | Token::DrawElementsStrip {
                count,
                first_index,
                base_vertex,
            } => {
                self.write_u32_at(base + offset_of!(TokenDrawElements, count), count);
                self.write_u32_at(base + offset_of!(TokenDrawElements, first_index), first_index);
                self.write_u32_at(base + offset_of!(TokenDrawElements, base_vertex), base_vertex);
            }
            Token::DrawArrays { count, first } | Token::DrawArraysStrip { count, first } => {
                self.write_u32_at(base + offset_of!(TokenDrawArrays, count), count);
                self.write_u32_at(base + offset_of!(TokenDrawArrays, first), first);
            }
            Token::DrawElementsInstanced {
                mode,
                count,
                instance_count,
                first_index,
                base_vertex,
                base_instance,
            } => {
                self.write_u32_at(base + offset_of!(TokenDrawElementsInstanced, mode), mode);
                self.write_u32_at(base + offset_of!(TokenDrawElementsInstanced, count), count);
                self.write_u32_at(
                    base + offset_of!(TokenDrawElementsInstanced, instance_count),
                    instance_count,
                );
                self.write_u32_at(
                    base + offset_of!(TokenDrawElementsInstanced, first_index),
                    first_index,
                );
                self.write_u32_at(
                    base + offset_of!(TokenDrawElementsInstanced, base_vertex),
                    base_vertex,
                );
                self.write_u32_at(
                    base + offset_of!(TokenDrawElementsInstanced, base_instance),
                    base_instance,
                );
            }
            Token::DrawArraysInstanced {
                mode,
                count,
                instance_count,
                first,
                base_instance,
            } => {
                self.write_u32_at(base + offset_of!(TokenDrawArraysInstanced, mode), mode);
                self.write_u32_at(base + offset_of!(TokenDrawArraysInstanced, count), count);
                self.write_u32_at(
                    base + offset_of!(TokenDrawArraysInstanced, instance_count),
                    instance_count,
                );
                self.write_u32_at(base + offset_of!(TokenDrawArraysInstanced, first), first);
                self.write_u32_at(
                    base + offset_of!(TokenDrawArraysInstanced, base_instance),
                    base_instance,
                );
            }
            Token::ElementAddress {
                address,
                type_size_in_byte,
            } => {
                self.write_u64_at(base + offset_of!(TokenElementAddress, address), address);
                self.write_u32_at(
                    base + offset_of!(TokenElementAddress, type_size_in_byte),
                    type_size_in_byte,
                );
            }
            Token::AttributeAddress { index, address } => {
                self.write_u32_at(base + offset_of!(TokenAttributeAddress, index), index);
                self.write_u64_at(base + offset_of!(TokenAttributeAddress, address), address);
            }
            Token::UniformAddress {
                index,
                stage,
                address,
            } => {
                self.write_u16_at(base + offset_of!(TokenUniformAddress, index), index);
                self.write_u16_at(base + offset_of!(TokenUniformAddress, stage), stage);
                self.write_u64_at(base + offset_of!(TokenUniformAddress, address), address);
            }
            Token::BlendColor {
                red,
                green,
                blue,
                alpha,
            } => {
                self.write_f32_at(base + offset_of!(TokenBlendColor, red), red);
                self.write_f32_at(base + offset_of!(TokenBlendColor, green), green);
                self.write_f32_at(base + offset_of!(TokenBlendColor, blue), blue);
                self.write_f32_at(base + offset_of!(TokenBlendColor, alpha), alpha);
            }
            Token::StencilRef { front, back } => {
                self.write_u32_at(base + offset_of!(TokenStencilRef, front_stencil_ref), front);
                self.write_u32_at(base + offset_of!(TokenStencilRef, back_stencil_ref), back);
            }
            Token::LineWidth { width } => {
                self.write_f32_at(base + offset_of!(TokenLineWidth, line_width), width);
            }
            Token::PolygonOffset { scale, bias } => {
                self.write_f32_at(base + offset_of!(TokenPolygonOffset, scale), scale);
                self.write_f32_at(base + offset_of!(TokenPolygonOffset, bias), bias);
            }
            Token::AlphaRef { alpha_ref } => {
                self.write_f32_at(base + offset_of!(TokenAlphaRef, alpha_ref), alpha_ref);
            }
            Token::Viewport {
                x,
                y,
                width,
                height,
            }
            | Token::Scissor {
                x,
                y,
                width,
                height,
            } => self.write_rect_at(base, x, y, width, height),
        }
        base
    }

    fn write_rect_at(&mut self, base: usize, x: u32, y: u32, width: u32, height: u32) {
        self.write_u32_at(base + offset_of!(TokenRect, x), x);
        self.write_u32_at(base + offset_of!(TokenRect, y), y);
        self.write_u32_at(base + offset_of!(TokenRect, width), width);
        self.write_u32_at(base + offset_of!(TokenRect, height), height);
    }

    pub fn terminate_sequence(&mut self) -> usize {
        self.push(&Token::TerminateSequence)
    }

    pub fn nop(&mut self) -> usize {
        self.push(&Token::Nop)
    }

    /// Indexed draw of `index_count` indices; strip topologies use the strip opcode.
    pub fn draw_elements(&mut self, topology: Topology, index_count: u32) -> usize {
        if topology.is_strip() {
            self.push(&Token::DrawElementsStrip {
                count: index_count,
                first_index: 0,
                base_vertex: 0,
            })
        } else {
            self.push(&Token::DrawElements {
                count: index_count,
                first_index: 0,
                base_vertex: 0,
            })
        }
    }

    /// Non-indexed draw of `vertex_count` vertices; strip topologies use the strip opcode.
    pub fn draw_arrays(&mut self, topology: Topology, vertex_count: u32) -> usize {
        if topology.is_strip() {
            self.push(&Token::DrawArraysStrip {
                count: vertex_count,
                first: 0,
            })
        } else {
            self.push(&Token::DrawArrays {
                count: vertex_count,
                first: 0,
            })
        }
    }

    pub fn draw_elements_instanced(
        &mut self,
        mode: Topology,
        count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: u32,
        base_instance: u32,
    ) -> usize {
        self.push(&Token::DrawElementsInstanced {
            mode: mode.as_u32(),
            count,
            instance_count,
            first_index,
            base_vertex,
            base_instance,
        })
    }

    pub fn draw_arrays_instanced(
        &mut self,
        mode: Topology,
        count: u32,
        instance_count: u32,
        first: u32,
        base_instance: u32,
    ) -> usize {
        self.push(&Token::DrawArraysInstanced {
            mode: mode.as_u32(),
            count,
            instance_count,
            first,
            base_instance,
        })
    }

    pub fn element_address(&mut self, address: u64, format: IndexFormat) -> usize {
        self.push(&Token::ElementAddress {
            address,
            type_size_in_byte: format.size_bytes(),
        })
    }

    pub fn attribute_address(&mut self, index: u32, address: u64) -> usize {
        self.push(&Token::AttributeAddress { index, address })
    }

    pub fn uniform_address(&mut self, index: u16, stage: ShaderStage, address: u64) -> usize {
        let stage = self.headers.stage(stage);
        self.push(&Token::UniformAddress {
            index,
            stage,
            address,
        })
    }

    pub fn line_width(&mut self, width: f32) -> usize {
        self.push(&Token::LineWidth { width })
    }

    pub fn polygon_offset(&mut self, scale: f32, bias: f32) -> usize {
        self.push(&Token::PolygonOffset { scale, bias })
    }

    pub fn viewport(&mut self, x: u32, y: u32, width: u32, height: u32) -> usize {
        self.push(&Token::Viewport {
            x,
            y,
            width,
            height,
        })
    }

    pub fn scissor(&mut self, x: u32, y: u32, width: u32, height: u32) -> usize {
        self.push(&Token::Scissor {
            x,
            y,
            width,
            height,
        })
    }

    pub fn blend_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) -> usize {
        self.push(&Token::BlendColor {
            red,
            green,
            blue,
            alpha,
        })
    }

    pub fn stencil_ref(&mut self, front: u32, back: u32) -> usize {
        self.push(&Token::StencilRef { front, back })
    }

    pub fn alpha_ref(&mut self, alpha_ref: f32) -> usize {
        self.push(&Token::AlphaRef { alpha_ref })
    }

    fn expect_opcode_at(
        &self,
        offset: usize,
        expected: TokenOpcode,
    ) -> Result<(), TokenDecodeError> {
        let found = self
            .buf
            .get(offset..offset + expected.size_bytes())
            .and_then(|rec| self.headers.lookup(read_u32_at(rec, 0)));
        if found == Some(expected) {
            Ok(())
        } else {
            Err(TokenDecodeError::UnexpectedOpcode {
                offset,
                expected,
                found,
            })
        }
    }

    /// Rewrite the rectangle of the viewport token at `offset` in place.
    pub fn patch_viewport(
        &mut self,
        offset: usize,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<(), TokenDecodeError> {
        self.expect_opcode_at(offset, TokenOpcode::Viewport)?;
        self.write_rect_at(offset, x, y, width, height);
        Ok(())
    }

    /// Rewrite the width of the line-width token at `offset` in place.
    pub fn patch_line_width(&mut self, offset: usize, width: f32) -> Result<(), TokenDecodeError> {
        self.expect_opcode_at(offset, TokenOpcode::LineWidth)?;
        self.write_f32_at(offset + offset_of!(TokenLineWidth, line_width), width);
        Ok(())
    }
}
