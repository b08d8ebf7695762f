//! Software interpretation of a recorded token stream through the baseline draw API.
//!
//! Consumes exactly the bytes and batch list the hardware path submits. State objects are
//! reproduced from the [`MiniState`] mirrors the registry took at capture time; only the program
//! and the tracked attribute slots are restored.

use drawlist_protocol::{
    HeaderTable, IndexFormat, Token, TokenDecodeError, TokenOpcode, TokenStreamIter, Topology,
};
use tracing::trace;

use crate::batch::{BatchList, TokenSources};
use crate::device::{
    BaselineDevice, BufferTarget, DrawArraysIndirectArgs, DrawElementsIndirectArgs, StateId,
    SurfaceId,
};
use crate::registry::{MiniState, StateRegistry};

/// Length bound for element and attribute address ranges; the token carries no size.
pub const EMULATED_VERTEX_RANGE: u64 = 0x7FFF_FFFF;
/// Length bound for uniform address ranges.
pub const EMULATED_UNIFORM_RANGE: u64 = 0x10000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmulationError {
    #[error(transparent)]
    Decode(#[from] TokenDecodeError),
    #[error("instanced draw at offset {offset} uses mode {found:#x} under bound mode {bound:?}")]
    TopologyMismatch {
        offset: usize,
        bound: Topology,
        found: u32,
    },
    #[error("{0:?} tokens are not supported by the emulation path")]
    Unimplemented(TokenOpcode),
    #[error("batch {index} ({offset}+{size}) overruns its {stream_len}-byte stream")]
    BatchOutOfRange {
        index: usize,
        offset: usize,
        size: usize,
        stream_len: usize,
    },
    #[error("batch {index} references state {state:?} with no recorded mirror")]
    UnknownState { index: usize, state: StateId },
    #[error("batch {index} targets the window framebuffer")]
    MissingSurface { index: usize },
}

/// What one replay did, for tests and logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmulationReport {
    pub state_applies: u32,
    pub surface_binds: u32,
    pub draws: u32,
}

/// Replay every batch in order.
pub fn replay_batches<D: BaselineDevice + ?Sized>(
    device: &mut D,
    headers: &HeaderTable,
    sources: TokenSources<'_>,
    batches: &BatchList,
    registry: &StateRegistry,
) -> Result<EmulationReport, EmulationError> {
    let mut report = EmulationReport::default();
    let mut bound_surface: Option<SurfaceId> = None;
    let mut bound_state: Option<StateId> = None;
    let mut index_format = IndexFormat::U16;

    for (index, batch) in batches.iter().enumerate() {
        if batch.surface == SurfaceId(0) {
            return Err(EmulationError::MissingSurface { index });
        }
        if bound_surface != Some(batch.surface) {
            device.bind_framebuffer(batch.surface);
            bound_surface = Some(batch.surface);
            report.surface_binds += 1;
        }

        let mirror = registry
            .mirror(batch.state)
            .ok_or(EmulationError::UnknownState {
                index,
                state: batch.state,
            })?;
        if bound_state != Some(batch.state) {
            mirror.apply(device);
            bound_state = Some(batch.state);
            report.state_applies += 1;
        }

        let stream = sources.stream(batch.stream);
        let end = batch
            .offset
            .checked_add(batch.size)
            .filter(|&end| end <= stream.len())
            .ok_or(EmulationError::BatchOutOfRange {
                index,
                offset: batch.offset,
                size: batch.size,
                stream_len: stream.len(),
            })?;

        for item in TokenStreamIter::with_range(stream, headers, batch.offset, end) {
            let (offset, token) = item?;
            trace!(index, offset, ?token, "emulate");
            match execute(device, mirror, offset, token, &mut index_format)? {
                Flow::Continue => {}
                Flow::Drew => report.draws += 1,
                Flow::Terminate => break,
            }
        }
    }
    Ok(report)
}

enum Flow {
    Continue,
    Drew,
    Terminate,
}

fn check_instanced_mode(
    mirror: &MiniState,
    offset: usize,
    raw: u32,
) -> Result<Topology, EmulationError> {
    let bound = mirror.mode;
    match Topology::from_u32(raw) {
        Some(mode)
            if mode == bound || mode == bound.strip_mode() || mode == bound.special_mode() =>
        {
            Ok(mode)
        }
        _ => Err(EmulationError::TopologyMismatch {
            offset,
            bound,
            found: raw,
        }),
    }
}

fn execute<D: BaselineDevice + ?Sized>(
    device: &mut D,
    mirror: &MiniState,
    offset: usize,
    token: Token,
    index_format: &mut IndexFormat,
) -> Result<Flow, EmulationError> {
    let mode = mirror.mode;
    match token {
        Token::TerminateSequence => return Ok(Flow::Terminate),
        Token::Nop => {}
        Token::DrawElements {
            count,
            first_index,
            base_vertex,
        } => {
            let byte_offset = u64::from(first_index) * u64::from(index_format.size_bytes());
            device.draw_elements_base_vertex(mode, count, *index_format, byte_offset, base_vertex);
            return Ok(Flow::Drew);
        }
        Token::DrawElementsStrip {
            count,
            first_index,
            base_vertex,
        } => {
            let byte_offset = u64::from(first_index) * u64::from(index_format.size_bytes());
            device.draw_elements_base_vertex(
                mode.strip_mode(),
                count,
                *index_format,
                byte_offset,
                base_vertex,
            );
            return Ok(Flow::Drew);
        }
        Token::DrawArrays { count, first } => {
            device.draw_arrays(mode, first, count);
            return Ok(Flow::Drew);
        }
        Token::DrawArraysStrip { count, first } => {
            device.draw_arrays(mode.strip_mode(), first, count);
            return Ok(Flow::Drew);
        }
        Token::DrawElementsInstanced {
            mode: raw,
            count,
            instance_count,
            first_index,
            base_vertex,
            base_instance,
        } => {
            let mode = check_instanced_mode(mirror, offset, raw)?;
            let args = DrawElementsIndirectArgs {
                count,
                instance_count,
                first_index,
                base_vertex,
                base_instance,
            };
            device.draw_elements_indirect(mode, *index_format, &args);
            return Ok(Flow::Drew);
        }
        Token::DrawArraysInstanced {
            mode: raw,
            count,
            instance_count,
            first,
            base_instance,
        } => {
            let mode = check_instanced_mode(mirror, offset, raw)?;
            let args = DrawArraysIndirectArgs {
                count,
                instance_count,
                first,
                base_instance,
            };
            device.draw_arrays_indirect(mode, &args);
            return Ok(Flow::Drew);
        }
        Token::ElementAddress {
            address,
            type_size_in_byte,
        } => {
            *index_format = IndexFormat::from_size_bytes(type_size_in_byte);
            device.buffer_address_range(BufferTarget::Element, address, EMULATED_VERTEX_RANGE);
        }
        Token::AttributeAddress { index, address } => {
            device.buffer_address_range(
                BufferTarget::VertexAttrib(index),
                address,
                EMULATED_VERTEX_RANGE,
            );
        }
        Token::UniformAddress { index, address, .. } => {
            device.buffer_address_range(
                BufferTarget::Uniform(index),
                address,
                EMULATED_UNIFORM_RANGE,
            );
        }
        Token::BlendColor {
            red,
            green,
            blue,
            alpha,
        } => device.blend_color(red, green, blue, alpha),
        Token::LineWidth { width } => device.line_width(width),
        Token::PolygonOffset { scale, bias } => device.polygon_offset(scale, bias),
        Token::Viewport {
            x,
            y,
            width,
            height,
        } => device.viewport(x, y, width, height),
        Token::Scissor {
            x,
            y,
            width,
            height,
        } => device.scissor(x, y, width, height),
        Token::StencilRef { .. } | Token::AlphaRef { .. } => {
            return Err(EmulationError::Unimplemented(token.opcode()));
        }
    }
    Ok(Flow::Continue)
}
