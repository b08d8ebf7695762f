//! Floor grid and focus cross, drawn from a fixed two-batch stream.

use drawlist_protocol::{ShaderStage, TokenWriter, Topology};
use glam::{Mat4, Vec3};
use tracing::debug;

use crate::batch::{BatchList, StreamSlot, TokenSources};
use crate::config::RenderPath;
use crate::device::{AttribFormat, BufferTarget, Device, SurfaceId, MAX_VERTEX_ATTRIBS};
use crate::error::DrawListError;
use crate::registry::StateRegistry;
use crate::replay::{replay_batches, submit_indirect};
use crate::resident::{BufferAccess, ResidentBuffer};
use crate::scene::{FrameView, SharedResources};
use crate::uniforms::{UBO_LIGHT, UBO_MATRIX, UNIFORM_ENTRY_BYTES};

pub const GRID_DIVISIONS: u32 = 20;
pub const GRID_HALF_SIZE: f32 = 1.0;
pub const GRID_VERTEX_COUNT: u32 = GRID_DIVISIONS * 4;
pub const CROSS_HALF_SIZE: f32 = 0.01;
pub const CROSS_VERTEX_COUNT: u32 = 6;
pub const CROSS_LINE_WIDTH: f32 = 4.0;

const POSITION_FORMAT: AttribFormat = AttribFormat {
    stride: 12,
    components: 3,
    offset: 0,
};

/// Line list of the floor grid in the XZ plane.
pub fn grid_vertices() -> Vec<Vec3> {
    let step = 2.0 * GRID_HALF_SIZE / GRID_DIVISIONS as f32;
    let far = GRID_HALF_SIZE - step;
    let mut v = Vec::with_capacity(GRID_VERTEX_COUNT as usize);
    for i in 0..GRID_DIVISIONS {
        let t = -GRID_HALF_SIZE + step * i as f32;
        v.push(Vec3::new(-GRID_HALF_SIZE, 0.0, t));
        v.push(Vec3::new(far, 0.0, t));
        v.push(Vec3::new(t, 0.0, -GRID_HALF_SIZE));
        v.push(Vec3::new(t, 0.0, far));
    }
    v
}

/// Three axis-aligned segments centered on `focus`.
pub fn cross_vertices(focus: Vec3) -> [Vec3; CROSS_VERTEX_COUNT as usize] {
    let d = CROSS_HALF_SIZE;
    [
        focus - Vec3::X * d,
        focus + Vec3::X * d,
        focus - Vec3::Y * d,
        focus + Vec3::Y * d,
        focus - Vec3::Z * d,
        focus + Vec3::Z * d,
    ]
}

#[derive(Debug, Default)]
pub struct Grid {
    vertices: Option<ResidentBuffer>,
    cross: Option<ResidentBuffer>,
    token_buffer: Option<ResidentBuffer>,
    tokens: Vec<u8>,
    batches: BatchList,
    registry: StateRegistry,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recorded(&self) -> bool {
        self.token_buffer.is_some()
    }

    pub fn batches(&self) -> &BatchList {
        &self.batches
    }

    pub fn tokens(&self) -> &[u8] {
        &self.tokens
    }

    /// Create the vertex buffers and record the stream. Needs the viewport header in place.
    pub fn record<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        shared: &SharedResources,
        surface: SurfaceId,
    ) -> Result<(), DrawListError> {
        self.release(device);
        let header_address = shared.viewport.address()?;
        let (vertices, cross) = self.ensure_buffers(device)?;

        device.use_program(shared.programs.grid);
        device.set_vertex_attrib_format(0, POSITION_FORMAT);
        device.enable_vertex_attrib(0, true);
        for slot in 1..MAX_VERTEX_ATTRIBS {
            device.enable_vertex_attrib(slot, false);
        }
        let state = self.registry.capture_detached(device, Topology::Lines)?;

        let mut w = TokenWriter::new(shared.headers);
        w.uniform_address(UBO_MATRIX, ShaderStage::Vertex, shared.matrices.address);
        w.uniform_address(UBO_LIGHT, ShaderStage::Fragment, shared.light.address);
        w.attribute_address(0, vertices.address);
        w.draw_arrays(Topology::Lines, GRID_VERTEX_COUNT);
        w.line_width(CROSS_LINE_WIDTH);
        w.attribute_address(0, cross.address);
        w.draw_arrays(Topology::Lines, CROSS_VERTEX_COUNT);
        self.tokens = w.finish();

        let token_buffer = device.create_buffer(&self.tokens, BufferAccess::READ)?;
        self.token_buffer = Some(token_buffer);

        self.batches.clear();
        self.batches.push(
            StreamSlot::Header,
            0,
            shared.viewport.tokens().len(),
            state,
            surface,
        );
        self.batches
            .push(StreamSlot::Body, 0, self.tokens.len(), state, surface);
        self.batches.resolve(header_address, token_buffer.address);
        debug!(tokens = self.tokens.len(), "grid recorded");
        Ok(())
    }

    fn ensure_buffers<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
    ) -> Result<(ResidentBuffer, ResidentBuffer), DrawListError> {
        let vertices = match self.vertices {
            Some(b) => b,
            None => {
                let b = device.create_buffer(
                    bytemuck::cast_slice(&grid_vertices()),
                    BufferAccess::READ,
                )?;
                self.vertices = Some(b);
                b
            }
        };
        let cross = match self.cross {
            Some(b) => b,
            None => {
                let b = device.create_buffer(
                    bytemuck::cast_slice(&cross_vertices(Vec3::ZERO)),
                    BufferAccess::READ | BufferAccess::WRITE,
                )?;
                self.cross = Some(b);
                b
            }
        };
        Ok((vertices, cross))
    }

    pub fn update_surface(&mut self, surface: SurfaceId) {
        self.batches.update_surface(surface);
    }

    pub fn display<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        shared: &SharedResources,
        frame: &FrameView,
        path: RenderPath,
        surface: SurfaceId,
    ) -> Result<(), DrawListError> {
        shared.write_matrices(device, Mat4::IDENTITY, frame.view_projection())?;
        if path.uses_tokens() && !self.is_recorded() {
            self.record(device, shared, surface)?;
        }
        let (vertices, cross) = self.ensure_buffers(device)?;
        device.update_buffer(&cross, 0, bytemuck::cast_slice(&cross_vertices(frame.focus)))?;

        match path {
            RenderPath::Immediate => {
                draw_immediate(device, shared, vertices, cross, surface);
            }
            RenderPath::Emulation => {
                let sources = TokenSources {
                    header: shared.viewport.tokens(),
                    body: &self.tokens,
                };
                replay_batches(device, &shared.headers, sources, &self.batches, &self.registry)?;
            }
            RenderPath::CompiledList | RenderPath::AddressIndirect => {
                submit_indirect(device, &self.batches, None)?;
            }
        }
        Ok(())
    }

    pub fn release<D: Device + ?Sized>(&mut self, device: &mut D) {
        for buffer in [
            self.vertices.take(),
            self.cross.take(),
            self.token_buffer.take(),
        ]
        .into_iter()
        .flatten()
        {
            device.delete_buffer(buffer.id);
        }
        self.registry.release_all(device);
        self.tokens.clear();
        self.batches.clear();
    }
}

fn draw_immediate<D: Device + ?Sized>(
    device: &mut D,
    shared: &SharedResources,
    vertices: ResidentBuffer,
    cross: ResidentBuffer,
    surface: SurfaceId,
) {
    device.bind_framebuffer(surface);
    device.use_program(shared.programs.grid);
    device.set_vertex_attrib_format(0, POSITION_FORMAT);
    device.enable_vertex_attrib(0, true);
    device.buffer_address_range(
        BufferTarget::Uniform(UBO_MATRIX),
        shared.matrices.address,
        UNIFORM_ENTRY_BYTES,
    );
    device.buffer_address_range(
        BufferTarget::Uniform(UBO_LIGHT),
        shared.light.address,
        UNIFORM_ENTRY_BYTES,
    );
    device.buffer_address_range(BufferTarget::VertexAttrib(0), vertices.address, vertices.size);
    device.draw_arrays(Topology::Lines, 0, GRID_VERTEX_COUNT);
    device.line_width(CROSS_LINE_WIDTH);
    device.buffer_address_range(BufferTarget::VertexAttrib(0), cross.address, cross.size);
    device.draw_arrays(Topology::Lines, 0, CROSS_VERTEX_COUNT);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_has_eighty_vertices_on_the_floor() {
        let v = grid_vertices();
        assert_eq!(v.len(), GRID_VERTEX_COUNT as usize);
        assert!(v.iter().all(|p| p.y == 0.0));
        assert_eq!(v[0], Vec3::new(-1.0, 0.0, -1.0));
        assert!(v[1].abs_diff_eq(Vec3::new(0.9, 0.0, -1.0), 1e-6));
        assert!(v[3].abs_diff_eq(Vec3::new(-1.0, 0.0, 0.9), 1e-6));
    }

    #[test]
    fn cross_is_centered_on_focus() {
        let focus = Vec3::new(1.0, 2.0, 3.0);
        let c = cross_vertices(focus);
        let center = c.iter().copied().sum::<Vec3>() / c.len() as f32;
        assert!((center - focus).length() < 1e-6);
        assert!(((c[1] - c[0]).x - 2.0 * CROSS_HALF_SIZE).abs() < 1e-6);
    }
}
