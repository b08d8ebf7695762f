//! Device entry points consumed by the compiler and both replay paths.
//!
//! [`CommandListDevice`] is the command-list extension (state objects, lists, address-indirect
//! submission, header queries). [`BaselineDevice`] is the ordinary draw API the emulation path and
//! the immediate path fall back to. Recording a stream needs both.

use bytemuck::{Pod, Zeroable};
use drawlist_protocol::{HeaderQuery, HeaderTable, IndexFormat, Topology};

use crate::error::DeviceError;
use crate::resident::{BufferAccess, ResidentBuffer};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);
    };
}

handle!(
    /// Captured state object.
    StateId
);
handle!(
    /// Hardware-resident command list object.
    ListId
);
handle!(
    /// Render target. `SurfaceId(0)` is the window framebuffer and cannot be a batch target.
    SurfaceId
);
handle!(ProgramId);
handle!(BufferId);

/// Vertex attribute slots a device exposes.
pub const MAX_VERTEX_ATTRIBS: u32 = 16;

/// Vertex attribute layout of one slot. All components are 32-bit floats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttribFormat {
    pub stride: u32,
    pub components: u32,
    pub offset: u32,
}

/// Address-range binding targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Element,
    VertexAttrib(u32),
    Uniform(u16),
}

/// Arguments of an indirect non-indexed draw, laid out as the device expects them.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawArraysIndirectArgs {
    pub count: u32,
    pub instance_count: u32,
    pub first: u32,
    pub base_instance: u32,
}

/// Arguments of an indirect indexed draw, laid out as the device expects them.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawElementsIndirectArgs {
    pub count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: u32,
    pub base_instance: u32,
}

/// Command-list extension.
pub trait CommandListDevice: HeaderQuery {
    fn create_state(&mut self) -> Result<StateId, DeviceError>;
    /// Snapshot the currently bound configuration into `state`, with `mode` as its topology.
    fn capture_state(&mut self, state: StateId, mode: Topology) -> Result<(), DeviceError>;
    fn delete_state(&mut self, state: StateId);

    fn create_command_list(&mut self) -> Result<ListId, DeviceError>;
    /// Fill a list from CPU-visible token ranges. All slices are indexed in parallel.
    fn list_draw_commands_states_client(
        &mut self,
        list: ListId,
        tokens: &[&[u8]],
        states: &[StateId],
        surfaces: &[SurfaceId],
    ) -> Result<(), DeviceError>;
    fn compile_command_list(&mut self, list: ListId) -> Result<(), DeviceError>;
    fn call_command_list(&mut self, list: ListId) -> Result<(), DeviceError>;
    fn delete_command_list(&mut self, list: ListId);

    /// Execute token ranges living in resident buffers. All slices are indexed in parallel.
    fn draw_commands_states_address(
        &mut self,
        addresses: &[u64],
        sizes: &[u32],
        states: &[StateId],
        surfaces: &[SurfaceId],
    ) -> Result<(), DeviceError>;
}

/// Ordinary draw API.
pub trait BaselineDevice {
    /// Create a resident buffer initialised with `data`.
    fn create_buffer(
        &mut self,
        data: &[u8],
        access: BufferAccess,
    ) -> Result<ResidentBuffer, DeviceError>;
    fn update_buffer(
        &mut self,
        buffer: &ResidentBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError>;
    fn delete_buffer(&mut self, buffer: BufferId);

    fn use_program(&mut self, program: ProgramId);
    fn current_program(&self) -> ProgramId;

    fn enable_vertex_attrib(&mut self, slot: u32, enabled: bool);
    fn vertex_attrib_enabled(&self, slot: u32) -> bool;
    fn set_vertex_attrib_format(&mut self, slot: u32, format: AttribFormat);
    fn vertex_attrib_format(&self, slot: u32) -> AttribFormat;

    fn set_polygon_offset_fill(&mut self, enabled: bool);
    fn bind_framebuffer(&mut self, surface: SurfaceId);
    fn buffer_address_range(&mut self, target: BufferTarget, address: u64, len: u64);

    fn draw_arrays(&mut self, mode: Topology, first: u32, count: u32);
    fn draw_elements_base_vertex(
        &mut self,
        mode: Topology,
        count: u32,
        format: IndexFormat,
        byte_offset: u64,
        base_vertex: u32,
    );
    fn draw_arrays_indirect(&mut self, mode: Topology, args: &DrawArraysIndirectArgs);
    fn draw_elements_indirect(
        &mut self,
        mode: Topology,
        format: IndexFormat,
        args: &DrawElementsIndirectArgs,
    );

    fn blend_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32);
    fn line_width(&mut self, width: f32);
    fn polygon_offset(&mut self, scale: f32, bias: f32);
    fn viewport(&mut self, x: u32, y: u32, width: u32, height: u32);
    fn scissor(&mut self, x: u32, y: u32, width: u32, height: u32);
}

/// Both halves of the device.
pub trait Device: CommandListDevice + BaselineDevice {}

impl<T: CommandListDevice + BaselineDevice + ?Sized> Device for T {}

/// Startup validation: query every header and stage index once.
pub fn header_table<D: CommandListDevice + ?Sized>(device: &D) -> Result<HeaderTable, DeviceError> {
    Ok(HeaderTable::from_device(device)?)
}
