//! Headless [`Device`](crate::device::Device) that logs what it is asked to do.
//!
//! Buffers live in host memory at fake device addresses. Command-list execution (both the compiled
//! and the address-indirect entry points) is simulated by walking the submitted token ranges under
//! each batch's captured topology and recording the draws they describe, so tests can compare the
//! hardware and emulation paths draw for draw.

use std::collections::BTreeMap;

use drawlist_protocol::{
    HeaderQuery, HeaderTable, IndexFormat, ShaderStage, Token, TokenOpcode, TokenStreamIter,
    Topology,
};
use hashbrown::HashMap;
use tracing::trace;

use crate::device::{
    AttribFormat, BaselineDevice, BufferId, BufferTarget, CommandListDevice,
    DrawArraysIndirectArgs, DrawElementsIndirectArgs, ListId, ProgramId, StateId, SurfaceId,
    MAX_VERTEX_ATTRIBS,
};
use crate::error::DeviceError;
use crate::resident::{align_up, BufferAccess, ResidentBuffer};

/// First address handed out.
pub const RECORDING_BASE_ADDRESS: u64 = 0x1_0000_0000;

const MIN_ALLOCATION: u64 = 256;

/// Header word the recording device assigns to an opcode.
pub const fn recording_header(opcode: TokenOpcode, size_bytes: u32) -> u32 {
    0xC0DE_0000 | ((opcode as u32) << 8) | size_bytes
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    CreateBuffer {
        id: BufferId,
        address: u64,
        size: u64,
        access: BufferAccess,
    },
    UpdateBuffer {
        id: BufferId,
        offset: u64,
        len: usize,
    },
    DeleteBuffer(BufferId),
    CreateState(StateId),
    CaptureState {
        state: StateId,
        mode: Topology,
    },
    DeleteState(StateId),
    CreateList(ListId),
    FillList {
        list: ListId,
        batches: usize,
    },
    CompileList(ListId),
    CallList(ListId),
    DeleteList(ListId),
    SubmitAddress {
        batches: usize,
    },
    UseProgram(ProgramId),
    EnableAttrib {
        slot: u32,
        enabled: bool,
    },
    AttribFormat {
        slot: u32,
        format: AttribFormat,
    },
    PolygonOffsetFill(bool),
    BindFramebuffer(SurfaceId),
    AddressRange {
        target: BufferTarget,
        address: u64,
        len: u64,
    },
    BlendColor([f32; 4]),
    LineWidth(f32),
    PolygonOffset {
        scale: f32,
        bias: f32,
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

/// One draw, whichever path issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawRecord {
    pub mode: Topology,
    /// First index for indexed draws, first vertex otherwise.
    pub first: u32,
    pub count: u32,
    pub instances: u32,
    pub index_format: Option<IndexFormat>,
    pub surface: SurfaceId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct AttribSlot {
    enabled: bool,
    format: AttribFormat,
}

#[derive(Clone, Debug)]
struct StoredBuffer {
    id: BufferId,
    access: BufferAccess,
    data: Vec<u8>,
}

#[derive(Clone, Copy, Debug)]
struct CapturedState {
    mode: Topology,
}

#[derive(Clone, Debug, Default)]
struct RecordedList {
    batches: Vec<(Vec<u8>, StateId, SurfaceId)>,
    compiled: bool,
}

#[derive(Debug)]
pub struct RecordingDevice {
    buffers: BTreeMap<u64, StoredBuffer>,
    buffer_addresses: HashMap<BufferId, u64>,
    next_address: u64,
    states: HashMap<StateId, Option<CapturedState>>,
    lists: HashMap<ListId, RecordedList>,
    next_id: u32,

    program: ProgramId,
    attribs: [AttribSlot; MAX_VERTEX_ATTRIBS as usize],
    polygon_offset_fill: bool,
    framebuffer: SurfaceId,

    calls: Vec<DeviceCall>,
    draws: Vec<DrawRecord>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderQuery for RecordingDevice {
    fn command_header(&self, opcode: TokenOpcode, size_bytes: u32) -> u32 {
        recording_header(opcode, size_bytes)
    }

    fn stage_index(&self, stage: ShaderStage) -> u16 {
        stage as u16
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            buffers: BTreeMap::new(),
            buffer_addresses: HashMap::new(),
            next_address: RECORDING_BASE_ADDRESS,
            states: HashMap::new(),
            lists: HashMap::new(),
            next_id: 1,
            program: ProgramId(0),
            attribs: [AttribSlot::default(); MAX_VERTEX_ATTRIBS as usize],
            polygon_offset_fill: false,
            framebuffer: SurfaceId(0),
            calls: Vec::new(),
            draws: Vec::new(),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Drain the draw log, leaving the call log alone.
    pub fn take_draws(&mut self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.draws)
    }

    pub fn clear_log(&mut self) {
        self.calls.clear();
        self.draws.clear();
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_states(&self) -> usize {
        self.states.len()
    }

    pub fn live_lists(&self) -> usize {
        self.lists.len()
    }

    pub fn framebuffer(&self) -> SurfaceId {
        self.framebuffer
    }

    pub fn polygon_offset_fill(&self) -> bool {
        self.polygon_offset_fill
    }

    /// Current contents of a live buffer.
    pub fn buffer_data(&self, id: BufferId) -> Option<&[u8]> {
        let address = self.buffer_addresses.get(&id)?;
        self.buffers.get(address).map(|b| b.data.as_slice())
    }

    /// Copy of `size` bytes at `address`, which must lie inside one live buffer.
    fn read_range(&self, address: u64, size: u32) -> Result<Vec<u8>, DeviceError> {
        let unmapped = DeviceError::UnmappedTokenRange { address, size };
        let (&base, buffer) = self.buffers.range(..=address).next_back().ok_or(unmapped)?;
        let start = (address - base) as usize;
        let end = start + size as usize;
        buffer
            .data
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or(DeviceError::UnmappedTokenRange { address, size })
    }

    /// Walk one batch the way the hardware would and record its draws.
    fn execute_batch(
        &mut self,
        headers: &HeaderTable,
        tokens: &[u8],
        state: StateId,
        surface: SurfaceId,
    ) -> Result<(), DeviceError> {
        let captured = self
            .states
            .get(&state)
            .ok_or(DeviceError::UnknownState(state))?
            .ok_or(DeviceError::UncapturedState(state))?;
        let mode = captured.mode;
        let mut format = IndexFormat::U16;

        for item in TokenStreamIter::new(tokens, headers) {
            let (_, token) = item?;
            let draw = |mode, first, count, instances, index_format| DrawRecord {
                mode,
                first,
                count,
                instances,
                index_format,
                surface,
            };
            let record = match token {
                Token::TerminateSequence => break,
                Token::ElementAddress {
                    type_size_in_byte, ..
                } => {
                    format = IndexFormat::from_size_bytes(type_size_in_byte);
                    None
                }
                Token::DrawElements {
                    count, first_index, ..
                } => Some(draw(mode, first_index, count, 1, Some(format))),
                Token::DrawElementsStrip {
                    count, first_index, ..
                } => Some(draw(mode.strip_mode(), first_index, count, 1, Some(format))),
                Token::DrawArrays { count, first } => Some(draw(mode, first, count, 1, None)),
                Token::DrawArraysStrip { count, first } => {
                    Some(draw(mode.strip_mode(), first, count, 1, None))
                }
                Token::DrawElementsInstanced {
                    mode: raw,
                    count,
                    instance_count,
                    first_index,
                    ..
                } => Some(draw(
                    Topology::from_u32(raw).unwrap_or(mode),
                    first_index,
                    count,
                    instance_count,
                    Some(format),
                )),
                Token::DrawArraysInstanced {
                    mode: raw,
                    count,
                    instance_count,
                    first,
                    ..
                } => Some(draw(
                    Topology::from_u32(raw).unwrap_or(mode),
                    first,
                    count,
                    instance_count,
                    None,
                )),
                _ => None,
            };
            if let Some(record) = record {
                trace!(?record, "hardware draw");
                self.draws.push(record);
            }
        }
        Ok(())
    }

    fn record_draw(&mut self, draw: DrawRecord) {
        trace!(record = ?draw, "baseline draw");
        self.draws.push(draw);
    }
}

impl CommandListDevice for RecordingDevice {
    fn create_state(&mut self) -> Result<StateId, DeviceError> {
        let state = StateId(self.next_id());
        self.states.insert(state, None);
        self.calls.push(DeviceCall::CreateState(state));
        Ok(state)
    }

    fn capture_state(&mut self, state: StateId, mode: Topology) -> Result<(), DeviceError> {
        let slot = self
            .states
            .get_mut(&state)
            .ok_or(DeviceError::UnknownState(state))?;
        *slot = Some(CapturedState { mode });
        self.calls.push(DeviceCall::CaptureState { state, mode });
        Ok(())
    }

    fn delete_state(&mut self, state: StateId) {
        self.states.remove(&state);
        self.calls.push(DeviceCall::DeleteState(state));
    }

    fn create_command_list(&mut self) -> Result<ListId, DeviceError> {
        let list = ListId(self.next_id());
        self.lists.insert(list, RecordedList::default());
        self.calls.push(DeviceCall::CreateList(list));
        Ok(list)
    }

    fn list_draw_commands_states_client(
        &mut self,
        list: ListId,
        tokens: &[&[u8]],
        states: &[StateId],
        surfaces: &[SurfaceId],
    ) -> Result<(), DeviceError> {
        if tokens.len() != states.len() || tokens.len() != surfaces.len() {
            return Err(DeviceError::BatchArrayMismatch);
        }
        let recorded = self
            .lists
            .get_mut(&list)
            .ok_or(DeviceError::UnknownList(list))?;
        recorded.batches = tokens
            .iter()
            .zip(states)
            .zip(surfaces)
            .map(|((t, s), f)| (t.to_vec(), *s, *f))
            .collect();
        recorded.compiled = false;
        self.calls.push(DeviceCall::FillList {
            list,
            batches: tokens.len(),
        });
        Ok(())
    }

    fn compile_command_list(&mut self, list: ListId) -> Result<(), DeviceError> {
        self.lists
            .get_mut(&list)
            .ok_or(DeviceError::UnknownList(list))?
            .compiled = true;
        self.calls.push(DeviceCall::CompileList(list));
        Ok(())
    }

    fn call_command_list(&mut self, list: ListId) -> Result<(), DeviceError> {
        let recorded = self.lists.get(&list).ok_or(DeviceError::UnknownList(list))?;
        if !recorded.compiled {
            return Err(DeviceError::ListNotCompiled(list));
        }
        let batches = recorded.batches.clone();
        self.calls.push(DeviceCall::CallList(list));

        let headers = HeaderTable::from_device(&*self)?;
        for (tokens, state, surface) in &batches {
            self.execute_batch(&headers, tokens, *state, *surface)?;
        }
        Ok(())
    }

    fn delete_command_list(&mut self, list: ListId) {
        self.lists.remove(&list);
        self.calls.push(DeviceCall::DeleteList(list));
    }

    fn draw_commands_states_address(
        &mut self,
        addresses: &[u64],
        sizes: &[u32],
        states: &[StateId],
        surfaces: &[SurfaceId],
    ) -> Result<(), DeviceError> {
        let n = addresses.len();
        if sizes.len() != n || states.len() != n || surfaces.len() != n {
            return Err(DeviceError::BatchArrayMismatch);
        }
        self.calls.push(DeviceCall::SubmitAddress { batches: n });

        let headers = HeaderTable::from_device(&*self)?;
        for i in 0..n {
            let tokens = self.read_range(addresses[i], sizes[i])?;
            self.execute_batch(&headers, &tokens, states[i], surfaces[i])?;
        }
        Ok(())
    }
}

impl BaselineDevice for RecordingDevice {
    fn create_buffer(
        &mut self,
        data: &[u8],
        access: BufferAccess,
    ) -> Result<ResidentBuffer, DeviceError> {
        let id = BufferId(self.next_id());
        let address = self.next_address;
        let size = data.len() as u64;
        self.next_address += align_up(size.max(MIN_ALLOCATION), MIN_ALLOCATION);

        self.buffers.insert(
            address,
            StoredBuffer {
                id,
                access,
                data: data.to_vec(),
            },
        );
        self.buffer_addresses.insert(id, address);
        self.calls.push(DeviceCall::CreateBuffer {
            id,
            address,
            size,
            access,
        });
        Ok(ResidentBuffer { id, address, size })
    }

    fn update_buffer(
        &mut self,
        buffer: &ResidentBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let address = *self
            .buffer_addresses
            .get(&buffer.id)
            .ok_or(DeviceError::UnknownBuffer(buffer.id))?;
        let stored = self
            .buffers
            .get_mut(&address)
            .ok_or(DeviceError::UnknownBuffer(buffer.id))?;
        if !stored.access.contains(BufferAccess::WRITE) {
            return Err(DeviceError::BufferNotWritable(buffer.id));
        }
        let size = stored.data.len() as u64;
        let end = offset.checked_add(data.len() as u64);
        match end {
            Some(end) if end <= size => {
                stored.data[offset as usize..end as usize].copy_from_slice(data);
            }
            _ => {
                return Err(DeviceError::BufferOverrun {
                    buffer: stored.id,
                    offset,
                    len: data.len(),
                    size,
                })
            }
        }
        self.calls.push(DeviceCall::UpdateBuffer {
            id: buffer.id,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if let Some(address) = self.buffer_addresses.remove(&buffer) {
            self.buffers.remove(&address);
        }
        self.calls.push(DeviceCall::DeleteBuffer(buffer));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = program;
        self.calls.push(DeviceCall::UseProgram(program));
    }

    fn current_program(&self) -> ProgramId {
        self.program
    }

    fn enable_vertex_attrib(&mut self, slot: u32, enabled: bool) {
        if let Some(a) = self.attribs.get_mut(slot as usize) {
            a.enabled = enabled;
        }
        self.calls.push(DeviceCall::EnableAttrib { slot, enabled });
    }

    fn vertex_attrib_enabled(&self, slot: u32) -> bool {
        self.attribs
            .get(slot as usize)
            .is_some_and(|a| a.enabled)
    }

    fn set_vertex_attrib_format(&mut self, slot: u32, format: AttribFormat) {
        if let Some(a) = self.attribs.get_mut(slot as usize) {
            a.format = format;
        }
        self.calls.push(DeviceCall::AttribFormat { slot, format });
    }

    fn vertex_attrib_format(&self, slot: u32) -> AttribFormat {
        self.attribs
            .get(slot as usize)
            .map(|a| a.format)
            .unwrap_or_default()
    }

    fn set_polygon_offset_fill(&mut self, enabled: bool) {
        self.polygon_offset_fill = enabled;
        self.calls.push(DeviceCall::PolygonOffsetFill(enabled));
    }

    fn bind_framebuffer(&mut self, surface: SurfaceId) {
        self.framebuffer = surface;
        self.calls.push(DeviceCall::BindFramebuffer(surface));
    }

    fn buffer_address_range(&mut self, target: BufferTarget, address: u64, len: u64) {
        self.calls.push(DeviceCall::AddressRange {
            target,
            address,
            len,
        });
    }

    fn draw_arrays(&mut self, mode: Topology, first: u32, count: u32) {
        self.record_draw(DrawRecord {
            mode,
            first,
            count,
            instances: 1,
            index_format: None,
            surface: self.framebuffer,
        });
    }

    fn draw_elements_base_vertex(
        &mut self,
        mode: Topology,
        count: u32,
        format: IndexFormat,
        byte_offset: u64,
        _base_vertex: u32,
    ) {
        self.record_draw(DrawRecord {
            mode,
            first: (byte_offset / u64::from(format.size_bytes())) as u32,
            count,
            instances: 1,
            index_format: Some(format),
            surface: self.framebuffer,
        });
    }

    fn draw_arrays_indirect(&mut self, mode: Topology, args: &DrawArraysIndirectArgs) {
        self.record_draw(DrawRecord {
            mode,
            first: args.first,
            count: args.count,
            instances: args.instance_count,
            index_format: None,
            surface: self.framebuffer,
        });
    }

    fn draw_elements_indirect(
        &mut self,
        mode: Topology,
        format: IndexFormat,
        args: &DrawElementsIndirectArgs,
    ) {
        self.record_draw(DrawRecord {
            mode,
            first: args.first_index,
            count: args.count,
            instances: args.instance_count,
            index_format: Some(format),
            surface: self.framebuffer,
        });
    }

    fn blend_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.calls
            .push(DeviceCall::BlendColor([red, green, blue, alpha]));
    }

    fn line_width(&mut self, width: f32) {
        self.calls.push(DeviceCall::LineWidth(width));
    }

    fn polygon_offset(&mut self, scale: f32, bias: f32) {
        self.calls.push(DeviceCall::PolygonOffset { scale, bias });
    }

    fn viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.calls.push(DeviceCall::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.calls.push(DeviceCall::Scissor {
            x,
            y,
            width,
            height,
        });
    }
}
