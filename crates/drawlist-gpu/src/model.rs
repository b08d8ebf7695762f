//! One mesh asset: its resident buffers, its recorded stream and the paths that draw it.

use std::path::{Path, PathBuf};

use drawlist_protocol::Topology;
use glam::{Mat4, Vec3};
use tracing::{debug, error, info};

use crate::batch::TokenSources;
use crate::compiler::{
    compile_stream, ChunkAddresses, CompileParams, CompiledStream, StreamTargets,
    FILL_POLYGON_OFFSET,
};
use crate::config::{GroupingStrategy, ModelEntry, RenderConfig, RenderPath};
use crate::device::{BufferTarget, Device, SurfaceId};
use crate::error::DrawListError;
use crate::mesh::{Aabb, AssetProvider, MeshFile, TRACKED_ATTRIB_SLOTS};
use crate::registry::StateRegistry;
use crate::replay::{replay_batches, submit_indirect, CompiledCommandList};
use crate::resident::{pack_geometry, BufferAccess, MeshPlacement, ResidentBuffer};
use crate::scene::{FrameView, SharedResources};
use crate::stats::RenderStats;
use crate::uniforms::{
    entry_address, material_table, transform_table, UBO_LIGHT, UBO_MATERIAL, UBO_MATRIX,
    UBO_MATRIXOBJ, UNIFORM_ENTRY_BYTES,
};

/// Extent below which auto-fit leaves the scale alone.
const MIN_FIT_EXTENT: f32 = 0.001;
/// Starting box of the auto-fit bounds.
const FIT_BOUNDS_START: f32 = 1000.0;

#[derive(Clone, Copy, Debug)]
struct GeometryBuffers {
    vertices: ResidentBuffer,
    indices: Option<ResidentBuffer>,
}

/// Settings a recorded stream depends on. A change forces a new recording.
#[derive(Clone, Copy, Debug, PartialEq)]
struct RecordKey {
    grouping: GroupingStrategy,
    supersampling: f32,
}

#[derive(Debug, Default)]
pub struct Model {
    name: String,
    file: MeshFile,
    offset: Vec3,
    scale: f32,

    geometry: Vec<GeometryBuffers>,
    placements: Vec<MeshPlacement>,
    materials: Option<ResidentBuffer>,
    transforms: Option<ResidentBuffer>,
    token_buffer: Option<ResidentBuffer>,

    stream: CompiledStream,
    registry: StateRegistry,
    list: CompiledCommandList,
    recorded: Option<RecordKey>,
    surface: SurfaceId,
}

impl Model {
    /// Find `entry.name` (as given, then under each search path) and build its buffers.
    ///
    /// A missing or unreadable asset is logged and yields an empty model.
    pub fn load<D: Device + ?Sized>(
        device: &mut D,
        assets: &dyn AssetProvider,
        entry: &ModelEntry,
        search_paths: &[PathBuf],
        max_vertex_bytes: u64,
    ) -> Result<Self, DrawListError> {
        let mut last_error = None;
        for path in candidate_paths(&entry.name, search_paths) {
            match assets.load(&path) {
                Ok(file) => {
                    if let Err(err) = file.validate() {
                        debug!(path = %path.display(), %err, "model data rejected");
                        last_error = Some(err);
                        break;
                    }
                    info!(name = %entry.name, path = %path.display(), "model loaded");
                    return Self::from_mesh_file(
                        device,
                        &entry.name,
                        file,
                        entry.position,
                        entry.scale,
                        max_vertex_bytes,
                    );
                }
                Err(err) => {
                    debug!(path = %path.display(), %err, "model not found here");
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => error!(name = %entry.name, %err, "error in loading model"),
            None => error!(name = %entry.name, "error in loading model"),
        }
        Ok(Self {
            name: entry.name.clone(),
            offset: entry.position,
            scale: entry.scale,
            ..Self::default()
        })
    }

    /// Build resident buffers for an already parsed asset.
    pub fn from_mesh_file<D: Device + ?Sized>(
        device: &mut D,
        name: &str,
        file: MeshFile,
        position: Vec3,
        scale: f32,
        max_vertex_bytes: u64,
    ) -> Result<Self, DrawListError> {
        file.validate()?;
        let mut model = Self {
            name: name.to_owned(),
            file,
            offset: position,
            scale,
            ..Self::default()
        };
        model.build_buffers(device, max_vertex_bytes)?;
        if model.scale <= 0.0 {
            model.auto_fit();
        }
        Ok(model)
    }

    fn build_buffers<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        max_vertex_bytes: u64,
    ) -> Result<(), DrawListError> {
        let packed = pack_geometry(&self.file.meshes, max_vertex_bytes);
        for chunk in &packed.chunks {
            let vertices = device.create_buffer(&chunk.vertices, BufferAccess::READ)?;
            let indices = if chunk.indices.is_empty() {
                None
            } else {
                Some(device.create_buffer(&chunk.indices, BufferAccess::READ)?)
            };
            self.geometry.push(GeometryBuffers { vertices, indices });
        }
        self.placements = packed.placements;

        let materials = material_table(&self.file.materials);
        self.materials =
            Some(device.create_buffer(bytemuck::cast_slice(&materials), BufferAccess::READ)?);
        let transforms = transform_table(&self.file.transforms);
        self.transforms =
            Some(device.create_buffer(bytemuck::cast_slice(&transforms), BufferAccess::READ)?);

        debug!(
            name = %self.name,
            chunks = self.geometry.len(),
            materials = materials.len(),
            transforms = transforms.len(),
            "model buffers resident"
        );
        Ok(())
    }

    /// Center the asset and scale it into the unit cube.
    fn auto_fit(&mut self) {
        let mut bounds = Aabb {
            min: Vec3::splat(FIT_BOUNDS_START),
            max: Vec3::splat(-FIT_BOUNDS_START),
        };
        for mesh in &self.file.meshes {
            if let Some(b) = mesh.bounds.or_else(|| mesh.compute_bounds()) {
                bounds.min = bounds.min.min(b.min);
                bounds.max = bounds.max.max(b.max);
            }
        }
        self.offset = (bounds.min + bounds.max) * 0.5;
        let bigger = (bounds.max - bounds.min).max_element().max(0.0);
        if bigger > MIN_FIT_EXTENT {
            self.scale = 1.0 / bigger;
            debug!(name = %self.name, scale = self.scale, "scaling the model");
        }
        self.offset *= self.scale;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_loaded(&self) -> bool {
        !self.file.meshes.is_empty()
    }

    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn stream(&self) -> &CompiledStream {
        &self.stream
    }

    pub fn stats(&self) -> RenderStats {
        self.stream.stats
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn command_list(&self) -> &CompiledCommandList {
        &self.list
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn is_recorded(&self) -> bool {
        self.recorded.is_some()
    }

    /// Object transform applied on top of the view.
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_x(-90f32.to_radians())
            * Mat4::from_translation(-self.offset)
            * Mat4::from_scale(Vec3::splat(self.scale))
    }

    /// Drop the recorded stream; the next token-path display records again.
    pub fn invalidate(&mut self) {
        self.recorded = None;
    }

    fn release_stream<D: Device + ?Sized>(&mut self, device: &mut D) {
        if let Some(buffer) = self.token_buffer.take() {
            device.delete_buffer(buffer.id);
        }
        self.registry.release_all(device);
        self.list.release(device);
        self.stream = CompiledStream::default();
    }

    /// Record the token stream against `surface`, upload it and build the command list.
    pub fn record<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        shared: &SharedResources,
        config: &RenderConfig,
        surface: SurfaceId,
    ) -> Result<(), DrawListError> {
        self.release_stream(device);
        let header_address = shared.viewport.address()?;

        let chunks: Vec<ChunkAddresses> = self
            .geometry
            .iter()
            .map(|g| ChunkAddresses {
                vertices: g.vertices.address,
                indices: g.indices.map_or(0, |b| b.address),
            })
            .collect();
        let targets = StreamTargets {
            matrices: shared.matrices.address,
            light: shared.light.address,
            materials: self.materials.map_or(0, |b| b.address),
            transforms: self.transforms.map_or(0, |b| b.address),
            chunks: &chunks,
            placements: &self.placements,
        };
        let params = CompileParams {
            grouping: config.grouping,
            supersampling: config.supersampling,
            surface,
            programs: shared.programs,
            header_size: shared.viewport.tokens().len(),
        };
        let mut stream = compile_stream(
            device,
            &mut self.registry,
            shared.headers,
            &self.file.meshes,
            &targets,
            &params,
        )?;

        let token_buffer = device.create_buffer(&stream.tokens, BufferAccess::READ)?;
        self.token_buffer = Some(token_buffer);
        stream.batches.resolve(header_address, token_buffer.address);
        self.stream = stream;
        self.surface = surface;
        self.recorded = Some(RecordKey {
            grouping: config.grouping,
            supersampling: config.supersampling,
        });

        let stats = self.stream.stats;
        info!(
            name = %self.name,
            token_bytes = self.stream.tokens.len(),
            batches = self.stream.batches.len(),
            states = self.registry.len(),
            attr_update = stats.attr_update,
            uniform_update = stats.uniform_update,
            drawcalls = stats.drawcalls,
            primitives = stats.primitives,
            "token stream recorded"
        );

        self.init_command_list(device, shared)
    }

    /// Rebuild the compiled list from the current batches. No-op without batches.
    pub fn init_command_list<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        shared: &SharedResources,
    ) -> Result<(), DrawListError> {
        let sources = TokenSources {
            header: shared.viewport.tokens(),
            body: &self.stream.tokens,
        };
        self.list.build(device, &self.stream.batches, sources)
    }

    /// Point every batch at `surface`. The compiled list is stale until
    /// [`Model::init_command_list`] runs.
    pub fn update_surface_target(&mut self, surface: SurfaceId) {
        self.surface = surface;
        self.stream.batches.update_surface(surface);
    }

    pub fn display<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        shared: &SharedResources,
        frame: &FrameView,
        config: &RenderConfig,
        surface: SurfaceId,
    ) -> Result<(), DrawListError> {
        shared.write_matrices(device, self.world_matrix(), frame.view_projection())?;
        if !self.is_loaded() {
            return Ok(());
        }

        if config.path.uses_tokens() {
            let key = RecordKey {
                grouping: config.grouping,
                supersampling: config.supersampling,
            };
            if self.recorded != Some(key) {
                self.record(device, shared, config, surface)?;
            } else if self.surface != surface {
                self.update_surface_target(surface);
                self.init_command_list(device, shared)?;
            }
        }

        match config.path {
            RenderPath::Immediate => self.draw_immediate(device, shared, surface),
            RenderPath::Emulation => {
                let sources = TokenSources {
                    header: shared.viewport.tokens(),
                    body: &self.stream.tokens,
                };
                let report = replay_batches(
                    device,
                    &shared.headers,
                    sources,
                    &self.stream.batches,
                    &self.registry,
                )?;
                debug!(name = %self.name, ?report, "emulated");
            }
            RenderPath::CompiledList => self.list.call(device)?,
            RenderPath::AddressIndirect => {
                submit_indirect(device, &self.stream.batches, config.batch_cap())?;
            }
        }
        Ok(())
    }

    /// Baseline draws straight from the mesh data, without tokens.
    fn draw_immediate<D: Device + ?Sized>(
        &self,
        device: &mut D,
        shared: &SharedResources,
        surface: SurfaceId,
    ) {
        let materials = self.materials.map_or(0, |b| b.address);
        let transforms = self.transforms.map_or(0, |b| b.address);

        device.bind_framebuffer(surface);
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
        device.buffer_address_range(
            BufferTarget::Uniform(UBO_MATRIXOBJ),
            transforms,
            UNIFORM_ENTRY_BYTES,
        );
        device.enable_vertex_attrib(0, true);

        let mut cur_material = None;
        let mut cur_transform = None;
        for (mesh_index, mesh) in self.file.meshes.iter().enumerate().skip(1) {
            let Some(placement) = self.placements.get(mesh_index) else {
                continue;
            };
            let Some(geometry) = self.geometry.get(placement.chunk) else {
                continue;
            };

            if mesh.transform.is_some() && mesh.transform != cur_transform {
                cur_transform = mesh.transform;
                bind_transform(device, transforms, cur_transform);
            }

            for (slot, attribute) in mesh.attributes.iter().take(TRACKED_ATTRIB_SLOTS).enumerate() {
                let slot = slot as u32;
                let Some(offset) = placement.slot_offsets.get(attribute.slot as usize) else {
                    continue;
                };
                let len = mesh
                    .slots
                    .get(attribute.slot as usize)
                    .map_or(0, |s| s.size_bytes());
                device.set_vertex_attrib_format(slot, attribute.format());
                device.enable_vertex_attrib(slot, true);
                device.buffer_address_range(
                    BufferTarget::VertexAttrib(slot),
                    geometry.vertices.address + offset,
                    len,
                );
            }
            if mesh.attributes.len() < TRACKED_ATTRIB_SLOTS {
                device.enable_vertex_attrib(1, false);
            }

            for (group_index, group) in mesh.prim_groups.iter().enumerate() {
                if group.material.is_some() && group.material != cur_material {
                    cur_material = group.material;
                    if let Some(id) = cur_material {
                        device.buffer_address_range(
                            BufferTarget::Uniform(UBO_MATERIAL),
                            entry_address(materials, id),
                            UNIFORM_ENTRY_BYTES,
                        );
                    }
                }
                if group.transform.is_some() && group.transform != cur_transform {
                    cur_transform = group.transform;
                    bind_transform(device, transforms, cur_transform);
                }

                if group.topology.canonical() == Some(Topology::Lines) {
                    device.set_polygon_offset_fill(false);
                    device.use_program(shared.programs.mesh_line);
                } else {
                    let (scale, bias) = FILL_POLYGON_OFFSET;
                    device.set_polygon_offset_fill(true);
                    device.polygon_offset(scale, bias);
                    device.use_program(shared.programs.mesh);
                }

                let count = group.element_count();
                let index_offset = placement.group_offsets.get(group_index).copied().flatten();
                match (index_offset, geometry.indices) {
                    (Some(offset), Some(indices)) => {
                        let len = u64::from(count) * u64::from(group.index_format.size_bytes());
                        device.buffer_address_range(
                            BufferTarget::Element,
                            indices.address + offset,
                            len,
                        );
                        device.draw_elements_base_vertex(
                            group.topology,
                            count,
                            group.index_format,
                            0,
                            0,
                        );
                    }
                    _ => device.draw_arrays(group.topology, 0, count),
                }
            }
        }
        device.enable_vertex_attrib(0, false);
        device.enable_vertex_attrib(1, false);
    }

    /// Release buffers, then state objects, then the command list.
    pub fn release<D: Device + ?Sized>(&mut self, device: &mut D) {
        let geometry = std::mem::take(&mut self.geometry);
        for g in &geometry {
            device.delete_buffer(g.vertices.id);
        }
        for indices in geometry.iter().filter_map(|g| g.indices) {
            device.delete_buffer(indices.id);
        }
        for buffer in [
            self.materials.take(),
            self.transforms.take(),
            self.token_buffer.take(),
        ]
        .into_iter()
        .flatten()
        {
            device.delete_buffer(buffer.id);
        }
        self.registry.release_all(device);
        self.list.release(device);
        self.stream = CompiledStream::default();
        self.recorded = None;
    }
}

fn bind_transform<D: Device + ?Sized>(device: &mut D, table: u64, id: Option<u32>) {
    if let Some(id) = id {
        device.buffer_address_range(
            BufferTarget::Uniform(UBO_MATRIXOBJ),
            entry_address(table, id),
            UNIFORM_ENTRY_BYTES,
        );
    }
}

/// Paths tried for `name`: the name itself, then the name under each search path.
pub fn candidate_paths(name: &str, search_paths: &[PathBuf]) -> Vec<PathBuf> {
    std::iter::once(Path::new(name).to_path_buf())
        .chain(search_paths.iter().map(|p| p.join(name)))
        .collect()
}
