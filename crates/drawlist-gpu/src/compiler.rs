//! Scene to token stream compilation.
//!
//! The compiler walks meshes and primitive groups in asset order (or once per topology family in
//! sorted mode), emits only the uniform, attribute and draw tokens whose bindings changed, and
//! cuts a new batch whenever the state key or the primitive-restart setting changes. Batches are
//! recorded as body-stream offsets and resolved to addresses after upload.

use drawlist_protocol::{HeaderTable, ShaderStage, TokenWriter, Topology};
use tracing::{debug, warn};

use crate::batch::{BatchList, StreamSlot};
use crate::config::GroupingStrategy;
use crate::device::{Device, ProgramId, SurfaceId};
use crate::error::DrawListError;
use crate::mesh::Mesh;
use crate::registry::{StateKey, StateRegistry};
use crate::resident::MeshPlacement;
use crate::stats::RenderStats;
use crate::uniforms::{entry_address, UBO_LIGHT, UBO_MATERIAL, UBO_MATRIX, UBO_MATRIXOBJ};

/// Pass order of [`GroupingStrategy::SortedByTopology`]. The fan pass never records anything
/// since fans have no state object; it is kept so pass logs line up with the other paths.
pub const SORTED_PASSES: [Topology; 5] = [
    Topology::Lines,
    Topology::Triangles,
    Topology::TriangleFan,
    Topology::Quads,
    Topology::Points,
];

/// Polygon offset applied to filled geometry so the line pass wins depth ties.
pub const FILL_POLYGON_OFFSET: (f32, f32) = (1.0, 1.0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Programs {
    pub mesh: ProgramId,
    pub mesh_line: ProgramId,
    pub grid: ProgramId,
}

/// Device addresses of one packed vertex/index buffer pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkAddresses {
    pub vertices: u64,
    pub indices: u64,
}

/// Everything the stream points at.
#[derive(Clone, Copy, Debug)]
pub struct StreamTargets<'a> {
    pub matrices: u64,
    pub light: u64,
    pub materials: u64,
    pub transforms: u64,
    pub chunks: &'a [ChunkAddresses],
    /// One per mesh, parallel to the mesh list.
    pub placements: &'a [MeshPlacement],
}

#[derive(Clone, Copy, Debug)]
pub struct CompileParams {
    pub grouping: GroupingStrategy,
    pub supersampling: f32,
    pub surface: SurfaceId,
    pub programs: Programs,
    /// Byte length of the shared viewport header stream, recorded as the first batch.
    pub header_size: usize,
}

#[derive(Clone, Debug, Default)]
pub struct CompiledStream {
    pub tokens: Vec<u8>,
    pub batches: BatchList,
    pub stats: RenderStats,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    key: StateKey,
    restart: Option<u32>,
}

struct Compiler<'a, D: ?Sized> {
    device: &'a mut D,
    registry: &'a mut StateRegistry,
    writer: TokenWriter,
    batches: BatchList,
    stats: RenderStats,
    targets: &'a StreamTargets<'a>,
    params: &'a CompileParams,
    span: Option<Span>,
    next_start: usize,
    cur_material: Option<u32>,
    cur_transform: Option<u32>,
    enabled_attribs: usize,
}

/// Record `meshes` into a fresh token stream.
///
/// Mesh 0 is a placeholder in every asset and is never recorded. The returned batches start with
/// the viewport header batch and are not yet resolved.
pub fn compile_stream<D: Device + ?Sized>(
    device: &mut D,
    registry: &mut StateRegistry,
    headers: HeaderTable,
    meshes: &[Mesh],
    targets: &StreamTargets<'_>,
    params: &CompileParams,
) -> Result<CompiledStream, DrawListError> {
    let mut batches = BatchList::new();
    let header_state = registry.capture_detached(device, Topology::Triangles)?;
    batches.push(
        StreamSlot::Header,
        0,
        params.header_size,
        header_state,
        params.surface,
    );

    let mut c = Compiler {
        device,
        registry,
        writer: TokenWriter::new(headers),
        batches,
        stats: RenderStats::default(),
        targets,
        params,
        span: None,
        next_start: 0,
        cur_material: None,
        cur_transform: None,
        enabled_attribs: 0,
    };
    c.prefix();

    match params.grouping {
        GroupingStrategy::Unsorted => {
            c.pass(meshes, None)?;
        }
        GroupingStrategy::SortedByTopology => {
            for pass in SORTED_PASSES {
                c.cur_material = None;
                c.cur_transform = None;
                c.enabled_attribs = 0;
                let before = c.stats.drawcalls;
                c.pass(meshes, Some(pass))?;
                debug!(?pass, draws = c.stats.drawcalls - before, "sorted pass recorded");
            }
        }
    }
    c.close_span()?;

    Ok(CompiledStream {
        tokens: c.writer.finish(),
        batches: c.batches,
        stats: c.stats,
    })
}

impl<D: Device + ?Sized> Compiler<'_, D> {
    fn prefix(&mut self) {
        let t = self.targets;
        self.writer.line_width(self.params.supersampling);
        self.writer
            .uniform_address(UBO_MATRIX, ShaderStage::Vertex, t.matrices);
        self.writer
            .uniform_address(UBO_MATRIXOBJ, ShaderStage::Vertex, t.transforms);
        self.writer
            .uniform_address(UBO_LIGHT, ShaderStage::Fragment, t.light);
        self.stats.uniform_update += 3;
    }

    fn pass(&mut self, meshes: &[Mesh], filter: Option<Topology>) -> Result<(), DrawListError> {
        let targets = self.targets;
        for (mesh_index, mesh) in meshes.iter().enumerate().skip(1) {
            let placement = targets.placements.get(mesh_index);
            let mut attributes_emitted = false;

            for (group_index, group) in mesh.prim_groups.iter().enumerate() {
                let Some(canonical) = group.topology.canonical() else {
                    // Sorted mode reports these once, in the fan pass.
                    if filter.is_some_and(|f| f != Topology::TriangleFan) {
                        continue;
                    }
                    warn!(
                        mesh = mesh_index,
                        group = group_index,
                        topology = ?group.topology,
                        "skipping primitive group with unsupported topology"
                    );
                    continue;
                };
                if let Some(filter) = filter {
                    if canonical != filter {
                        continue;
                    }
                }
                let count = group.element_count();
                if count == 0 {
                    continue;
                }
                let Some(placement) = placement else {
                    warn!(mesh = mesh_index, "mesh has no packed geometry");
                    break;
                };

                let program = if canonical == Topology::Lines {
                    self.params.programs.mesh_line
                } else {
                    self.params.programs.mesh
                };
                let key = StateKey {
                    topology: canonical,
                    program,
                    layout: mesh.layout(),
                };
                self.cut_if_changed(key, group.prim_restart_index)?;

                self.device.use_program(program);
                if canonical == Topology::Lines {
                    self.device.set_polygon_offset_fill(false);
                } else {
                    let (scale, bias) = FILL_POLYGON_OFFSET;
                    self.device.set_polygon_offset_fill(true);
                    self.device.polygon_offset(scale, bias);
                }

                if !attributes_emitted {
                    self.attributes(mesh, placement);
                    attributes_emitted = true;
                }

                let transform = group.transform.or(mesh.transform);
                if transform.is_some() && transform != self.cur_transform {
                    if let Some(id) = transform {
                        self.writer.uniform_address(
                            UBO_MATRIXOBJ,
                            ShaderStage::Vertex,
                            entry_address(targets.transforms, id),
                        );
                        self.stats.uniform_update += 1;
                    }
                    self.cur_transform = transform;
                }
                if group.material.is_some() && group.material != self.cur_material {
                    if let Some(id) = group.material {
                        self.writer.uniform_address(
                            UBO_MATERIAL,
                            ShaderStage::Fragment,
                            entry_address(targets.materials, id),
                        );
                        self.stats.uniform_update += 1;
                    }
                    self.cur_material = group.material;
                }

                match placement.group_offsets.get(group_index).copied().flatten() {
                    Some(index_offset) if group.is_indexed() => {
                        let chunk = self.chunk(placement.chunk);
                        self.writer
                            .element_address(chunk.indices + index_offset, group.index_format);
                        self.writer.draw_elements(group.topology, count);
                    }
                    _ => {
                        self.writer.draw_arrays(group.topology, count);
                    }
                }
                self.stats.primitives += u64::from(group.topology.primitive_count(count));
                self.stats.drawcalls += 1;
            }
        }
        Ok(())
    }

    fn chunk(&self, chunk: usize) -> ChunkAddresses {
        self.targets.chunks.get(chunk).copied().unwrap_or_default()
    }

    /// One attribute token per vertex attribute of `mesh`, pointing at the start of the slot it
    /// reads, and the matching device formats.
    fn attributes(&mut self, mesh: &Mesh, placement: &MeshPlacement) {
        let vertices = self.chunk(placement.chunk).vertices;
        let n = mesh.attributes.len();
        for (index, attribute) in mesh.attributes.iter().enumerate() {
            match placement.slot_offsets.get(attribute.slot as usize) {
                Some(offset) => {
                    self.writer
                        .attribute_address(index as u32, vertices + offset);
                    self.stats.attr_update += 1;
                }
                None => warn!(
                    attribute = index,
                    slot = attribute.slot,
                    "attribute reads a slot the mesh does not have"
                ),
            }
            self.device
                .set_vertex_attrib_format(index as u32, attribute.format());
            self.device.enable_vertex_attrib(index as u32, true);
        }
        for index in n..self.enabled_attribs {
            self.device.enable_vertex_attrib(index as u32, false);
        }
        self.enabled_attribs = n;
    }

    fn cut_if_changed(&mut self, key: StateKey, restart: Option<u32>) -> Result<(), DrawListError> {
        match self.span {
            Some(span) if span.key == key && span.restart == restart => return Ok(()),
            Some(_) => self.close_span()?,
            None => {}
        }
        self.span = Some(Span {
            start: self.next_start,
            key,
            restart,
        });
        Ok(())
    }

    fn close_span(&mut self) -> Result<(), DrawListError> {
        let Some(span) = self.span.take() else {
            return Ok(());
        };
        let size = self.writer.len() - span.start;
        self.next_start = self.writer.len();
        if size == 0 {
            return Ok(());
        }
        match self.registry.find_or_create(self.device, &span.key)? {
            Some(state) => {
                self.batches.push(
                    StreamSlot::Body,
                    span.start,
                    size,
                    state,
                    self.params.surface,
                );
            }
            None => warn!(topology = ?span.key.topology, "dropping span without a state object"),
        }
        Ok(())
    }
}
