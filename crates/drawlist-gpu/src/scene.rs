//! Scene orchestration: resources shared by every model, the grid, and the per-frame dispatch.

use bytemuck::Zeroable;
use drawlist_protocol::HeaderTable;
use glam::{Mat4, Vec3};
use tracing::{debug, info};

use crate::compiler::Programs;
use crate::config::{RenderConfig, SceneManifest};
use crate::device::{header_table, BaselineDevice, Device, SurfaceId};
use crate::error::DrawListError;
use crate::grid::Grid;
use crate::mesh::AssetProvider;
use crate::model::Model;
use crate::resident::{BufferAccess, ResidentBuffer};
use crate::stats::RenderStats;
use crate::uniforms::{LightBuffer, MatrixBufferGlobal, LIGHT_DIRECTION};
use crate::viewport::ViewportHeader;

/// Camera input of one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameView {
    pub view: Mat4,
    pub projection: Mat4,
    /// Point the grid cross is drawn around.
    pub focus: Vec3,
}

impl FrameView {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

impl Default for FrameView {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            focus: Vec3::ZERO,
        }
    }
}

/// Device objects every model and the grid point into.
#[derive(Debug)]
pub struct SharedResources {
    pub headers: HeaderTable,
    pub programs: Programs,
    pub matrices: ResidentBuffer,
    pub light: ResidentBuffer,
    pub viewport: ViewportHeader,
}

impl SharedResources {
    pub fn new<D: Device + ?Sized>(
        device: &mut D,
        programs: Programs,
    ) -> Result<Self, DrawListError> {
        let headers = header_table(device)?;
        let matrices = device.create_buffer(
            bytemuck::bytes_of(&MatrixBufferGlobal::zeroed()),
            BufferAccess::READ | BufferAccess::WRITE,
        )?;
        let light = device.create_buffer(
            bytemuck::bytes_of(&LightBuffer::new(LIGHT_DIRECTION)),
            BufferAccess::READ,
        )?;
        Ok(Self {
            headers,
            programs,
            matrices,
            light,
            viewport: ViewportHeader::new(headers),
        })
    }

    pub fn write_matrices<D: BaselineDevice + ?Sized>(
        &self,
        device: &mut D,
        world: Mat4,
        view_projection: Mat4,
    ) -> Result<(), DrawListError> {
        let globals = MatrixBufferGlobal::new(world, view_projection);
        device.update_buffer(&self.matrices, 0, bytemuck::bytes_of(&globals))?;
        Ok(())
    }

    pub fn release<D: BaselineDevice + ?Sized>(&mut self, device: &mut D) {
        self.viewport.release(device);
        device.delete_buffer(self.matrices.id);
        device.delete_buffer(self.light.id);
    }
}

#[derive(Debug)]
pub struct Scene {
    shared: SharedResources,
    grid: Grid,
    models: Vec<Model>,
    config: RenderConfig,
    surface: SurfaceId,
    extent: Option<(u32, u32)>,
}

impl Scene {
    /// Validate the device and create the shared resources.
    pub fn init<D: Device + ?Sized>(
        device: &mut D,
        programs: Programs,
        config: RenderConfig,
    ) -> Result<Self, DrawListError> {
        config.validate()?;
        Ok(Self {
            shared: SharedResources::new(device, programs)?,
            grid: Grid::new(),
            models: Vec::new(),
            config,
            surface: SurfaceId(0),
            extent: None,
        })
    }

    /// Load every model of `manifest`. Models that fail to load stay in the scene, empty.
    pub fn load_manifest<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        assets: &dyn AssetProvider,
        manifest: &SceneManifest,
    ) -> Result<(), DrawListError> {
        for entry in &manifest.models {
            let model = Model::load(
                device,
                assets,
                entry,
                &self.config.search_paths,
                self.config.max_vertex_bytes(),
            )?;
            self.models.push(model);
        }
        info!(models = self.models.len(), "scene loaded");
        Ok(())
    }

    pub fn add_model(&mut self, model: Model) {
        self.models.push(model);
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut [Model] {
        &mut self.models
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn shared(&self) -> &SharedResources {
        &self.shared
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// Swap in a new configuration snapshot. Grouping and supersampling changes re-record on the
    /// next display.
    pub fn set_config<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        config: RenderConfig,
    ) -> Result<(), DrawListError> {
        config.validate()?;
        let resample = config.supersampling != self.config.supersampling;
        self.config = config;
        if resample {
            self.apply_supersampling(device)?;
        }
        Ok(())
    }

    pub fn set_supersampling<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        factor: f32,
    ) -> Result<(), DrawListError> {
        let mut config = self.config.clone();
        config.supersampling = factor;
        config.validate()?;
        self.config = config;
        self.apply_supersampling(device)
    }

    fn apply_supersampling<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
    ) -> Result<(), DrawListError> {
        let factor = self.config.supersampling;
        for model in &mut self.models {
            model.invalidate();
        }
        if let Some((width, height)) = self.extent {
            self.shared
                .viewport
                .update(device, 0, 0, width, height, factor)?;
        }
        debug!(factor, "supersampling changed");
        Ok(())
    }

    /// The target surface was recreated at a new size.
    pub fn reshape<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        width: u32,
        height: u32,
        surface: SurfaceId,
    ) -> Result<(), DrawListError> {
        self.shared.viewport.update(
            device,
            0,
            0,
            width,
            height,
            self.config.supersampling,
        )?;
        self.extent = Some((width, height));
        self.surface = surface;

        for model in &mut self.models {
            model.update_surface_target(surface);
            model.init_command_list(device, &self.shared)?;
        }
        self.grid.update_surface(surface);
        debug!(width, height, ?surface, "reshaped");
        Ok(())
    }

    pub fn display<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        frame: &FrameView,
    ) -> Result<(), DrawListError> {
        let config = &self.config;
        if config.path.uses_tokens() && self.shared.viewport.buffer().is_none() {
            return Err(DrawListError::MissingViewportHeader);
        }
        if config.draw_grid {
            self.grid
                .display(device, &self.shared, frame, config.path, self.surface)?;
        }
        if config.draw_objects {
            for model in &mut self.models {
                model.display(device, &self.shared, frame, config, self.surface)?;
            }
        }
        Ok(())
    }

    /// Recording counters summed over every model.
    pub fn stats(&self) -> RenderStats {
        let mut total = RenderStats::default();
        for model in &self.models {
            total += model.stats();
        }
        total
    }

    /// Release every model, the grid and the shared resources.
    pub fn shutdown<D: Device + ?Sized>(&mut self, device: &mut D) {
        for model in &mut self.models {
            model.release(device);
        }
        self.models.clear();
        self.grid.release(device);
        self.shared.release(device);
    }
}
