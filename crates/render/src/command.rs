use frameline_common::{Bounds, MaterialId, MeshId, PipelineId, TextureHandle, Transform};
use serde::{Deserialize, Serialize};

/// Which pass list a command belongs to.
///
/// Declaration order is draw order: deferred geometry first, tools last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RenderBucket {
    /// Opaque geometry lit in the deferred pass.
    Deferrable,
    /// Opaque geometry that needs forward shading.
    Forward,
    /// Blended geometry, drawn after the sky.
    Transparent,
    /// Editor overlays (gizmos, selection outlines).
    Tool,
}

impl RenderBucket {
    pub const ALL: [RenderBucket; 4] = [
        RenderBucket::Deferrable,
        RenderBucket::Forward,
        RenderBucket::Transparent,
        RenderBucket::Tool,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CullMode {
    None,
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    Opaque,
    Alpha,
    Additive,
}

/// Per-command overrides of the pipeline's default fixed-function state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderStateOverride {
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull: CullMode,
    pub blend: BlendMode,
}

impl Default for RenderStateOverride {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            cull: CullMode::Back,
            blend: BlendMode::Opaque,
        }
    }
}

/// A draw request close to the GPU.
///
/// Plain value: every resource is referenced by handle. The meshes and
/// materials behind the handles are kept alive by the cache for the
/// duration of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderCommand {
    pub pipeline: PipelineId,
    pub material: MaterialId,
    pub mesh: MeshId,
    pub texture: TextureHandle,
    pub transform: Transform,
    /// World-space bounds for culling. `None` is never culled.
    pub bounds: Option<Bounds>,
    pub state: Option<RenderStateOverride>,
    pub bucket: RenderBucket,
    pub casts_shadow: bool,
}

impl RenderCommand {
    pub fn new(pipeline: PipelineId, material: MaterialId, mesh: MeshId) -> Self {
        Self {
            pipeline,
            material,
            mesh,
            texture: TextureHandle::INVALID,
            transform: Transform::default(),
            bounds: None,
            state: None,
            bucket: RenderBucket::Deferrable,
            casts_shadow: false,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_texture(mut self, texture: TextureHandle) -> Self {
        self.texture = texture;
        self
    }

    pub fn with_state(mut self, state: RenderStateOverride) -> Self {
        self.state = Some(state);
        self
    }

    pub fn in_bucket(mut self, bucket: RenderBucket) -> Self {
        self.bucket = bucket;
        self
    }

    pub fn casting_shadow(mut self) -> Self {
        self.casts_shadow = true;
        self
    }

    /// Ordering key: pipeline, then material, then mesh.
    pub fn sort_key(&self) -> (PipelineId, MaterialId, MeshId) {
        (self.pipeline, self.material, self.mesh)
    }
}
