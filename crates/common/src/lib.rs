//! Shared types for the frameline render pipeline.
//!
//! Everything here is a plain value: handles are opaque integers that refer
//! to resources owned elsewhere (the cache, or the GPU context behind the
//! render thread). Nothing in this crate owns GPU state.

mod key;
mod types;

pub use key::ResourceKey;
pub use types::{Bounds, MaterialId, MeshId, PipelineId, TextureHandle, Transform};

pub fn crate_info() -> &'static str {
    "frameline-common v0.1.0"
}
