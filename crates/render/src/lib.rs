//! Render command queue: per-frame collection, classification and sorting
//! of draw requests.
//!
//! # Invariants
//! - The queue holds exactly one frame: `clear` must precede the first `add`.
//! - Sorted order is (pipeline, material, mesh), stable for ties.
//! - Commands carry handles only; they never own GPU resources.
//! - Traversal takes `&self`, so the queue cannot change mid-iteration.

mod batch;
mod command;
mod queue;
mod renderer;

pub use batch::{Batch, StateChanges};
pub use command::{BlendMode, CullMode, RenderBucket, RenderCommand, RenderStateOverride};
pub use queue::{Culling, FramePhase, RenderCommandQueue, RenderQueueError};
pub use renderer::{DebugTextRenderer, Renderer};

pub fn crate_info() -> &'static str {
    "frameline-render v0.1.0"
}
