//! Frame-loop plumbing: the GPU-thread job queue and the background loader.
//!
//! # Invariants
//! - GPU jobs run only on the thread that first called `run_once`, in the
//!   order each producer submitted them.
//! - After shutdown no new work is accepted; work accepted before it is
//!   either run (GPU jobs, loader jobs) or reported as dropped.
//! - A panicking job never unwinds into the frame loop or a loader worker.

mod config;
mod engine;
mod error;
mod loader;

pub use config::EngineConfig;
pub use engine::{EngineHandle, FrameReport, GpuJob, RenderEngine};
pub use error::{EngineError, EngineResult};
pub use loader::ResourceLoader;

pub fn crate_info() -> &'static str {
    "frameline-engine v0.1.0"
}
