use crate::batch::{Batch, StateChanges};
use crate::command::{RenderBucket, RenderCommand};
use glam::Vec3;

/// Errors from misusing the per-frame protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RenderQueueError {
    #[error("command added before clear(); the queue still holds the previous frame")]
    NotCleared,
    #[error("queue traversed before sort()")]
    NotSorted,
}

/// Where the queue is in the per-frame protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Never cleared. Adding is rejected.
    Idle,
    /// Between `clear` and `sort`.
    Collecting,
    /// Sorted and ready for the draw phase.
    Sorted,
}

/// Collection-time visibility test.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Culling {
    #[default]
    None,
    /// Keep commands whose bounds touch the sphere.
    Sphere { center: Vec3, radius: f32 },
}

impl Culling {
    pub fn is_visible(&self, command: &RenderCommand) -> bool {
        match (self, command.bounds) {
            (Culling::None, _) | (_, None) => true,
            (Culling::Sphere { center, radius }, Some(bounds)) => {
                bounds.intersects_sphere(*center, *radius)
            }
        }
    }
}

/// Per-frame draw command list.
///
/// Protocol, once per frame:
/// `clear` -> `add`/`add_culled` for every visible drawable -> `sort` ->
/// any number of `for_each_*`/`batches` traversals. Nothing persists across
/// frames.
///
/// Sorting is stable on (pipeline, material, mesh), so identical input
/// always yields identical output and ties keep their insertion order.
#[derive(Debug)]
pub struct RenderCommandQueue {
    commands: Vec<RenderCommand>,
    phase: FramePhase,
    culling: Culling,
    culled: usize,
}

impl Default for RenderCommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderCommandQueue {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            phase: FramePhase::Idle,
            culling: Culling::None,
            culled: 0,
        }
    }

    /// Start a new frame: drop last frame's commands and accept new ones.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.culled = 0;
        self.phase = FramePhase::Collecting;
    }

    /// Append one command. No deduplication, no culling.
    pub fn add(&mut self, command: RenderCommand) -> Result<(), RenderQueueError> {
        if self.phase != FramePhase::Collecting {
            tracing::warn!(
                phase = ?self.phase,
                "render command added without clear(); rejecting to avoid stale duplicates"
            );
            return Err(RenderQueueError::NotCleared);
        }
        self.commands.push(command);
        Ok(())
    }

    /// Append a command if it passes the current culling test.
    /// Returns whether it was kept.
    pub fn add_culled(&mut self, command: RenderCommand) -> Result<bool, RenderQueueError> {
        if self.phase == FramePhase::Collecting && !self.culling.is_visible(&command) {
            self.culled += 1;
            return Ok(false);
        }
        self.add(command).map(|()| true)
    }

    pub fn set_culling(&mut self, culling: Culling) {
        self.culling = culling;
    }

    pub fn culling(&self) -> Culling {
        self.culling
    }

    /// Commands rejected by culling since the last `clear`.
    pub fn culled_count(&self) -> usize {
        self.culled
    }

    /// Order by (pipeline, material, mesh); ties keep insertion order.
    pub fn sort(&mut self) {
        let _span = tracing::debug_span!("render_queue_sort", commands = self.commands.len()).entered();
        self.commands.sort_by_key(RenderCommand::sort_key);
        self.phase = FramePhase::Sorted;
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn bucket_len(&self, bucket: RenderBucket) -> usize {
        self.commands.iter().filter(|c| c.bucket == bucket).count()
    }

    /// Sorted view of every command. Each call starts from the beginning.
    pub fn sorted(&self) -> Result<&[RenderCommand], RenderQueueError> {
        match self.phase {
            FramePhase::Sorted => Ok(&self.commands),
            _ => Err(RenderQueueError::NotSorted),
        }
    }

    /// Visit every command in sorted order.
    pub fn for_each_sorted<F>(&self, mut visitor: F) -> Result<(), RenderQueueError>
    where
        F: FnMut(&RenderCommand),
    {
        self.sorted()?.iter().for_each(|c| visitor(c));
        Ok(())
    }

    /// Visit one bucket's commands in sorted order.
    pub fn for_each_in_bucket<F>(&self, bucket: RenderBucket, mut visitor: F) -> Result<(), RenderQueueError>
    where
        F: FnMut(&RenderCommand),
    {
        self.sorted()?
            .iter()
            .filter(|c| c.bucket == bucket)
            .for_each(|c| visitor(c));
        Ok(())
    }

    /// Visit shadow casters in sorted order, whatever their bucket.
    pub fn for_each_shadow_caster<F>(&self, mut visitor: F) -> Result<(), RenderQueueError>
    where
        F: FnMut(&RenderCommand),
    {
        self.sorted()?
            .iter()
            .filter(|c| c.casts_shadow)
            .for_each(|c| visitor(c));
        Ok(())
    }

    /// Runs of sorted commands sharing pipeline and material.
    pub fn batches(&self) -> Result<impl Iterator<Item = Batch<'_>>, RenderQueueError> {
        Ok(self
            .sorted()?
            .chunk_by(|a, b| a.pipeline == b.pipeline && a.material == b.material)
            .map(Batch::from_run))
    }

    /// Binds and draws a consumer performs walking the sorted queue.
    pub fn state_changes(&self) -> Result<StateChanges, RenderQueueError> {
        Ok(StateChanges::count(self.sorted()?))
    }
}
