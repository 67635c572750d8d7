use crate::batch::StateChanges;
use crate::command::RenderBucket;
use crate::queue::{RenderCommandQueue, RenderQueueError};

/// Draw-phase consumer of a sorted command queue.
///
/// Implementations only read the queue; collection and sorting belong to
/// the scene side. A GPU backend implements this with real binds and
/// draws, keyed by the opaque handles in each command.
pub trait Renderer {
    /// The output type produced by this renderer.
    type Output;

    /// Consume one frame's sorted commands.
    fn render(&mut self, queue: &RenderCommandQueue) -> Result<Self::Output, RenderQueueError>;
}

/// Debug text renderer.
///
/// Produces a human-readable listing of what a backend would do: one line
/// per bind and per draw, bucket by bucket. Useful for CLI output, logging,
/// and testing the draw-phase interface without a device.
#[derive(Debug, Default)]
pub struct DebugTextRenderer;

impl DebugTextRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for DebugTextRenderer {
    type Output = String;

    fn render(&mut self, queue: &RenderCommandQueue) -> Result<String, RenderQueueError> {
        // Each bucket is its own pass, so binds reset at bucket boundaries.
        let mut body = String::new();
        let mut changes = StateChanges::default();

        for bucket in RenderBucket::ALL {
            if queue.bucket_len(bucket) == 0 {
                continue;
            }
            body.push_str(&format!("[{bucket:?}]\n"));
            let mut bound = None;
            queue.for_each_in_bucket(bucket, |c| {
                if bound.map(|(p, _)| p) != Some(c.pipeline) {
                    body.push_str(&format!("  bind pipeline {}\n", c.pipeline.0));
                    changes.pipeline_binds += 1;
                }
                if bound != Some((c.pipeline, c.material)) {
                    body.push_str(&format!("    bind material {}\n", c.material.0));
                    changes.material_binds += 1;
                }
                bound = Some((c.pipeline, c.material));
                let p = c.transform.position;
                body.push_str(&format!(
                    "      draw mesh {} pos=({:.2}, {:.2}, {:.2})\n",
                    c.mesh.0, p.x, p.y, p.z
                ));
                changes.draws += 1;
            })?;
        }

        let mut out = format!(
            "=== Frame ({} draws, {} pipeline binds, {} material binds) ===\n",
            changes.draws, changes.pipeline_binds, changes.material_binds
        );
        out.push_str(&body);
        Ok(out)
    }
}
