use crate::command::RenderCommand;
use frameline_common::{MaterialId, PipelineId};
use serde::Serialize;

/// Consecutive sorted commands that share pipeline and material state.
/// The consumer binds once per batch and issues one draw per command.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub pipeline: PipelineId,
    pub material: MaterialId,
    pub commands: &'a [RenderCommand],
}

impl<'a> Batch<'a> {
    /// `run` must be non-empty and share pipeline + material.
    pub(crate) fn from_run(run: &'a [RenderCommand]) -> Self {
        let head = &run[0];
        Self {
            pipeline: head.pipeline,
            material: head.material,
            commands: run,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// State-binding work for one traversal of a command list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateChanges {
    pub pipeline_binds: usize,
    pub material_binds: usize,
    pub draws: usize,
}

impl StateChanges {
    /// Count binds a consumer performs when it skips redundant ones.
    /// A pipeline switch forces a material rebind.
    pub fn count(commands: &[RenderCommand]) -> Self {
        let mut out = Self::default();
        let mut bound: Option<(PipelineId, MaterialId)> = None;

        for c in commands {
            match bound {
                Some((p, m)) if p == c.pipeline && m == c.material => {}
                Some((p, _)) if p == c.pipeline => out.material_binds += 1,
                _ => {
                    out.pipeline_binds += 1;
                    out.material_binds += 1;
                }
            }
            bound = Some((c.pipeline, c.material));
            out.draws += 1;
        }

        out
    }
}
