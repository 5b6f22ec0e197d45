use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{error, info, info_span};

use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::stages::{Stage, StageExit, StageId, StageOutcome, StageRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Exited { stage: String, exit: StageExit },
}

/// An ordered list of stages run one after another over a shared context.
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    base_index: usize,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages,
            base_index: 0,
        }
    }

    /// Resolves every name up front; an unknown name fails before anything runs.
    ///
    /// Each stage's required context fields must be produced by a stage earlier in `names`,
    /// otherwise construction fails with [`PipelineError::UnsatisfiedRequirement`].
    pub fn from_names<S: AsRef<str>>(names: &[S], registry: &StageRegistry) -> Result<Self> {
        let stages = names
            .iter()
            .map(|name| registry.resolve(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let mut produced = BTreeSet::new();
        for name in names {
            let descriptor = name.as_ref().parse::<StageId>()?.descriptor();
            if let Some(field) = descriptor
                .requires
                .iter()
                .copied()
                .find(|field| !produced.contains(field))
            {
                return Err(PipelineError::UnsatisfiedRequirement {
                    stage: descriptor.id.name().to_string(),
                    field,
                });
            }
            produced.extend(descriptor.produces.iter().copied());
        }

        Ok(Self::new(stages))
    }

    /// Offset added to the position reported in `pipeline_index`.
    pub fn with_base_index(mut self, base_index: usize) -> Self {
        self.base_index = base_index;
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the stages in order, merging each update into `context`.
    ///
    /// An `Exit` outcome ends the run early. A failing stage aborts the run with its error
    /// wrapped in [`PipelineError::Stage`]; updates merged before the failure stay in
    /// `context`.
    pub fn run(&self, context: &mut PipelineContext) -> Result<RunOutcome> {
        info!(stages = self.stages.len(), "Starting pipeline run");

        for (position, stage) in self.stages.iter().enumerate() {
            let index = self.base_index + position;
            let name = stage.name();
            context.pipeline_index = index;

            let span = info_span!("stage", index, name);
            let _guard = span.enter();
            info!("Running stage");

            let outcome = stage.run(context).map_err(|source| {
                error!(error = %source, "Stage failed");
                PipelineError::Stage {
                    stage: name.to_string(),
                    source: Box::new(source),
                }
            })?;

            match outcome {
                StageOutcome::Update(update) => context.apply(update),
                StageOutcome::Exit(exit) => {
                    info!(%exit, "Stage ended the run");
                    return Ok(RunOutcome::Exited {
                        stage: name.to_string(),
                        exit,
                    });
                }
            }
        }

        info!("Pipeline run completed");
        Ok(RunOutcome::Completed)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("base_index", &self.base_index)
            .finish()
    }
}
