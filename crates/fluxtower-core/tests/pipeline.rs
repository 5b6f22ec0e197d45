mod common;

use std::sync::{Arc, Mutex};

use fluxtower_core::remote::{LivenessError, LivenessProbe};
use fluxtower_core::stages::StageDescriptor;
use fluxtower_core::{
    ContextUpdate, Pipeline, PipelineConfig, PipelineContext, PipelineError, RunOutcome, Stage,
    StageExit, StageId, StageOutcome, StageRegistry,
};

use common::ts;

type Step = dyn Fn(&PipelineContext) -> fluxtower_core::Result<StageOutcome> + Send + Sync;

/// Records the index it ran at, then runs `step`.
struct ScriptedStage {
    name: &'static str,
    seen: Arc<Mutex<Vec<(usize, &'static str)>>>,
    step: Box<Step>,
}

impl ScriptedStage {
    fn new(
        name: &'static str,
        seen: &Arc<Mutex<Vec<(usize, &'static str)>>>,
        step: impl Fn(&PipelineContext) -> fluxtower_core::Result<StageOutcome> + Send + Sync + 'static,
    ) -> Arc<dyn Stage> {
        Arc::new(Self {
            name,
            seen: Arc::clone(seen),
            step: Box::new(step),
        })
    }
}

impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, context: &PipelineContext) -> fluxtower_core::Result<StageOutcome> {
        self.seen
            .lock()
            .unwrap()
            .push((context.pipeline_index, self.name));
        (self.step)(context)
    }
}

fn context() -> PipelineContext {
    PipelineContext::new(Arc::new(PipelineConfig::default()), ts("2023-06-03 12:00"))
}

#[test]
fn stages_run_in_order_and_merge_updates() -> anyhow::Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Pipeline::new(vec![
        ScriptedStage::new("first", &seen, |_| {
            Ok(ContextUpdate::new()
                .last_contact(ts("2023-06-01 00:00"))
                .this_contact(ts("2023-06-01 00:00"))
                .into())
        }),
        ScriptedStage::new("second", &seen, |ctx| {
            assert_eq!(ctx.last_contact, Some(ts("2023-06-01 00:00")));
            Ok(ContextUpdate::new()
                .this_contact(ts("2023-06-02 00:00"))
                .into())
        }),
        ScriptedStage::new("third", &seen, |_| Ok(StageOutcome::unchanged())),
    ])
    .with_base_index(10);

    let mut ctx = context();
    let outcome = pipeline.run(&mut ctx)?;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(10, "first"), (11, "second"), (12, "third")]
    );
    assert_eq!(ctx.pipeline_index, 12);
    // "third" returned no fields, so only two merges count.
    assert_eq!(ctx.revision, 2);
    assert_eq!(ctx.last_contact, Some(ts("2023-06-01 00:00")));
    assert_eq!(ctx.this_contact, Some(ts("2023-06-02 00:00")));
    Ok(())
}

#[test]
fn exit_stops_remaining_stages() -> anyhow::Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Pipeline::new(vec![
        ScriptedStage::new("load", &seen, |_| {
            Ok(StageOutcome::Exit(StageExit::Halted("nothing to do".into())))
        }),
        ScriptedStage::new("never", &seen, |_| panic!("stage after exit must not run")),
    ]);

    let mut ctx = context();
    let outcome = pipeline.run(&mut ctx)?;

    assert_eq!(
        outcome,
        RunOutcome::Exited {
            stage: "load".into(),
            exit: StageExit::Halted("nothing to do".into()),
        }
    );
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(ctx.revision, 0);
    Ok(())
}

#[test]
fn stage_error_keeps_earlier_updates() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Pipeline::new(vec![
        ScriptedStage::new("first", &seen, |_| {
            Ok(ContextUpdate::new()
                .last_contact(ts("2023-06-01 00:00"))
                .into())
        }),
        ScriptedStage::new("needs_data", &seen, |ctx| {
            ctx.require_data("needs_data")?;
            Ok(StageOutcome::unchanged())
        }),
        ScriptedStage::new("never", &seen, |_| Ok(StageOutcome::unchanged())),
    ]);

    let mut ctx = context();
    let err = pipeline.run(&mut ctx).unwrap_err();

    assert!(matches!(err, PipelineError::Stage { ref stage, .. } if stage == "needs_data"));
    assert!(matches!(
        err.root(),
        PipelineError::MissingContext {
            stage: "needs_data",
            field: "data"
        }
    ));
    assert_eq!(ctx.last_contact, Some(ts("2023-06-01 00:00")));
    assert_eq!(seen.lock().unwrap().len(), 2);
}

struct Unreachable;

impl LivenessProbe for Unreachable {
    fn probe(&self) -> Result<(), LivenessError> {
        Err(LivenessError::Unreachable {
            host: "test".into(),
        })
    }
}

fn registry() -> StageRegistry {
    struct NoTransfer;
    impl fluxtower_core::remote::FileTransfer for NoTransfer {
        fn fetch(
            &self,
            _remote_path: &str,
            _local_dir: &std::path::Path,
        ) -> Result<(), fluxtower_core::remote::TransferError> {
            unreachable!("no transfers expected")
        }
    }
    StageRegistry::standard(Arc::new(NoTransfer), Arc::new(Unreachable))
}

#[test]
fn unknown_stage_fails_at_construction() {
    let err = Pipeline::from_names(&["load_checkpoint", "bogus_stage"], &registry()).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownStage(ref name) if name == "bogus_stage"));
}

#[test]
fn misordered_stages_fail_at_construction() {
    let err = Pipeline::from_names(&["filter_quality", "load_summaries"], &registry()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::UnsatisfiedRequirement { ref stage, field: "data" } if stage == "filter_quality"
    ));

    let err = Pipeline::from_names(&["record_contact"], &registry()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::UnsatisfiedRequirement {
            field: "this_contact",
            ..
        }
    ));
}

#[test]
fn stages_after_their_producers_are_accepted() -> anyhow::Result<()> {
    let pipeline = Pipeline::from_names(
        &["load_summaries", "filter_quality", "rolling_statistics"],
        &registry(),
    )?;
    assert_eq!(pipeline.len(), 3);
    Ok(())
}

#[test]
fn empty_update_keeps_revision() {
    let mut ctx = context();
    ctx.apply(ContextUpdate::new());
    assert_eq!(ctx.revision, 0);

    ctx.apply(ContextUpdate::new().this_contact(ts("2023-06-02 00:00")));
    assert_eq!(ctx.revision, 1);
}

#[test]
fn default_stage_names_resolve() -> anyhow::Result<()> {
    let config = PipelineConfig::default();
    let pipeline = Pipeline::from_names(&config.stages, &registry())?;

    let expected: Vec<&str> = StageId::DEFAULT_PIPELINE.iter().map(|id| id.name()).collect();
    assert_eq!(pipeline.stage_names(), expected);
    assert_eq!(pipeline.len(), 10);
    Ok(())
}

#[test]
fn stage_ids_round_trip_through_names() {
    for id in StageId::ALL {
        assert_eq!(id.name().parse::<StageId>().ok(), Some(id));
        let descriptor: &StageDescriptor = id.descriptor();
        assert_eq!(descriptor.id, id);
    }
}

#[test]
fn unreachable_instrument_keeps_previous_contact() -> anyhow::Result<()> {
    let registry = registry();
    let pipeline = Pipeline::new(vec![registry.resolve("probe_instrument")?]);

    let mut ctx = context();
    ctx.last_contact = Some(ts("2023-05-30 08:00"));
    pipeline.run(&mut ctx)?;

    assert_eq!(ctx.this_contact, Some(ts("2023-05-30 08:00")));
    Ok(())
}

#[test]
fn probe_requires_last_contact() {
    let registry = registry();
    let pipeline = Pipeline::new(vec![registry.resolve("probe_instrument").expect("stage")]);

    let err = pipeline.run(&mut context()).unwrap_err();
    assert!(matches!(
        err.root(),
        PipelineError::MissingContext {
            field: "last_contact",
            ..
        }
    ));
}
