//! Stage trait and DAG-validated orchestrator (spec.md §4.1, §9
//! "Stage-ordering invariants"). Unlike every other module in this crate,
//! this one has no direct counterpart in the teacher repo — HNDigest has no
//! generic multi-stage pipeline abstraction — so its shape follows the
//! teacher's general style (trait-object-free-where-possible, `anyhow`
//! propagation, structured `tracing` fields) rather than a specific file.

pub mod stage_enrichment;
pub mod stage_entity;
pub mod stage_noise;
pub mod stage_synthesis;
pub mod stage_t0;
pub mod stage_t1;
pub mod stage_temporal;
pub mod stage_validation;

use std::collections::{HashMap, HashSet};

use crate::errors::PipelineValidationError;
use crate::types::context::PipelineContext;

/// Counters a stage reports after running, for observability (spec.md
/// §4.1).
#[derive(Debug, Clone, Default)]
pub struct StageResult {
    pub success: bool,
    pub items_processed: usize,
    pub items_output: usize,
    pub metadata: HashMap<String, String>,
}

impl StageResult {
    pub fn ok(items_processed: usize, items_output: usize) -> Self {
        Self {
            success: true,
            items_processed,
            items_output,
            metadata: HashMap::new(),
        }
    }
}

#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    fn depends_on(&self) -> &[String];
    async fn process(&self, ctx: &mut PipelineContext) -> StageResult;
}

/// Outcome of a full pipeline run. `Failed` carries the partially mutated
/// context back to the caller so a fallback renderer (outside the pipeline
/// itself, per spec.md §7) can still build something from whatever state was
/// reached.
pub enum PipelineRunOutcome {
    Succeeded { context: PipelineContext },
    Failed { context: PipelineContext, failed_stage: String },
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Result<Self, PipelineValidationError> {
        validate_dag(&stages)?;
        Ok(Self { stages })
    }

    pub async fn run(&self, mut ctx: PipelineContext) -> PipelineRunOutcome {
        for stage in &self.stages {
            let result = stage.process(&mut ctx).await;
            tracing::debug!(
                stage = stage.name(),
                success = result.success,
                items_processed = result.items_processed,
                items_output = result.items_output,
                "stage completed"
            );
            if !result.success {
                tracing::warn!(stage = stage.name(), "stage reported failure, falling back");
                return PipelineRunOutcome::Failed {
                    context: ctx,
                    failed_stage: stage.name().to_string(),
                };
            }
        }
        PipelineRunOutcome::Succeeded { context: ctx }
    }
}

/// Every stage's `depends_on` must name only stages declared earlier in the
/// list, and stage names must be unique. This replaces any reliance on
/// lexical order or class inheritance in the source (spec.md §9).
fn validate_dag(stages: &[Box<dyn Stage>]) -> Result<(), PipelineValidationError> {
    let all_names: HashSet<&str> = stages.iter().map(|s| s.name()).collect();
    if all_names.len() != stages.len() {
        let mut seen = HashSet::new();
        for stage in stages {
            if !seen.insert(stage.name()) {
                return Err(PipelineValidationError::DuplicateStageName(stage.name().to_string()));
            }
        }
    }

    let mut declared_so_far: HashSet<&str> = HashSet::new();
    for stage in stages {
        for dep in stage.depends_on() {
            if !all_names.contains(dep.as_str()) {
                return Err(PipelineValidationError::UnknownDependency {
                    stage: stage.name().to_string(),
                    depends_on: dep.clone(),
                });
            }
            if !declared_so_far.contains(dep.as_str()) {
                return Err(PipelineValidationError::ForwardOrSelfDependency {
                    stage: stage.name().to_string(),
                    depends_on: dep.clone(),
                });
            }
        }
        declared_so_far.insert(stage.name());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubStage {
        name: String,
        deps: Vec<String>,
    }

    #[async_trait::async_trait]
    impl Stage for StubStage {
        fn name(&self) -> &str {
            &self.name
        }
        fn depends_on(&self) -> &[String] {
            &self.deps
        }
        async fn process(&self, _ctx: &mut PipelineContext) -> StageResult {
            StageResult::ok(0, 0)
        }
    }

    fn stub(name: &str, deps: &[&str]) -> Box<dyn Stage> {
        Box::new(StubStage {
            name: name.to_string(),
            deps: deps.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn valid_dag_constructs() {
        let stages = vec![stub("a", &[]), stub("b", &["a"]), stub("c", &["a", "b"])];
        assert!(Pipeline::new(stages).is_ok());
    }

    #[test]
    fn unknown_dependency_rejected() {
        let stages = vec![stub("a", &["nonexistent"])];
        let err = Pipeline::new(stages).unwrap_err();
        assert!(matches!(err, PipelineValidationError::UnknownDependency { .. }));
    }

    #[test]
    fn forward_dependency_rejected() {
        let stages = vec![stub("a", &["b"]), stub("b", &[])];
        let err = Pipeline::new(stages).unwrap_err();
        assert!(matches!(err, PipelineValidationError::ForwardOrSelfDependency { .. }));
    }

    #[test]
    fn duplicate_stage_name_rejected() {
        let stages = vec![stub("a", &[]), stub("a", &[])];
        let err = Pipeline::new(stages).unwrap_err();
        assert!(matches!(err, PipelineValidationError::DuplicateStageName(_)));
    }
}
