use crate::decay::decay_section;
use crate::pipeline::{Stage, StageResult};
use crate::types::context::{PipelineContext, Section};

/// Stage 3: time-adjusted decay (spec.md §4.4), turning T0 into T1 using
/// `ctx.now`.
pub struct T1DecayStage {
    name: String,
    deps: Vec<String>,
}

impl T1DecayStage {
    pub fn new() -> Self {
        Self {
            name: "t1_temporal_decay".to_string(),
            deps: vec!["t0_section_assignment".to_string()],
        }
    }
}

impl Default for T1DecayStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Stage for T1DecayStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn process(&self, ctx: &mut PipelineContext) -> StageResult {
        let mut decayed = 0usize;

        for email in &ctx.filtered_emails {
            let Some(&t0) = ctx.section_assignments_t0.get(&email.id) else {
                continue;
            };
            let anchor = ctx.temporal_contexts.get(&email.id).and_then(|t| t.anchor());
            let t1 = decay_section(t0, anchor, ctx.now, ctx.user_timezone);
            if t1 != t0 {
                decayed += 1;
            }
            ctx.section_assignments.insert(email.id.clone(), t1);
        }

        let mut result = StageResult::ok(ctx.section_assignments_t0.len(), ctx.section_assignments.len());
        result.metadata.insert("decay_changes".to_string(), decayed.to_string());

        let mut distribution: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
        for section in ctx.section_assignments.values() {
            *distribution.entry(section.as_str().to_string()).or_insert(0) += 1;
        }
        for (section, count) in distribution {
            result.metadata.insert(format!("t1_count_{section}"), count.to_string());
        }

        result
    }
}

impl PipelineContext {
    /// Convenience used by tests and `stage_synthesis` to read the section a
    /// featured item currently resolves to, defaulting as spec.md §4.8 does.
    pub fn t1_section_of(&self, email_id: &str) -> Section {
        self.section_assignments
            .get(email_id)
            .copied()
            .unwrap_or(Section::WorthKnowing)
    }
}
