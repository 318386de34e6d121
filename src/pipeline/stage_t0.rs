use crate::pipeline::{Stage, StageResult};
use crate::t0::assign_section_t0;
use crate::types::context::PipelineContext;

/// Stage 2: intrinsic section assignment (spec.md §4.3). Pure per-email; no
/// use of `ctx.now`.
pub struct T0AssignmentStage {
    name: String,
    deps: Vec<String>,
}

impl T0AssignmentStage {
    pub fn new() -> Self {
        Self {
            name: "t0_section_assignment".to_string(),
            deps: vec!["temporal_extraction".to_string()],
        }
    }
}

impl Default for T0AssignmentStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Stage for T0AssignmentStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn process(&self, ctx: &mut PipelineContext) -> StageResult {
        for email in &ctx.filtered_emails {
            let temporal_ctx = ctx.temporal_contexts.get(&email.id);
            let section = assign_section_t0(email, temporal_ctx);
            ctx.section_assignments_t0.insert(email.id.clone(), section);
        }

        StageResult::ok(ctx.filtered_emails.len(), ctx.section_assignments_t0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::context::Section;
    use crate::types::email::{Email, EmailType};
    use chrono::Utc;

    fn ctx_with(emails: Vec<Email>) -> PipelineContext {
        let mut ctx = PipelineContext::new(emails.clone(), Utc::now(), chrono_tz::UTC, None, None, None, false);
        ctx.filtered_emails = emails;
        ctx
    }

    fn email(id: &str, t: EmailType) -> Email {
        Email {
            id: id.into(),
            thread_id: format!("{id}-t"),
            subject: "Weekly digest".into(),
            snippet: String::new(),
            from: "a@example.com".into(),
            date: "Mon, 10 Nov 2025 12:00:00 +0000".into(),
            email_type: t,
            importance: None,
        }
    }

    #[tokio::test]
    async fn assigns_every_filtered_email() {
        let mut ctx = ctx_with(vec![email("e1", EmailType::Newsletter)]);
        let stage = T0AssignmentStage::new();
        let result = stage.process(&mut ctx).await;
        assert!(result.success);
        assert_eq!(ctx.section_assignments_t0.get("e1"), Some(&Section::Noise));
    }
}
