use crate::pipeline::{Stage, StageResult};
use crate::temporal;
use crate::types::context::PipelineContext;

/// Stage 1: filter past-grace events, populate `temporal_contexts` for every
/// surviving email (spec.md §4.2).
pub struct TemporalExtractionStage {
    name: String,
    deps: Vec<String>,
}

impl TemporalExtractionStage {
    pub fn new() -> Self {
        Self {
            name: "temporal_extraction".to_string(),
            deps: Vec::new(),
        }
    }
}

impl Default for TemporalExtractionStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Stage for TemporalExtractionStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn process(&self, ctx: &mut PipelineContext) -> StageResult {
        let mut filtered = Vec::with_capacity(ctx.emails.len());
        let mut past_grace = 0usize;

        for email in &ctx.emails {
            let temporal_ctx = temporal::extract_temporal_context(email, ctx.now, ctx.user_timezone);
            let dropped = temporal::is_past_grace(&temporal_ctx, ctx.now);

            if !temporal_ctx.is_empty() {
                ctx.temporal_contexts.insert(email.id.clone(), temporal_ctx);
            }

            if dropped {
                past_grace += 1;
                tracing::debug!(email = %email.id, "dropping past-grace event");
            } else {
                filtered.push(email.clone());
            }
        }

        let processed = ctx.emails.len();
        ctx.filtered_emails = filtered;
        let mut result = StageResult::ok(processed, ctx.filtered_emails.len());
        result
            .metadata
            .insert("past_grace_count".to_string(), past_grace.to_string());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::email::{Email, EmailType};
    use chrono::{TimeZone, Utc};

    fn ctx_with(emails: Vec<Email>, now: chrono::DateTime<Utc>) -> PipelineContext {
        PipelineContext::new(emails, now, chrono_tz::UTC, None, None, None, false)
    }

    fn email(id: &str, subject: &str, date: &str, t: EmailType) -> Email {
        Email {
            id: id.into(),
            thread_id: format!("{id}-thread"),
            subject: subject.into(),
            snippet: String::new(),
            from: "a@example.com".into(),
            date: date.into(),
            email_type: t,
            importance: None,
        }
    }

    #[tokio::test]
    async fn past_grace_event_is_removed_but_context_kept() {
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 12, 0, 0).unwrap();
        let e = email(
            "e1",
            "@ Wed Oct 29, 2025 2pm",
            "Mon, 10 Nov 2025 12:00:00 +0000",
            EmailType::Event,
        );
        let mut ctx = ctx_with(vec![e], now);
        let stage = TemporalExtractionStage::new();
        let result = stage.process(&mut ctx).await;
        assert!(result.success);
        assert!(ctx.filtered_emails.is_empty());
        assert!(ctx.temporal_contexts.contains_key("e1"));
    }

    #[tokio::test]
    async fn email_without_temporal_signal_survives_with_no_context() {
        let now = Utc::now();
        let e = email("e1", "Hello there", "garbage date", EmailType::Message);
        let mut ctx = ctx_with(vec![e], now);
        let stage = TemporalExtractionStage::new();
        stage.process(&mut ctx).await;
        assert_eq!(ctx.filtered_emails.len(), 1);
        assert!(!ctx.temporal_contexts.contains_key("e1"));
    }
}
