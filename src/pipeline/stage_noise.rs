//! Stage 4: noise elevation (spec.md §4.5). Phase 1 (keyword guardrails) is
//! mandatory; Phase 2 (editor LLM) is feature-flagged and bounded by a
//! per-run sample cap and total prompt-size budget (spec.md §9 Open Question
//! 2 — `shopq/digest/noise_elevation.py` is a stub in the retrieved pack, so
//! the sampling policy here is this crate's own resolution, recorded in
//! DESIGN.md).

use crate::llm::{generate_with_retry, LlmClient, LlmConfig};
use crate::pipeline::{Stage, StageResult};
use crate::types::context::{PipelineContext, Section};

const GUARDRAIL_PHRASES: &[&str] = &[
    "verify-your",
    "verify your",
    "suspicious",
    "unusual sign-in",
    "payment failed",
    "action required",
    "final notice",
    "verify within",
];

/// Phase 2 cost bounds (spec.md §9 Open Question 2): at most this many noise
/// emails are ever submitted to the editor LLM in one run, and the combined
/// prompt text across all of them is capped.
const NOISE_LLM_SAMPLE_CAP: usize = 20;
const NOISE_LLM_PROMPT_CHAR_CAP: usize = 20_000;

fn matches_guardrail(text: &str) -> bool {
    let lower = text.to_lowercase();
    GUARDRAIL_PHRASES.iter().any(|p| lower.contains(p))
}

pub struct NoiseElevationStage {
    name: String,
    deps: Vec<String>,
    editor_llm: Option<Box<dyn LlmClient>>,
}

impl NoiseElevationStage {
    pub fn new() -> Self {
        Self {
            name: "noise_elevation".to_string(),
            deps: vec!["t1_temporal_decay".to_string()],
            editor_llm: None,
        }
    }

    pub fn with_editor_llm(mut self, client: Box<dyn LlmClient>) -> Self {
        self.editor_llm = Some(client);
        self
    }
}

impl Default for NoiseElevationStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Stage for NoiseElevationStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn process(&self, ctx: &mut PipelineContext) -> StageResult {
        let mut phase1_rescued = 0usize;
        let mut still_noise = Vec::new();

        for email in &ctx.filtered_emails {
            let Some(&section) = ctx.section_assignments.get(&email.id) else {
                continue;
            };
            if section != Section::Noise {
                continue;
            }
            if matches_guardrail(&email.searchable_text()) {
                ctx.section_assignments.insert(email.id.clone(), Section::WorthKnowing);
                phase1_rescued += 1;
            } else {
                still_noise.push(email.id.clone());
            }
        }

        let mut phase2_rescued = 0usize;
        if let Some(client) = &self.editor_llm {
            phase2_rescued = self.run_phase2(client.as_ref(), ctx, &still_noise).await;
        }

        let mut result = StageResult::ok(ctx.filtered_emails.len(), ctx.section_assignments.len());
        result.metadata.insert("phase1_rescued".to_string(), phase1_rescued.to_string());
        result.metadata.insert("phase2_rescued".to_string(), phase2_rescued.to_string());
        result
    }
}

impl NoiseElevationStage {
    async fn run_phase2(&self, client: &dyn LlmClient, ctx: &mut PipelineContext, still_noise: &[String]) -> usize {
        let mut rescued = 0;
        let mut prompt_budget = NOISE_LLM_PROMPT_CHAR_CAP;

        for email_id in still_noise.iter().take(NOISE_LLM_SAMPLE_CAP) {
            let Some(email) = ctx.filtered_emails.iter().find(|e| &e.id == email_id) else {
                continue;
            };
            let prompt = format!(
                "Does this routine email deserve elevation out of the noise bucket? \
                 Answer with exactly one word: elevate or keep_noise.\n\nSubject: {}\nPreview: {}",
                email.subject, email.snippet
            );
            if prompt.len() > prompt_budget {
                tracing::debug!("noise LLM prompt budget exhausted, stopping Phase 2 early");
                break;
            }
            prompt_budget -= prompt.len();

            match generate_with_retry(client, &prompt, &LlmConfig::default(), 2).await {
                Ok(response) if response.trim().eq_ignore_ascii_case("elevate") => {
                    ctx.section_assignments.insert(email_id.clone(), Section::WorthKnowing);
                    rescued += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "noise elevation Phase 2 call failed, keeping noise");
                }
            }
        }

        rescued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_utils::FakeLlmClient;
    use crate::types::email::{Email, EmailType};
    use chrono::Utc;

    fn ctx_with(emails: Vec<Email>, sections: Vec<(&str, Section)>) -> PipelineContext {
        let mut ctx = PipelineContext::new(emails.clone(), Utc::now(), chrono_tz::UTC, None, None, None, false);
        ctx.filtered_emails = emails;
        for (id, section) in sections {
            ctx.section_assignments.insert(id.to_string(), section);
        }
        ctx
    }

    fn email(id: &str, subject: &str) -> Email {
        Email {
            id: id.into(),
            thread_id: format!("{id}-t"),
            subject: subject.into(),
            snippet: String::new(),
            from: "a@example.com".into(),
            date: "Mon, 10 Nov 2025 12:00:00 +0000".into(),
            email_type: EmailType::Notification,
            importance: None,
        }
    }

    #[tokio::test]
    async fn phase1_rescues_guardrail_phrase() {
        let e = email("e1", "Verify your account");
        let mut ctx = ctx_with(vec![e], vec![("e1", Section::Noise)]);
        let stage = NoiseElevationStage::new();
        let result = stage.process(&mut ctx).await;
        assert!(result.success);
        assert_eq!(ctx.section_assignments.get("e1"), Some(&Section::WorthKnowing));
    }

    #[tokio::test]
    async fn non_matching_noise_stays_noise_without_llm() {
        let e = email("e1", "This week in gardening");
        let mut ctx = ctx_with(vec![e], vec![("e1", Section::Noise)]);
        let stage = NoiseElevationStage::new();
        stage.process(&mut ctx).await;
        assert_eq!(ctx.section_assignments.get("e1"), Some(&Section::Noise));
    }

    #[tokio::test]
    async fn phase2_elevates_on_llm_response() {
        let e = email("e1", "This week in gardening");
        let mut ctx = ctx_with(vec![e], vec![("e1", Section::Noise)]);
        let llm = FakeLlmClient::ok("elevate");
        let stage = NoiseElevationStage::new().with_editor_llm(Box::new(llm));
        stage.process(&mut ctx).await;
        assert_eq!(ctx.section_assignments.get("e1"), Some(&Section::WorthKnowing));
    }

    #[tokio::test]
    async fn phase2_failure_keeps_phase1_results_only() {
        let e = email("e1", "This week in gardening");
        let mut ctx = ctx_with(vec![e], vec![("e1", Section::Noise)]);
        let llm = FakeLlmClient::failing(crate::errors::LlmError::Terminal("boom".to_string()));
        let stage = NoiseElevationStage::new().with_editor_llm(Box::new(llm));
        let result = stage.process(&mut ctx).await;
        assert!(result.success);
        assert_eq!(ctx.section_assignments.get("e1"), Some(&Section::Noise));
    }
}
