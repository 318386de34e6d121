//! Stage 7: synthesis & rendering (spec.md §4.8). Grounded on
//! `synthesis_stage.py::SynthesisAndRenderingStage` for the branch order (raw
//! digest bypass → section grouping → noise narrative → editorial LLM →
//! deterministic fallback) and `llm_synthesis.py::_replace_link_placeholders`
//! for the `[[id|text]]` post-processing regex.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::SynthesisPromptVersion;
use crate::links;
use crate::llm::{generate_with_retry, LlmClient, LlmConfig};
use crate::pipeline::{Stage, StageResult};
use crate::render::{escape_html, render_deterministic, render_text, wrap_digest_html};
use crate::types::context::{FeaturedItem, PipelineContext, Section};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([a-zA-Z0-9]+)\|(.+?)\]\]").unwrap());

/// Replaces `[[id|text]]` editorial placeholders with `<a href>` links built
/// deterministically by the link-builder, regardless of what the LLM wrote
/// (spec.md §4.8: "the post-processor replaces each placeholder ... to the
/// canonical mail-client link").
fn replace_link_placeholders(html: &str) -> String {
    PLACEHOLDER_RE
        .replace_all(html, |caps: &regex::Captures| {
            let id = &caps[1];
            let text = &caps[2];
            format!(r#"<a href="{}">{}</a>"#, links::message_link(id), text)
        })
        .into_owned()
}

fn item_email_id(item: &FeaturedItem) -> &str {
    match item {
        FeaturedItem::Entity(e) => e.header.source_email_id.as_str(),
        FeaturedItem::RawEmail(email) => {
            if !email.id.is_empty() {
                email.id.as_str()
            } else {
                email.thread_id.as_str()
            }
        }
    }
}

fn is_hidden(item: &FeaturedItem) -> bool {
    matches!(item, FeaturedItem::Entity(e) if e.header.hide_in_digest)
}

fn group_by_t1_section(ctx: &PipelineContext) -> HashMap<Section, Vec<FeaturedItem>> {
    let mut groups: HashMap<Section, Vec<FeaturedItem>> = HashMap::new();
    for item in &ctx.featured_items {
        if is_hidden(item) {
            continue;
        }
        let section = ctx
            .section_assignments
            .get(item_email_id(item))
            .copied()
            .unwrap_or(Section::WorthKnowing);
        if matches!(section, Section::Critical | Section::Today | Section::ComingUp | Section::WorthKnowing) {
            groups.entry(section).or_default().push(item.clone());
        }
    }
    groups
}

pub struct SynthesisStage {
    name: String,
    deps: Vec<String>,
    llm: Option<Box<dyn LlmClient>>,
    raw_digest_enabled: bool,
    llm_synthesis_enabled: bool,
    synthesis_prompt: SynthesisPromptVersion,
}

impl SynthesisStage {
    pub fn new() -> Self {
        Self {
            name: "synthesis_and_rendering".to_string(),
            deps: vec!["enrichment".to_string()],
            llm: None,
            raw_digest_enabled: false,
            llm_synthesis_enabled: true,
            synthesis_prompt: SynthesisPromptVersion::V2,
        }
    }

    pub fn with_llm(mut self, client: Box<dyn LlmClient>) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn with_raw_digest_enabled(mut self, enabled: bool) -> Self {
        self.raw_digest_enabled = enabled;
        self
    }

    pub fn with_llm_synthesis_enabled(mut self, enabled: bool) -> Self {
        self.llm_synthesis_enabled = enabled;
        self
    }

    /// Selects which editorial prompt template `try_llm_synthesis` sends
    /// (spec.md §6 `MAILQ_SYNTHESIS_PROMPT`); v2 is the more
    /// prioritization-opinionated variant (`llm_synthesis.py`'s comment on
    /// its own `prompt_version` branch).
    pub fn with_synthesis_prompt(mut self, version: SynthesisPromptVersion) -> Self {
        self.synthesis_prompt = version;
        self
    }
}

impl Default for SynthesisStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Stage for SynthesisStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn process(&self, ctx: &mut PipelineContext) -> StageResult {
        let type_counts = ctx.noise_summary.clone();

        if ctx.raw_digest || self.raw_digest_enabled {
            if let Some(html) = self.try_raw_digest(ctx).await {
                ctx.digest_html = wrap_digest_html(&[html], &type_counts);
                ctx.digest_text = "Raw digest (see html)".to_string();
                let mut result = StageResult::ok(ctx.emails.len(), 1);
                result.metadata.insert("renderer".to_string(), "raw_llm".to_string());
                return result;
            }
            tracing::warn!("raw digest generation failed, falling back to standard pipeline");
        }

        let items_by_section = group_by_t1_section(ctx);
        let total_featured: usize = items_by_section.values().map(|v| v.len()).sum();

        if total_featured == 0 && !ctx.noise_summary.is_empty() {
            if let Some(narrative) = self.try_noise_narrative(ctx).await {
                let mut parts = Vec::new();
                if let Some(greeting) = ctx.greeting.clone().filter(|g| !g.is_empty()) {
                    parts.push(format!(r#"<div class="greeting">{}</div>"#, escape_html(&greeting)));
                }
                parts.push(narrative);
                ctx.digest_html = wrap_digest_html(&parts, &type_counts);
                ctx.digest_text = render_text(ctx.greeting.as_deref(), &items_by_section, &ctx.noise_summary);
                let mut result = StageResult::ok(ctx.featured_items.len(), 1);
                result.metadata.insert("renderer".to_string(), "noise_narrative".to_string());
                return result;
            }
        }

        if let Some(html) = self.try_llm_synthesis(ctx, &items_by_section).await {
            ctx.digest_html = wrap_digest_html(&[html], &type_counts);
            ctx.digest_text = render_text(ctx.greeting.as_deref(), &items_by_section, &ctx.noise_summary);
            let mut result = StageResult::ok(ctx.featured_items.len(), 1);
            result.metadata.insert("renderer".to_string(), "llm_synthesis".to_string());
            return result;
        }

        let html_parts = render_deterministic(ctx.greeting.as_deref(), &items_by_section, &ctx.noise_summary);
        ctx.digest_html = wrap_digest_html(&html_parts, &type_counts);
        ctx.digest_text = render_text(ctx.greeting.as_deref(), &items_by_section, &ctx.noise_summary);

        let mut result = StageResult::ok(ctx.featured_items.len(), 1);
        result.metadata.insert("renderer".to_string(), "deterministic".to_string());
        result.metadata.insert("items_rendered".to_string(), total_featured.to_string());
        result
    }
}

impl SynthesisStage {
    async fn try_raw_digest(&self, ctx: &PipelineContext) -> Option<String> {
        let client = self.llm.as_ref()?;
        if ctx.emails.is_empty() {
            return None;
        }
        let mut prompt = String::from(
            "Write a friendly HTML digest summarizing all of these emails. \
             Use [[id|short link text]] placeholders for links.\n\n",
        );
        for email in ctx.emails.iter().take(50) {
            prompt.push_str(&format!("- ID: {}\n  Subject: {}\n  Preview: {}\n", email.id, email.subject, email.snippet));
        }
        let text = generate_with_retry(client.as_ref(), &prompt, &LlmConfig::default(), 2).await.ok()?;
        let body = replace_link_placeholders(strip_code_fence(&text));
        if body.trim().is_empty() {
            return None;
        }
        Some(body)
    }

    async fn try_noise_narrative(&self, ctx: &PipelineContext) -> Option<String> {
        if !self.llm_synthesis_enabled {
            return None;
        }
        let client = self.llm.as_ref()?;
        let mut prompt = String::from(
            "Write a short, friendly one-paragraph summary of this routine inbox pile. \
             No links required.\n\nCounts by type:\n",
        );
        for (kind, count) in &ctx.noise_summary {
            prompt.push_str(&format!("- {kind}: {count}\n"));
        }
        let text = generate_with_retry(client.as_ref(), &prompt, &LlmConfig::default(), 1).await.ok()?;
        let narrative = strip_code_fence(&text);
        if narrative.is_empty() {
            return None;
        }
        Some(format!(
            r#"<div class="section"><div class="section-content">{}</div></div>"#,
            narrative
        ))
    }

    async fn try_llm_synthesis(
        &self,
        ctx: &PipelineContext,
        items_by_section: &HashMap<Section, Vec<FeaturedItem>>,
    ) -> Option<String> {
        if !self.llm_synthesis_enabled {
            return None;
        }
        let client = self.llm.as_ref()?;

        let mut prompt = match self.synthesis_prompt {
            SynthesisPromptVersion::V1 => String::from(
                "Write an editorial HTML digest body. Use [[id|short link text]] placeholders \
                 for every linked item; do not invent gmail links yourself.\n\n",
            ),
            SynthesisPromptVersion::V2 => String::from(
                "Write an editorial HTML digest body that leads with whatever most deserves the \
                 reader's attention right now, rather than marching through sections in order. \
                 Call out anything time-critical in the opening line, and be terse about routine \
                 items. Use [[id|short link text]] placeholders for every linked item; do not \
                 invent gmail links yourself.\n\n",
            ),
        };
        for (label, section) in [
            ("Today/Urgent", Section::Today),
            ("Coming Up", Section::ComingUp),
            ("Worth Knowing", Section::WorthKnowing),
        ] {
            prompt.push_str(&format!("## {label}\n"));
            let mut items: Vec<&FeaturedItem> = items_by_section.get(&section).into_iter().flatten().collect();
            if section == Section::Today {
                items.extend(items_by_section.get(&Section::Critical).into_iter().flatten());
            }
            if items.is_empty() {
                prompt.push_str("(none)\n");
            }
            for item in items {
                prompt.push_str(&format!("- id={} subject={}\n", item_email_id(item), item_subject(item)));
            }
        }

        let text = generate_with_retry(client.as_ref(), &prompt, &LlmConfig::default(), 2).await.ok()?;
        let body = replace_link_placeholders(strip_code_fence(&text));
        if body.trim().is_empty() {
            return None;
        }
        Some(body)
    }
}

fn item_subject(item: &FeaturedItem) -> &str {
    match item {
        FeaturedItem::Entity(e) => e.header.source_subject.as_str(),
        FeaturedItem::RawEmail(email) => email.subject.as_str(),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix("```html").unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix("```").unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_utils::FakeLlmClient;
    use crate::types::email::{Email, EmailType};
    use chrono::Utc;

    fn raw_email(id: &str, subject: &str) -> Email {
        Email {
            id: id.into(),
            thread_id: format!("{id}-t"),
            subject: subject.into(),
            snippet: String::new(),
            from: "a@example.com".into(),
            date: "Mon, 10 Nov 2025 12:00:00 +0000".into(),
            email_type: EmailType::Message,
            importance: None,
        }
    }

    #[tokio::test]
    async fn deterministic_fallback_used_when_llm_disabled() {
        let email = raw_email("e1", "Hello");
        let mut ctx = PipelineContext::new(vec![email.clone()], Utc::now(), chrono_tz::UTC, None, None, None, false);
        ctx.featured_items.push(FeaturedItem::RawEmail(email.clone()));
        ctx.section_assignments.insert(email.id.clone(), Section::Today);

        let stage = SynthesisStage::new().with_llm_synthesis_enabled(false);
        stage.process(&mut ctx).await;
        assert!(ctx.digest_html.contains("Hello"));
        assert!(ctx.digest_html.contains("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn noise_narrative_used_when_no_featured_items() {
        let mut ctx = PipelineContext::new(vec![], Utc::now(), chrono_tz::UTC, None, None, None, false);
        ctx.noise_summary.insert("newsletter".to_string(), 5);

        let llm = FakeLlmClient::ok("Just a pile of newsletters today.");
        let stage = SynthesisStage::new().with_llm(Box::new(llm));
        stage.process(&mut ctx).await;
        assert!(ctx.digest_html.contains("Just a pile of newsletters today."));
    }

    #[tokio::test]
    async fn hidden_entities_are_excluded_from_rendering() {
        use crate::types::entity::{Entity, EntityHeader, EventFields};
        let email = raw_email("e1", "Standup");
        let mut header = EntityHeader::new("e1", "t1", "Standup", "snippet", Utc::now(), Section::Today);
        header.hide_in_digest = true;
        let entity = Entity::new(header, standup_event_kind());

        let mut ctx = PipelineContext::new(vec![email.clone()], Utc::now(), chrono_tz::UTC, None, None, None, false);
        ctx.featured_items.push(FeaturedItem::Entity(entity));
        ctx.section_assignments.insert("e1".to_string(), Section::Today);

        let stage = SynthesisStage::new().with_llm_synthesis_enabled(false);
        stage.process(&mut ctx).await;
        assert!(!ctx.digest_html.contains("Standup"));
    }

    fn standup_event_kind() -> crate::types::entity::EntityKind {
        crate::types::entity::EntityKind::Event(crate::types::entity::EventFields {
            title: Some("Standup".to_string()),
            event_time: None,
            event_end_time: None,
            location: None,
            organizer: None,
            weather_context: None,
        })
    }

    #[test]
    fn placeholder_replacement_builds_message_link() {
        let html = replace_link_placeholders("See [[abc123|your statement]] for details.");
        assert!(html.contains(r#"<a href="https://mail.google.com/mail/u/0/#inbox/abc123">your statement</a>"#));
    }
}
