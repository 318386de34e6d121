//! Context digest pipeline core (spec.md §1-§9). A library: the caller owns
//! mail fetching, auth, HTTP routing, and persistence; this crate only turns
//! a pre-fetched email batch into a rendered HTML/text digest.
//!
//! [`DigestBuilder`] wires up the eight-stage [`pipeline::Pipeline`] with
//! whatever collaborators (LLM, weather, geolocation) the caller has
//! available, the way the teacher's `AppState` wires a `Storage` + `Mailer` +
//! `Captcha` into its handlers. [`Digest::generate`] is the sole entry point;
//! its output always carries a renderable `html`/`text` pair, even when every
//! external collaborator is absent or failing (spec.md §7).

pub mod config;
pub mod decay;
pub mod errors;
pub mod friendly_names;
pub mod geo;
pub mod links;
pub mod llm;
pub mod pipeline;
pub mod render;
pub mod t0;
pub mod temporal;
pub mod types;
pub mod validation;
pub mod weather;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::DigestConfig;
use crate::errors::{LlmError, PipelineValidationError};
use crate::geo::GeoClient;
use crate::llm::{LlmClient, LlmConfig};
use crate::pipeline::stage_enrichment::EnrichmentStage;
use crate::pipeline::stage_entity::EntityExtractionStage;
use crate::pipeline::stage_noise::NoiseElevationStage;
use crate::pipeline::stage_synthesis::SynthesisStage;
use crate::pipeline::stage_t0::T0AssignmentStage;
use crate::pipeline::stage_t1::T1DecayStage;
use crate::pipeline::stage_temporal::TemporalExtractionStage;
use crate::pipeline::stage_validation::ValidationStage;
use crate::pipeline::{Pipeline, PipelineRunOutcome, Stage};
use crate::render::{item_title, wrap_digest_html};
use crate::types::context::{FeaturedItem, PipelineContext, Section};
use crate::types::email::{Email, Importance};
use crate::weather::WeatherClient;

/// The response object handed back by [`Digest::generate`] (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct DigestResponse {
    pub html: String,
    pub text: String,
    pub word_count: usize,
    pub entities_count: usize,
    pub featured_count: usize,
    pub noise_breakdown: HashMap<String, u32>,
    pub critical_count: usize,
    pub time_sensitive_count: usize,
    pub routine_count: usize,
    pub verified: bool,
    pub errors: Vec<String>,
    pub fallback: bool,
    pub generated_at_local: String,
    pub timezone: Option<String>,
    pub city: Option<String>,
    pub pipeline_version: &'static str,
    pub section_distribution: HashMap<String, u32>,
}

/// Delegates to a shared `Arc<dyn LlmClient>` so the same model handle can be
/// handed to every stage that needs one (entity extraction, noise elevation,
/// synthesis) without each stage owning its own client instance — mirroring
/// spec.md §5's "LLM model handle" as one process-wide collaborator.
struct SharedLlmClient(Arc<dyn LlmClient>);

#[async_trait::async_trait]
impl LlmClient for SharedLlmClient {
    async fn generate(&self, prompt: &str, config: &LlmConfig) -> Result<String, LlmError> {
        self.0.generate(prompt, config).await
    }
}

/// Builds a [`Digest`] with whatever collaborators the caller has available.
/// Absent collaborators simply mean the corresponding degrade-gracefully
/// path runs every time (no LLM synthesis, no weather, etc.) — never a
/// construction-time error.
#[derive(Default)]
pub struct DigestBuilder {
    llm: Option<Arc<dyn LlmClient>>,
    weather_client: Option<Box<dyn WeatherClient>>,
    geo_client: Option<Box<dyn GeoClient>>,
    config: DigestConfig,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: DigestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_llm(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn with_weather_client(mut self, client: Box<dyn WeatherClient>) -> Self {
        self.weather_client = Some(client);
        self
    }

    pub fn with_geo_client(mut self, client: Box<dyn GeoClient>) -> Self {
        self.geo_client = Some(client);
        self
    }

    /// Validates the stage DAG and returns a reusable [`Digest`] (spec.md
    /// §4.1: construction fails only on a malformed dependency graph).
    pub fn build(self) -> Result<Digest, PipelineValidationError> {
        let mut entity_stage = EntityExtractionStage::new();
        let mut noise_stage = NoiseElevationStage::new();
        let mut synthesis_stage = SynthesisStage::new()
            .with_raw_digest_enabled(self.config.raw_digest)
            .with_llm_synthesis_enabled(self.config.llm_synthesis)
            .with_synthesis_prompt(self.config.synthesis_prompt);

        if let Some(llm) = &self.llm {
            entity_stage = entity_stage.with_llm(Box::new(SharedLlmClient(llm.clone())));
            noise_stage = noise_stage.with_editor_llm(Box::new(SharedLlmClient(llm.clone())));
            synthesis_stage = synthesis_stage.with_llm(Box::new(SharedLlmClient(llm.clone())));
        }

        let mut enrichment_stage = EnrichmentStage::new();
        if let Some(weather_client) = self.weather_client {
            enrichment_stage = enrichment_stage.with_weather_client(weather_client);
        }
        if let Some(geo_client) = self.geo_client {
            enrichment_stage = enrichment_stage.with_geo_client(geo_client);
        }

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(TemporalExtractionStage::new()),
            Box::new(T0AssignmentStage::new()),
            Box::new(T1DecayStage::new()),
            Box::new(noise_stage),
            Box::new(entity_stage),
            Box::new(enrichment_stage),
            Box::new(synthesis_stage),
            Box::new(ValidationStage::new()),
        ];

        let pipeline = Pipeline::new(stages)?;
        Ok(Digest { pipeline })
    }
}

/// A constructed, reusable digest pipeline (spec.md §5: safe to invoke
/// concurrently from multiple request handlers — each `generate` call owns
/// its own [`PipelineContext`], and the pipeline's stages hold only
/// process-wide, concurrency-safe collaborators).
pub struct Digest {
    pipeline: Pipeline,
}

impl Digest {
    pub fn builder() -> DigestBuilder {
        DigestBuilder::new()
    }

    /// Runs the full pipeline over `emails` and returns a response that
    /// always carries renderable `html`/`text` (spec.md §7: "The user always
    /// receives an HTML document"). `timezone` is an IANA name; an unknown
    /// name falls back to UTC rather than failing the call.
    pub async fn generate(
        &self,
        emails: Vec<Email>,
        now: DateTime<Utc>,
        timezone: &str,
        user_name: Option<String>,
        city_hint: Option<String>,
        region_hint: Option<String>,
        raw_digest: bool,
    ) -> DigestResponse {
        let (tz, resolved_timezone) = match Tz::from_str(timezone) {
            Ok(tz) => (tz, Some(timezone.to_string())),
            Err(_) => {
                tracing::warn!(timezone, "unknown IANA timezone, falling back to UTC");
                (chrono_tz::UTC, None)
            }
        };

        let ctx = PipelineContext::new(
            emails.clone(),
            now,
            tz,
            user_name,
            city_hint,
            region_hint,
            raw_digest,
        );

        match self.pipeline.run(ctx).await {
            PipelineRunOutcome::Succeeded { context } => build_response(context, resolved_timezone),
            PipelineRunOutcome::Failed { context, failed_stage } => {
                tracing::warn!(stage = %failed_stage, "pipeline stage failed, rendering fallback digest");
                build_fallback_response(&emails, now, tz, resolved_timezone)
            }
        }
    }
}

fn build_response(ctx: PipelineContext, resolved_timezone: Option<String>) -> DigestResponse {
    let mut section_distribution: HashMap<String, u32> = HashMap::new();
    let mut critical_count = 0usize;
    let mut time_sensitive_count = 0usize;
    let mut routine_count = 0usize;

    for section in ctx.section_assignments.values() {
        *section_distribution.entry(section.as_str().to_string()).or_insert(0) += 1;
        match section {
            Section::Critical => critical_count += 1,
            Section::Today | Section::ComingUp => time_sensitive_count += 1,
            Section::WorthKnowing => routine_count += 1,
            Section::Noise | Section::Skip => {}
        }
    }

    let city = ctx
        .weather
        .as_ref()
        .map(|w| w.city.clone())
        .or_else(|| ctx.city_hint.clone());

    DigestResponse {
        html: ctx.digest_html.clone(),
        text: ctx.digest_text.clone(),
        word_count: render::word_count(&ctx.digest_text),
        entities_count: ctx.entities.len(),
        featured_count: ctx.featured_items.len(),
        noise_breakdown: ctx.noise_summary.clone(),
        critical_count,
        time_sensitive_count,
        routine_count,
        verified: ctx.verified,
        errors: ctx.validation_errors.clone(),
        fallback: false,
        generated_at_local: ctx.now.with_timezone(&ctx.user_timezone).to_rfc3339(),
        timezone: resolved_timezone,
        city,
        pipeline_version: "v2",
        section_distribution,
    }
}

/// Deterministic email-list fallback digest (spec.md §7): grouped by
/// `Email.importance`, linked to mail-client threads, no entities, no
/// weather, no greeting. Used when any non-validation stage fails.
fn build_fallback_response(
    emails: &[Email],
    now: DateTime<Utc>,
    tz: Tz,
    resolved_timezone: Option<String>,
) -> DigestResponse {
    let mut critical = Vec::new();
    let mut time_sensitive = Vec::new();
    let mut routine = Vec::new();

    for email in emails {
        match email.importance {
            Some(Importance::Critical) => critical.push(email),
            Some(Importance::TimeSensitive) => time_sensitive.push(email),
            _ => routine.push(email),
        }
    }

    let groups: &[(&str, &Vec<&Email>)] =
        &[("Critical", &critical), ("Time Sensitive", &time_sensitive), ("Routine", &routine)];

    let mut html_parts = Vec::new();
    let mut text_lines = Vec::new();
    let mut item_number = 1usize;

    for (label, group) in groups {
        if group.is_empty() {
            continue;
        }
        html_parts.push(r#"<div class="section">"#.to_string());
        html_parts.push(format!("<h2>{label}</h2>"));
        text_lines.push(format!("{label}:"));
        for email in group.iter() {
            let item = FeaturedItem::RawEmail((*email).clone());
            html_parts.push(render::render_item(&item, item_number));
            text_lines.push(format!("- {}", item_title(&item)));
            item_number += 1;
        }
        html_parts.push("</div>".to_string());
        text_lines.push(String::new());
    }

    if html_parts.is_empty() {
        html_parts.push(r#"<div class="section"><div class="section-content">Your inbox is clear.</div></div>"#.to_string());
        text_lines.push("Your inbox is clear.".to_string());
    }

    let html = wrap_digest_html(&html_parts, &HashMap::new());
    let text = text_lines.join("\n").trim().to_string();

    DigestResponse {
        word_count: render::word_count(&text),
        entities_count: 0,
        featured_count: critical.len() + time_sensitive.len() + routine.len(),
        noise_breakdown: HashMap::new(),
        critical_count: critical.len(),
        time_sensitive_count: time_sensitive.len(),
        routine_count: routine.len(),
        verified: false,
        errors: vec!["pipeline fell back to deterministic rendering".to_string()],
        fallback: true,
        generated_at_local: now.with_timezone(&tz).to_rfc3339(),
        timezone: resolved_timezone,
        city: None,
        pipeline_version: "v2",
        section_distribution: HashMap::new(),
        html,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::email::EmailType;
    use chrono::TimeZone;

    fn email(id: &str, subject: &str, t: EmailType) -> Email {
        Email {
            id: id.into(),
            thread_id: format!("{id}-t"),
            subject: subject.into(),
            snippet: String::new(),
            from: "a@example.com".into(),
            date: "Mon, 10 Nov 2025 12:00:00 +0000".into(),
            email_type: t,
            importance: None,
        }
    }

    #[tokio::test]
    async fn empty_input_produces_inbox_is_clear_digest() {
        let digest = Digest::builder().build().expect("valid dag");
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 9, 0, 0).unwrap();
        let response = digest.generate(vec![], now, "UTC", None, None, None, false).await;
        assert!(!response.fallback);
        assert!(response.html.contains("clear"), "{}", response.html);
        assert_eq!(response.pipeline_version, "v2");
    }

    #[tokio::test]
    async fn newsletters_land_in_noise_breakdown() {
        let digest = Digest::builder().build().expect("valid dag");
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 9, 0, 0).unwrap();
        let emails = vec![
            email("e1", "Weekly roundup", EmailType::Newsletter),
            email("e2", "Another roundup", EmailType::Newsletter),
            email("e3", "Yet another roundup", EmailType::Newsletter),
        ];
        let response = digest.generate(emails, now, "UTC", None, None, None, false).await;
        assert_eq!(response.noise_breakdown.get("newsletter"), Some(&3));
        assert_eq!(response.featured_count, 0);
    }

    #[tokio::test]
    async fn unknown_timezone_falls_back_to_utc_without_failing() {
        let digest = Digest::builder().build().expect("valid dag");
        let now = Utc::now();
        let response = digest.generate(vec![], now, "Not/AZone", None, None, None, false).await;
        assert_eq!(response.timezone, None);
        assert!(!response.fallback);
    }

    #[test]
    fn builder_produces_a_valid_pipeline() {
        assert!(Digest::builder().build().is_ok());
    }
}
