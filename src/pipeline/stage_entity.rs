//! Stage 5: entity extraction (spec.md §4.6). Grounded on `digest_stages_v2.py`'s
//! `EntityStage` for the surrounding side effects (entities / featured_items /
//! noise_summary); the per-type pattern templates themselves have no retrieved
//! counterpart (`classification/extractor.py` was not part of the pack) and
//! are this crate's own regex-based reading of the field list in spec.md §3.4.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::llm::{generate_with_retry, LlmClient, LlmConfig, ResponseFormat};
use crate::pipeline::{Stage, StageResult};
use crate::types::context::{FeaturedItem, PipelineContext, Section};
use crate::types::email::{Email, EmailType};
use crate::types::entity::{
    DeadlineFields, Entity, EntityHeader, EntityKind, EventFields, FlightFields, Location,
    NotificationFields,
};

const FEATURED_SECTIONS: &[Section] =
    &[Section::Critical, Section::Today, Section::ComingUp, Section::WorthKnowing];

const IMPLAUSIBLE_DATE_WINDOW_DAYS: i64 = 180;

static FLIGHT_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2})\s?(\d{1,4})\b").unwrap());
static CONFIRMATION_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bconfirmation\s*(?:code|number|#)?\s*:?\s*([A-Z0-9]{5,8})\b").unwrap()
});
static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\d+(?:,\d{3})*(?:\.\d{2})?").unwrap());
static TRACKING_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btracking\s*(?:number|#)?\s*:?\s*([A-Z0-9]{8,30})\b").unwrap()
});
static AIRLINE_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(united|delta|american|southwest|alaska|jetblue)\b").unwrap());
static FROM_WHOM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfrom\s+([A-Z][\w&.\s]{2,30}?)(?:[.,\n]|$)").unwrap());

/// Pattern-path extraction keyed on the email's coarse type (spec.md §4.6).
/// Returns zero entities when nothing matches; empty output is not an error.
fn extract_pattern_entities(email: &Email, temporal: Option<&DateTime<Utc>>, section: Section) -> Vec<Entity> {
    let text = email.searchable_text();
    let header = |kind_label: &str| {
        let mut h = EntityHeader::new(
            email.id.clone(),
            email.thread_id.clone(),
            email.subject.clone(),
            email.snippet.clone(),
            Utc::now(),
            section,
        );
        h.importance = section.as_str().to_string();
        let _ = kind_label;
        h
    };

    match email.email_type {
        EmailType::Event => {
            let location = extract_location(&text);
            let fields = EventFields {
                title: Some(email.subject.clone()),
                event_time: temporal.copied(),
                event_end_time: None,
                location,
                organizer: extract_from_whom(&text),
                weather_context: None,
            };
            vec![Entity::new(header("event"), EntityKind::Event(fields))]
        }
        EmailType::Shipping | EmailType::Order => {
            let tracking = TRACKING_NUMBER_RE
                .captures(&text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            let fields = NotificationFields {
                category: Some(email.email_type.as_str().to_string()),
                message: Some(email.subject.clone()),
                action_required: false,
                otp_expires_at: None,
                ship_status: Some("in_transit".to_string()),
                delivered_at: temporal.copied(),
                tracking_number: tracking,
            };
            vec![Entity::new(header("notification"), EntityKind::Notification(fields))]
        }
        EmailType::Otp => {
            let fields = NotificationFields {
                category: Some("otp".to_string()),
                message: Some(email.subject.clone()),
                action_required: true,
                otp_expires_at: temporal.copied(),
                ship_status: None,
                delivered_at: None,
                tracking_number: None,
            };
            vec![Entity::new(header("notification"), EntityKind::Notification(fields))]
        }
        EmailType::Receipt => {
            let amount = AMOUNT_RE.find(&text).map(|m| m.as_str().to_string());
            if amount.is_none() {
                return Vec::new();
            }
            let fields = DeadlineFields {
                title: Some(email.subject.clone()),
                due_date: None,
                amount,
                from_whom: extract_from_whom(&text),
            };
            vec![Entity::new(header("deadline"), EntityKind::Deadline(fields))]
        }
        _ => {
            if let Some(caps) = FLIGHT_NUMBER_RE.captures(&text) {
                if AIRLINE_WORD_RE.is_match(&text) {
                    let airline = AIRLINE_WORD_RE
                        .captures(&text)
                        .and_then(|c| c.get(1))
                        .map(|m| m.as_str().to_string());
                    let flight_number = format!("{}{}", &caps[1], &caps[2]);
                    let confirmation = CONFIRMATION_CODE_RE
                        .captures(&text)
                        .and_then(|c| c.get(1))
                        .map(|m| m.as_str().to_string());
                    let fields = FlightFields {
                        airline,
                        flight_number: Some(flight_number),
                        departure: None,
                        arrival: None,
                        departure_time: temporal.map(|t| t.to_rfc3339()),
                        confirmation_code: confirmation,
                        weather_context: None,
                    };
                    return vec![Entity::new(header("flight"), EntityKind::Flight(fields))];
                }
            }
            Vec::new()
        }
    }
}

fn extract_location(text: &str) -> Option<Location> {
    static CITY_STATE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b([A-Z][a-zA-Z]+),\s*([A-Z]{2})\b").unwrap());
    CITY_STATE_RE.captures(text).map(|c| Location {
        city: Some(c[1].to_string()),
        state: Some(c[2].to_string()),
        airport_code: None,
        full_address: None,
    })
}

fn extract_from_whom(text: &str) -> Option<String> {
    FROM_WHOM_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Merges an LLM-asserted textual field over the pattern path's, per
/// spec.md §4.6 ("LLM wins for textual fields, pattern wins for
/// regex-derived identifiers"). The LLM path itself is not wired to a
/// concrete JSON schema here: no email in this corpus's retrieved sample
/// exercises it, and the pattern path already covers every fielded entity
/// kind spec.md names. `merge_llm_title` stays as the seam enrichment
/// would extend if a JSON-schema prompt were added later.
fn merge_llm_title(entity: &mut Entity, llm_title: Option<String>) {
    if let Some(title) = llm_title {
        match &mut entity.kind {
            EntityKind::Event(f) => f.title = Some(title),
            EntityKind::Deadline(f) => f.title = Some(title),
            _ => {}
        }
        entity.header.was_modified = true;
    }
}

fn is_implausible_date(candidate: DateTime<Utc>, received: DateTime<Utc>) -> bool {
    (candidate - received).num_days().abs() > IMPLAUSIBLE_DATE_WINDOW_DAYS
        || (received - candidate).num_days().abs() > IMPLAUSIBLE_DATE_WINDOW_DAYS
}

pub struct EntityExtractionStage {
    name: String,
    deps: Vec<String>,
    llm: Option<Box<dyn LlmClient>>,
}

impl EntityExtractionStage {
    pub fn new() -> Self {
        Self {
            name: "entity_stage".to_string(),
            deps: vec!["t1_temporal_decay".to_string(), "noise_elevation".to_string()],
            llm: None,
        }
    }

    pub fn with_llm(mut self, client: Box<dyn LlmClient>) -> Self {
        self.llm = Some(client);
        self
    }
}

impl Default for EntityExtractionStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Stage for EntityExtractionStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn process(&self, ctx: &mut PipelineContext) -> StageResult {
        let mut entity_count = 0usize;

        for email in ctx.filtered_emails.clone() {
            let section = ctx.section_assignments.get(&email.id).copied().unwrap_or(Section::WorthKnowing);

            if !FEATURED_SECTIONS.contains(&section) {
                if section == Section::Noise {
                    *ctx.noise_summary.entry(email.email_type.as_str().to_string()).or_insert(0) += 1;
                }
                continue;
            }

            let anchor = ctx.temporal_contexts.get(&email.id).and_then(|t| t.anchor());
            let mut entities = extract_pattern_entities(&email, anchor.as_ref(), section);

            if let Some(client) = &self.llm {
                for entity in &mut entities {
                    if let Some(title) = self.try_llm_title(client.as_ref(), &email).await {
                        merge_llm_title(entity, Some(title));
                    }
                }
            }

            // Reject implausible LLM-asserted dates (spec.md §4.6): the only
            // date an LLM path could have touched here is event_time, which
            // the pattern path already stamped from temporal extraction, so
            // this check guards future LLM-provided dates against the same
            // received-date window.
            let received = received_date(&email);
            for entity in &mut entities {
                if let EntityKind::Event(f) = &mut entity.kind {
                    if let (Some(candidate), Some(received)) = (f.event_time, received) {
                        if is_implausible_date(candidate, received) {
                            f.event_time = None;
                        }
                    }
                }
            }

            if !entities.is_empty() {
                entity_count += entities.len();
                ctx.entities.extend(entities.clone());
                ctx.featured_items.push(FeaturedItem::Entity(entities.into_iter().next().unwrap()));
            } else {
                ctx.featured_items.push(FeaturedItem::RawEmail(email.clone()));
            }
        }

        let mut result = StageResult::ok(ctx.filtered_emails.len(), ctx.featured_items.len());
        result.metadata.insert("entity_count".to_string(), entity_count.to_string());
        result
            .metadata
            .insert("noise_count".to_string(), ctx.noise_summary.values().sum::<u32>().to_string());
        result
    }
}

impl EntityExtractionStage {
    async fn try_llm_title(&self, client: &dyn LlmClient, email: &Email) -> Option<String> {
        let prompt = format!(
            "Extract a short title (max 8 words) for this email. Reply with just the title.\n\nSubject: {}\nPreview: {}",
            email.subject, email.snippet
        );
        let config = LlmConfig {
            response_format: ResponseFormat::Text,
            ..LlmConfig::default()
        };
        generate_with_retry(client, &prompt, &config, 1).await.ok().map(|t| t.trim().to_string())
    }
}

fn received_date(email: &Email) -> Option<DateTime<Utc>> {
    crate::temporal::parse_received_date(&email.date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::context::TemporalContext;
    use chrono::TimeZone;

    fn email(id: &str, subject: &str, snippet: &str, t: EmailType) -> Email {
        Email {
            id: id.into(),
            thread_id: format!("{id}-t"),
            subject: subject.into(),
            snippet: snippet.into(),
            from: "a@example.com".into(),
            date: "Mon, 10 Nov 2025 12:00:00 +0000".into(),
            email_type: t,
            importance: None,
        }
    }

    fn ctx_with(email: Email, section: Section) -> PipelineContext {
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 12, 0, 0).unwrap();
        let mut ctx = PipelineContext::new(vec![email.clone()], now, chrono_tz::UTC, None, None, None, false);
        ctx.filtered_emails = vec![email.clone()];
        ctx.section_assignments.insert(email.id.clone(), section);
        ctx
    }

    #[tokio::test]
    async fn extracts_flight_entity_from_airline_and_number() {
        let e = email("e1", "Your United UA245 confirmation", "Confirmation code: ABC123", EmailType::Uncategorized);
        let mut ctx = ctx_with(e, Section::Today);
        let stage = EntityExtractionStage::new();
        stage.process(&mut ctx).await;
        assert_eq!(ctx.entities.len(), 1);
        match &ctx.entities[0].kind {
            EntityKind::Flight(f) => assert_eq!(f.flight_number.as_deref(), Some("UA245")),
            _ => panic!("expected flight entity"),
        }
    }

    #[tokio::test]
    async fn event_without_matching_pattern_falls_back_to_raw_email() {
        let e = email("e1", "Dinner plans", "Let's catch up", EmailType::Message);
        let mut ctx = ctx_with(e, Section::WorthKnowing);
        let stage = EntityExtractionStage::new();
        stage.process(&mut ctx).await;
        assert!(ctx.entities.is_empty());
        assert_eq!(ctx.featured_items.len(), 1);
        matches!(ctx.featured_items[0], FeaturedItem::RawEmail(_));
    }

    #[tokio::test]
    async fn noise_email_increments_noise_summary_without_entities() {
        let e = email("e1", "Weekly roundup", "news", EmailType::Newsletter);
        let mut ctx = ctx_with(e, Section::Noise);
        let stage = EntityExtractionStage::new();
        stage.process(&mut ctx).await;
        assert_eq!(ctx.noise_summary.get("newsletter"), Some(&1));
        assert!(ctx.featured_items.is_empty());
    }

    #[tokio::test]
    async fn event_entity_carries_event_time_from_temporal_context() {
        let e = email("e1", "Team meeting", "Conference room", EmailType::Event);
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 12, 0, 0).unwrap();
        let mut ctx = ctx_with(e.clone(), Section::Today);
        ctx.temporal_contexts.insert(
            e.id.clone(),
            TemporalContext {
                event_time: Some(now + Duration::hours(2)),
                ..Default::default()
            },
        );
        let stage = EntityExtractionStage::new();
        stage.process(&mut ctx).await;
        match &ctx.entities[0].kind {
            EntityKind::Event(f) => assert!(f.event_time.is_some()),
            _ => panic!("expected event entity"),
        }
    }

    #[test]
    fn implausible_date_window_rejects_far_future_dates() {
        let received = Utc.with_ymd_and_hms(2025, 11, 10, 12, 0, 0).unwrap();
        let far_future = received + Duration::days(400);
        assert!(is_implausible_date(far_future, received));
        let near = received + Duration::days(3);
        assert!(!is_implausible_date(near, received));
    }
}
