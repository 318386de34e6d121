use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::types::email::Email;
use crate::types::entity::Entity;

/// Per-email record of every date/time signal temporal extraction could pull
/// out. Emails with no parseable signal simply have no entry in
/// `PipelineContext::temporal_contexts`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalContext {
    pub event_time: Option<DateTime<Utc>>,
    pub event_end_time: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
}

impl TemporalContext {
    pub fn is_empty(&self) -> bool {
        self.event_time.is_none()
            && self.event_end_time.is_none()
            && self.delivery_date.is_none()
            && self.purchase_date.is_none()
            && self.expiration_date.is_none()
    }

    /// The latest known temporal marker, used as the decay anchor (spec.md
    /// glossary: "Anchor date").
    pub fn anchor(&self) -> Option<DateTime<Utc>> {
        [
            self.event_end_time,
            self.event_time,
            self.delivery_date,
        ]
        .into_iter()
        .flatten()
        .max()
    }
}

/// Presentation-section label. T0 assignment never produces `Skip`; T1 is the
/// only stage allowed to produce it (past-grace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Critical,
    Today,
    ComingUp,
    WorthKnowing,
    Noise,
    Skip,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Critical => "critical",
            Section::Today => "today",
            Section::ComingUp => "coming_up",
            Section::WorthKnowing => "worth_knowing",
            Section::Noise => "noise",
            Section::Skip => "skip",
        }
    }

    /// Order used for the fixed critical → today → coming_up → worth_knowing
    /// presentation sequence (spec.md §3.5).
    pub fn presentation_rank(&self) -> Option<u8> {
        match self {
            Section::Critical => Some(0),
            Section::Today => Some(1),
            Section::ComingUp => Some(2),
            Section::WorthKnowing => Some(3),
            Section::Noise | Section::Skip => None,
        }
    }
}

/// A weather reading, exactly the three fields the core consumes (spec.md
/// §6's weather collaborator contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weather {
    pub temp: i32,
    pub condition: String,
    pub city: String,
}

/// Either a rich Entity card or a raw email fallback card (spec.md §3.5).
#[derive(Debug, Clone)]
pub enum FeaturedItem {
    Entity(Entity),
    RawEmail(Email),
}

impl FeaturedItem {
    pub fn section(&self) -> Section {
        match self {
            FeaturedItem::Entity(e) => e.header.digest_section.unwrap_or(e.header.importance_section()),
            FeaturedItem::RawEmail(_) => Section::WorthKnowing,
        }
    }

    pub fn identification(&self) -> Option<&str> {
        match self {
            FeaturedItem::Entity(e) => Some(e.header.source_email_id.as_str()),
            FeaturedItem::RawEmail(email) => {
                if !email.id.is_empty() {
                    Some(email.id.as_str())
                } else if !email.thread_id.is_empty() {
                    Some(email.thread_id.as_str())
                } else {
                    None
                }
            }
        }
    }
}

/// The mutable record threaded through every stage. Constructed fresh per
/// `generate` call and never shared across calls (spec.md §3.6).
pub struct PipelineContext {
    // Inputs
    pub emails: Vec<Email>,
    pub now: DateTime<Utc>,
    pub user_timezone: Tz,
    pub user_name: Option<String>,
    pub city_hint: Option<String>,
    pub region_hint: Option<String>,
    pub raw_digest: bool,

    // State populated by stages, in stage order.
    pub filtered_emails: Vec<Email>,
    pub temporal_contexts: HashMap<String, TemporalContext>,
    pub section_assignments_t0: HashMap<String, Section>,
    pub section_assignments: HashMap<String, Section>,
    pub entities: Vec<Entity>,
    pub featured_items: Vec<FeaturedItem>,
    pub noise_summary: HashMap<String, u32>,
    pub weather: Option<Weather>,
    pub greeting: Option<String>,
    pub digest_html: String,
    pub digest_text: String,
    pub verified: bool,
    pub validation_errors: Vec<String>,
}

impl PipelineContext {
    pub fn new(
        emails: Vec<Email>,
        now: DateTime<Utc>,
        user_timezone: Tz,
        user_name: Option<String>,
        city_hint: Option<String>,
        region_hint: Option<String>,
        raw_digest: bool,
    ) -> Self {
        Self {
            emails,
            now,
            user_timezone,
            user_name,
            city_hint,
            region_hint,
            raw_digest,
            filtered_emails: Vec::new(),
            temporal_contexts: HashMap::new(),
            section_assignments_t0: HashMap::new(),
            section_assignments: HashMap::new(),
            entities: Vec::new(),
            featured_items: Vec::new(),
            noise_summary: HashMap::new(),
            weather: None,
            greeting: None,
            digest_html: String::new(),
            digest_text: String::new(),
            verified: false,
            validation_errors: Vec::new(),
        }
    }
}
