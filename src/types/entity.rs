use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::context::Section;

/// Location carried by flight/event entities. Any field may be unknown; a
/// canonical display string is always derivable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub state: Option<String>,
    pub airport_code: Option<String>,
    pub full_address: Option<String>,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(addr) = &self.full_address {
            return write!(f, "{addr}");
        }
        match (&self.city, &self.state) {
            (Some(city), Some(state)) => write!(f, "{city}, {state}"),
            (Some(city), None) => write!(f, "{city}"),
            (None, Some(state)) => write!(f, "{state}"),
            (None, None) => match &self.airport_code {
                Some(code) => write!(f, "{code}"),
                None => write!(f, ""),
            },
        }
    }
}

/// Fields shared by every entity variant (spec.md §3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHeader {
    pub confidence: f32,
    pub source_email_id: String,
    pub source_thread_id: String,
    pub source_subject: String,
    pub source_snippet: String,
    pub timestamp: DateTime<Utc>,
    pub importance: String,
    pub stored_importance: Option<String>,
    pub resolved_importance: Option<String>,
    pub decay_reason: Option<String>,
    pub was_modified: bool,
    pub digest_section: Option<Section>,
    pub hide_in_digest: bool,
}

impl EntityHeader {
    pub fn new(
        source_email_id: impl Into<String>,
        source_thread_id: impl Into<String>,
        source_subject: impl Into<String>,
        source_snippet: impl Into<String>,
        timestamp: DateTime<Utc>,
        section: Section,
    ) -> Self {
        Self {
            confidence: 1.0,
            source_email_id: source_email_id.into(),
            source_thread_id: source_thread_id.into(),
            source_subject: source_subject.into(),
            source_snippet: source_snippet.into(),
            timestamp,
            importance: section.as_str().to_string(),
            stored_importance: Some(section.as_str().to_string()),
            resolved_importance: None,
            decay_reason: None,
            was_modified: false,
            digest_section: Some(section),
            hide_in_digest: false,
        }
    }

    /// Fallback section derived from `importance` when `digest_section` has
    /// not yet been populated by enrichment.
    pub fn importance_section(&self) -> Section {
        match self.importance.as_str() {
            "critical" => Section::Critical,
            "today" => Section::Today,
            "coming_up" => Section::ComingUp,
            _ => Section::WorthKnowing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightFields {
    pub airline: Option<String>,
    pub flight_number: Option<String>,
    pub departure: Option<Location>,
    pub arrival: Option<Location>,
    pub departure_time: Option<String>,
    pub confirmation_code: Option<String>,
    pub weather_context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFields {
    pub title: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub event_end_time: Option<DateTime<Utc>>,
    pub location: Option<Location>,
    pub organizer: Option<String>,
    pub weather_context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineFields {
    pub title: Option<String>,
    pub due_date: Option<String>,
    pub amount: Option<String>,
    pub from_whom: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderFields {
    pub from_sender: Option<String>,
    pub action: Option<String>,
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoFields {
    pub merchant: Option<String>,
    pub offer: Option<String>,
    pub expiry: Option<String>,
    pub product_category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFields {
    pub category: Option<String>,
    pub message: Option<String>,
    pub action_required: bool,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub ship_status: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
}

/// Tagged sum type standing in for the source's capability/protocol
/// abstraction across entity variants (spec.md §9 "Dynamic dispatch on
/// entities"). Rendering and enrichment dispatch on this tag rather than
/// probing for field presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    Flight(FlightFields),
    Event(EventFields),
    Deadline(DeadlineFields),
    Reminder(ReminderFields),
    Promo(PromoFields),
    Notification(NotificationFields),
}

impl EntityKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EntityKind::Flight(_) => "flight",
            EntityKind::Event(_) => "event",
            EntityKind::Deadline(_) => "deadline",
            EntityKind::Reminder(_) => "reminder",
            EntityKind::Promo(_) => "promo",
            EntityKind::Notification(_) => "notification",
        }
    }

    /// A short human title used by the deterministic renderer when no
    /// narrative LLM prose is available.
    pub fn display_title(&self) -> Option<String> {
        match self {
            EntityKind::Flight(f) => f
                .flight_number
                .clone()
                .or_else(|| f.airline.clone())
                .map(|n| format!("Flight {n}")),
            EntityKind::Event(e) => e.title.clone(),
            EntityKind::Deadline(d) => d.title.clone(),
            EntityKind::Reminder(r) => r.action.clone(),
            EntityKind::Promo(p) => p.offer.clone().or_else(|| p.merchant.clone()),
            EntityKind::Notification(n) => n.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub header: EntityHeader,
    #[serde(flatten)]
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(header: EntityHeader, kind: EntityKind) -> Self {
        Self { header, kind }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
