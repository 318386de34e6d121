use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse, pre-classified kind of an email. Upstream classification assigns
/// this before the digest core ever sees the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    Newsletter,
    Receipt,
    Notification,
    Event,
    Message,
    Promotion,
    Otp,
    Shipping,
    Order,
    Uncategorized,
}

impl EmailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailType::Newsletter => "newsletter",
            EmailType::Receipt => "receipt",
            EmailType::Notification => "notification",
            EmailType::Event => "event",
            EmailType::Message => "message",
            EmailType::Promotion => "promotion",
            EmailType::Otp => "otp",
            EmailType::Shipping => "shipping",
            EmailType::Order => "order",
            EmailType::Uncategorized => "uncategorized",
        }
    }
}

/// Pre-fetched email, as handed to the pipeline by the caller. All fields
/// besides the ones named in spec.md §3.1 are opaque to the core and simply
/// not represented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub snippet: String,
    pub from: String,
    /// RFC 2822 date string, as received in the `Date:` header. Parsed
    /// lazily and tolerantly by the temporal extraction stage.
    pub date: String,
    #[serde(rename = "type")]
    pub email_type: EmailType,
    pub importance: Option<Importance>,
}

impl Email {
    /// Concatenation used throughout the pipeline (noise elevation keyword
    /// scan, generic date scanner, fact verification source text).
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.subject, self.snippet)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Critical,
    TimeSensitive,
    Routine,
}

/// A resolved timestamp plus the zone it was expressed in before conversion
/// to UTC. Everything stored is UTC; the zone is retained only for the
/// messages temporal extraction logs when it falls back.
pub type Instant = DateTime<Utc>;
