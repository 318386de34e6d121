//! T0 intrinsic section assignment (spec.md §4.3). A pure function of
//! `(email, temporal_ctx)` — no `now` parameter, so it is trivially testable
//! and trivially idempotent. Grounded on `section_assignment_t0.py`'s intent
//! (that file is a stub in the retrieved pack; the decision table here is
//! spec.md's own, which is the sole source of truth for this stage).

use crate::types::context::{Section, TemporalContext};
use crate::types::email::{Email, EmailType};

const FRAUD_SECURITY_PHRASES: &[&str] = &[
    "fraud alert",
    "security alert",
    "suspicious activity",
    "unauthorized access",
    "account compromised",
    "account has been compromised",
    "unusual sign-in activity",
];

const ACTION_REQUIRED_PHRASES: &[&str] = &[
    "action required",
    "action needed",
    "please respond",
    "respond by",
    "requires your attention",
    "requires immediate attention",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Assign the intrinsic (T0) section for one email. Pure: calling this twice
/// on the same `(email, temporal_ctx)` always returns the same label
/// (spec.md §8 invariant 4).
pub fn assign_section_t0(email: &Email, temporal_ctx: Option<&TemporalContext>) -> Section {
    let text = email.searchable_text();

    if matches!(email.email_type, EmailType::Otp) || contains_any(&text, FRAUD_SECURITY_PHRASES) {
        return Section::Critical;
    }

    if let Some(ctx) = temporal_ctx {
        if ctx.event_time.is_some() && matches!(email.email_type, EmailType::Event) {
            return Section::Today;
        }
        if ctx.delivery_date.is_some()
            && matches!(email.email_type, EmailType::Shipping | EmailType::Order)
        {
            return Section::Today;
        }
        if ctx.event_time.is_some() {
            return Section::ComingUp;
        }
    }

    match email.email_type {
        EmailType::Receipt | EmailType::Message => Section::WorthKnowing,
        EmailType::Notification if contains_any(&text, ACTION_REQUIRED_PHRASES) => {
            Section::WorthKnowing
        }
        EmailType::Newsletter | EmailType::Promotion => Section::Noise,
        _ => Section::WorthKnowing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::email::Importance;

    fn email(subject: &str, t: EmailType) -> Email {
        Email {
            id: "e1".into(),
            thread_id: "t1".into(),
            subject: subject.into(),
            snippet: String::new(),
            from: "a@example.com".into(),
            date: "Mon, 10 Nov 2025 12:00:00 +0000".into(),
            email_type: t,
            importance: None::<Importance>,
        }
    }

    #[test]
    fn otp_is_always_critical() {
        let e = email("Your code", EmailType::Otp);
        assert_eq!(assign_section_t0(&e, None), Section::Critical);
    }

    #[test]
    fn fraud_phrase_is_critical_regardless_of_type() {
        let e = email("Suspicious activity on your account", EmailType::Notification);
        assert_eq!(assign_section_t0(&e, None), Section::Critical);
    }

    #[test]
    fn event_with_event_time_is_today() {
        let e = email("Dinner invite", EmailType::Event);
        let ctx = TemporalContext {
            event_time: Some(chrono::Utc::now()),
            ..Default::default()
        };
        assert_eq!(assign_section_t0(&e, Some(&ctx)), Section::Today);
    }

    #[test]
    fn shipping_with_delivery_date_is_today() {
        let e = email("Your package is out for delivery", EmailType::Shipping);
        let ctx = TemporalContext {
            delivery_date: Some(chrono::Utc::now()),
            ..Default::default()
        };
        assert_eq!(assign_section_t0(&e, Some(&ctx)), Section::Today);
    }

    #[test]
    fn event_time_on_non_event_type_is_coming_up() {
        let e = email("Flight confirmation", EmailType::Uncategorized);
        let ctx = TemporalContext {
            event_time: Some(chrono::Utc::now()),
            ..Default::default()
        };
        assert_eq!(assign_section_t0(&e, Some(&ctx)), Section::ComingUp);
    }

    #[test]
    fn newsletter_without_temporal_signal_is_noise() {
        let e = email("This week in Rust", EmailType::Newsletter);
        assert_eq!(assign_section_t0(&e, None), Section::Noise);
    }

    #[test]
    fn receipt_is_worth_knowing() {
        let e = email("Your receipt", EmailType::Receipt);
        assert_eq!(assign_section_t0(&e, None), Section::WorthKnowing);
    }

    #[test]
    fn is_pure_across_repeated_calls() {
        let e = email("Weekly digest", EmailType::Newsletter);
        assert_eq!(assign_section_t0(&e, None), assign_section_t0(&e, None));
    }
}
