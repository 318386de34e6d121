//! Time-adjusted decay (spec.md §4.4), shared between T1 section assignment
//! (per-email, `pipeline::stage_t1`) and entity-level enrichment decay
//! (per-entity, `pipeline::stage_enrichment`). Both apply the same rule over
//! different anchor sources, so the rule itself lives here once.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::types::context::Section;

/// Apply the §4.4 decay rule given an already-resolved anchor. `anchor` is
/// `None` when the caller has no further temporal signal to decay on; a
/// `today`/`coming_up` input with no anchor falls back to `worth_knowing`
/// defensively. This should not happen for T1 (T0's `today`/`coming_up` rows
/// both require a temporal signal to be reached in the first place) but does
/// legitimately happen in entity-level decay — e.g. a promo with no
/// parseable expiry.
pub fn decay_section(t0: Section, anchor: Option<DateTime<Utc>>, now: DateTime<Utc>, tz: Tz) -> Section {
    match t0 {
        Section::Critical => Section::Critical,
        Section::Noise => Section::Noise,
        Section::Skip => Section::Skip,
        Section::WorthKnowing => Section::WorthKnowing,
        Section::Today | Section::ComingUp => {
            let Some(anchor) = anchor else {
                return Section::WorthKnowing;
            };
            if anchor + Duration::hours(1) < now {
                return Section::Skip;
            }

            let today_local = now.with_timezone(&tz).date_naive();
            let anchor_local = anchor.with_timezone(&tz).date_naive();
            let days_out = anchor_local.signed_duration_since(today_local).num_days();

            if days_out <= 0 {
                // Either today, or already past its own local day but not yet
                // past-grace — ties broken toward the earlier bucket (spec.md §4.4).
                Section::Today
            } else if days_out <= 7 {
                Section::ComingUp
            } else {
                Section::WorthKnowing
            }
        }
    }
}

/// Human-readable reason for a decay outcome, used to stamp
/// `Entity.header.decay_reason` (spec.md §3.4).
pub fn decay_reason(from: Section, to: Section, anchor: Option<DateTime<Utc>>) -> Option<String> {
    if from == to {
        return None;
    }
    match (to, anchor) {
        (Section::Skip, Some(anchor)) => Some(format!("past-grace: anchor {anchor} is over an hour old")),
        (Section::Today, _) => Some("anchor falls within the current local day".to_string()),
        (Section::ComingUp, _) => Some("anchor falls within the next 7 local days".to_string()),
        (Section::WorthKnowing, _) => Some("anchor is more than 7 local days out".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn critical_never_decays() {
        let now = Utc::now();
        assert_eq!(decay_section(Section::Critical, None, now, chrono_tz::UTC), Section::Critical);
    }

    #[test]
    fn anchor_past_grace_becomes_skip() {
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 12, 0, 0).unwrap();
        let anchor = now - Duration::hours(2);
        assert_eq!(
            decay_section(Section::Today, Some(anchor), now, chrono_tz::UTC),
            Section::Skip
        );
    }

    #[test]
    fn anchor_today_stays_today() {
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 9, 0, 0).unwrap();
        let anchor = Utc.with_ymd_and_hms(2025, 11, 10, 18, 0, 0).unwrap();
        assert_eq!(
            decay_section(Section::ComingUp, Some(anchor), now, chrono_tz::UTC),
            Section::Today
        );
    }

    #[test]
    fn anchor_within_week_is_coming_up() {
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 9, 0, 0).unwrap();
        let anchor = now + Duration::days(5);
        assert_eq!(
            decay_section(Section::Today, Some(anchor), now, chrono_tz::UTC),
            Section::ComingUp
        );
    }

    #[test]
    fn anchor_beyond_week_is_worth_knowing() {
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 9, 0, 0).unwrap();
        let anchor = now + Duration::days(30);
        assert_eq!(
            decay_section(Section::Today, Some(anchor), now, chrono_tz::UTC),
            Section::WorthKnowing
        );
    }

    #[test]
    fn missing_anchor_on_today_falls_back_to_worth_knowing() {
        let now = Utc::now();
        assert_eq!(
            decay_section(Section::Today, None, now, chrono_tz::UTC),
            Section::WorthKnowing
        );
    }
}
