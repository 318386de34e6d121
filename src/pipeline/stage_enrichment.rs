//! Stage 6: enrichment (spec.md §4.7). Grounded on `digest_stages_v2.py`'s
//! `EnrichmentStage`: entity-level temporal decay, weather lookup (with
//! IP-geolocation fallback), then a one-line greeting. Each sub-step degrades
//! gracefully — a missing weather reading or geolocation failure never fails
//! the stage.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::decay::{decay_reason, decay_section};
use crate::geo::GeoClient;
use crate::pipeline::{Stage, StageResult};
use crate::types::context::{FeaturedItem, PipelineContext, Section, Weather};
use crate::types::entity::EntityKind;
use crate::weather::WeatherClient;

/// Entity-level decay anchor (spec.md §4.7 step 1: "operate on the entity's
/// own date, not the email's"). Only `Event` carries a structured timestamp;
/// the remaining kinds carry free-text date strings with no parser in this
/// corpus, so they fall back to `None` and simply never decay past their
/// stored importance.
fn entity_anchor(kind: &EntityKind) -> Option<DateTime<Utc>> {
    match kind {
        EntityKind::Event(f) => f.event_end_time.or(f.event_time),
        EntityKind::Notification(f) => f.otp_expires_at.or(f.delivered_at),
        _ => None,
    }
}

fn stored_section(stored: Option<&str>) -> Section {
    match stored {
        Some("critical") => Section::Critical,
        Some("today") => Section::Today,
        Some("coming_up") => Section::ComingUp,
        Some("noise") => Section::Noise,
        _ => Section::WorthKnowing,
    }
}

pub struct EnrichmentStage {
    name: String,
    deps: Vec<String>,
    weather_client: Option<Box<dyn WeatherClient>>,
    geo_client: Option<Box<dyn GeoClient>>,
}

impl EnrichmentStage {
    pub fn new() -> Self {
        Self {
            name: "enrichment".to_string(),
            deps: vec!["entity_stage".to_string()],
            weather_client: None,
            geo_client: None,
        }
    }

    pub fn with_weather_client(mut self, client: Box<dyn WeatherClient>) -> Self {
        self.weather_client = Some(client);
        self
    }

    pub fn with_geo_client(mut self, client: Box<dyn GeoClient>) -> Self {
        self.geo_client = Some(client);
        self
    }
}

impl Default for EnrichmentStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Stage for EnrichmentStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.deps
    }

    async fn process(&self, ctx: &mut PipelineContext) -> StageResult {
        let mut decayed = 0usize;
        for item in &mut ctx.featured_items {
            if let FeaturedItem::Entity(entity) = item {
                let stored = stored_section(entity.header.stored_importance.as_deref());
                let anchor = entity_anchor(&entity.kind);
                let resolved = decay_section(stored, anchor, ctx.now, ctx.user_timezone);

                if resolved != stored {
                    entity.header.was_modified = true;
                    entity.header.decay_reason = decay_reason(stored, resolved, anchor);
                    decayed += 1;
                }
                entity.header.resolved_importance = Some(resolved.as_str().to_string());
                entity.header.digest_section = Some(resolved);
                entity.header.hide_in_digest = resolved == Section::Skip;
            }
        }

        let weather = self.resolve_weather(ctx).await;
        ctx.weather = weather.clone();
        ctx.greeting = Some(generate_greeting(ctx.now, weather.as_ref(), ctx.user_name.as_deref()));

        let mut result = StageResult::ok(ctx.featured_items.len(), ctx.featured_items.len());
        result.metadata.insert("entities_decayed".to_string(), decayed.to_string());
        result
            .metadata
            .insert("weather_available".to_string(), ctx.weather.is_some().to_string());
        result
    }
}

impl EnrichmentStage {
    async fn resolve_weather(&self, ctx: &PipelineContext) -> Option<Weather> {
        let Some(weather_client) = &self.weather_client else {
            return None;
        };

        let mut city = ctx.city_hint.clone();
        let mut region = ctx.region_hint.clone();

        if city.is_none() {
            if let Some(geo_client) = &self.geo_client {
                match geo_client.locate().await {
                    Ok(Some(location)) => {
                        city = Some(location.city);
                        region = region.or(Some(location.region));
                    }
                    Ok(None) => {}
                    Err(e) => tracing::debug!(error = %e, "geolocation lookup failed"),
                }
            }
        }

        let city = city?;
        match weather_client.get(&city, region.as_deref()).await {
            Ok(weather) => weather,
            Err(e) => {
                tracing::debug!(city, error = %e, "weather lookup failed");
                None
            }
        }
    }
}

fn ordinal_suffix(day: u32) -> &'static str {
    if (4..=20).contains(&day) || (24..=30).contains(&day) {
        "th"
    } else {
        match day % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    }
}

fn weather_emoji(condition_lower: &str) -> &'static str {
    if condition_lower.contains("snow") || condition_lower.contains("flurr") {
        "❄️"
    } else if condition_lower.contains("rain") || condition_lower.contains("shower") || condition_lower.contains("drizzle") {
        "🌧️"
    } else if condition_lower.contains("thunder") || condition_lower.contains("storm") {
        "⛈️"
    } else if condition_lower.contains("cloud") || condition_lower.contains("overcast") {
        if condition_lower.contains("partly") || condition_lower.contains("partial") {
            "⛅"
        } else {
            "☁️"
        }
    } else if condition_lower.contains("clear") || condition_lower.contains("sunny") {
        "☀️"
    } else if condition_lower.contains("fog") || condition_lower.contains("mist") || condition_lower.contains("haz") {
        "🌫️"
    } else {
        ""
    }
}

/// One-line greeting (spec.md §4.7 step 3). Hour buckets, ordinal date, and
/// the weather suffix all mirror `_generate_greeting` in `digest_stages_v2.py`,
/// except the weather suffix carries a space after the em-dash
/// (`"— currently"`, not `"—currently"`) per spec.md's own wording.
pub fn generate_greeting(now: DateTime<Utc>, weather: Option<&Weather>, user_name: Option<&str>) -> String {
    let hour = now.hour();
    let mut time_greeting = if hour < 12 {
        "Good morning"
    } else if hour < 17 {
        "Good afternoon"
    } else {
        "Good evening"
    }
    .to_string();

    if let Some(name) = user_name.filter(|n| !n.is_empty()) {
        time_greeting = format!("{time_greeting}, {name}");
    }

    let day_name = now.format("%A");
    let day_num = now.day();
    let month_name = now.format("%B");
    let date_str = format!("{month_name} {day_num}{}", ordinal_suffix(day_num));

    let weather_str = match weather {
        Some(w) if !w.condition.is_empty() => {
            let condition_lower = w.condition.to_lowercase();
            let emoji = weather_emoji(&condition_lower);
            format!("— currently {}°F and {} {} in {}", w.temp, condition_lower, emoji, w.city)
                .trim_end()
                .to_string()
        }
        _ => String::new(),
    };

    if weather_str.is_empty() {
        format!("{time_greeting}. It's {day_name}, {date_str}.")
    } else {
        format!("{time_greeting}. It's {day_name}, {date_str} {weather_str}.")
    }
}
