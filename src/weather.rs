//! Weather collaborator (spec.md §4.7 step 2, §6). Result carries only
//! `temp`/`condition`/`city`; cached per `(city_lower, region_lower)` for 30
//! minutes (spec.md §5). Trait/impl/fake shape follows `captcha.rs`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration as StdDuration, Instant};

use anyhow::Result;
use serde::Deserialize;

use crate::types::context::Weather;

const CACHE_TTL: StdDuration = StdDuration::from_secs(30 * 60);

#[async_trait::async_trait]
pub trait WeatherClient: Send + Sync {
    async fn get(&self, city: &str, region: Option<&str>) -> Result<Option<Weather>>;
}

fn cache_key(city: &str, region: Option<&str>) -> String {
    match region {
        Some(r) => format!("{}:{}", city.to_lowercase(), r.to_lowercase()),
        None => city.to_lowercase(),
    }
}

struct CacheEntry {
    value: Option<Weather>,
    inserted_at: Instant,
}

/// Append-only-within-TTL cache: a stale entry is replaced wholesale, never
/// mutated in place (spec.md §5 "refresh replaces an entry atomically").
#[derive(Default)]
struct WeatherCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl WeatherCache {
    fn get(&self, key: &str) -> Option<Option<Weather>> {
        let entries = self.entries.lock().unwrap();
        entries.get(key).and_then(|e| {
            if e.inserted_at.elapsed() < CACHE_TTL {
                Some(e.value.clone())
            } else {
                None
            }
        })
    }

    fn put(&self, key: String, value: Option<Weather>) {
        self.entries.lock().unwrap().insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }
}

/// `wttr.in`-backed implementation, the fallback provider `weather_service.py`
/// reaches for when no paid API key is configured. `reqwest`/`rustls-tls`,
/// matching `captcha.rs`'s HTTP client shape.
pub struct WttrInWeatherClient {
    http_client: reqwest::Client,
    cache: WeatherCache,
}

impl Default for WttrInWeatherClient {
    fn default() -> Self {
        Self {
            http_client: reqwest::Client::new(),
            cache: WeatherCache::default(),
        }
    }
}

impl WttrInWeatherClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Deserialize)]
struct WttrResponse {
    current_condition: Vec<WttrCurrentCondition>,
}

#[derive(Deserialize)]
struct WttrCurrentCondition {
    #[serde(rename = "temp_F")]
    temp_f: String,
    #[serde(rename = "weatherDesc")]
    weather_desc: Vec<WttrDesc>,
}

#[derive(Deserialize)]
struct WttrDesc {
    value: String,
}

#[async_trait::async_trait]
impl WeatherClient for WttrInWeatherClient {
    async fn get(&self, city: &str, region: Option<&str>) -> Result<Option<Weather>> {
        let key = cache_key(city, region);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let location = match region {
            Some(r) => format!("{city},{r}"),
            None => city.to_string(),
        };
        let url = format!("https://wttr.in/{}?format=j1", urlencoding::encode(&location));

        let result = async {
            let response = self
                .http_client
                .get(&url)
                .timeout(StdDuration::from_secs(10))
                .send()
                .await?;
            let parsed: WttrResponse = response.json().await?;
            let current = parsed.current_condition.into_iter().next();
            anyhow::Ok(current.and_then(|c| {
                let temp = c.temp_f.parse::<f32>().ok()? as i32;
                let condition = c.weather_desc.into_iter().next()?.value;
                Some(Weather {
                    temp,
                    condition,
                    city: city.to_string(),
                })
            }))
        }
        .await;

        let weather = match result {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(city, error = %e, "weather fetch failed");
                None
            }
        };

        self.cache.put(key, weather.clone());
        Ok(weather)
    }
}

// ============================================================================
// Test utilities
// ============================================================================

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    pub(crate) struct FakeWeatherClient {
        result: Option<Weather>,
    }

    impl FakeWeatherClient {
        pub(crate) fn some(temp: i32, condition: &str, city: &str) -> Self {
            Self {
                result: Some(Weather {
                    temp,
                    condition: condition.to_string(),
                    city: city.to_string(),
                }),
            }
        }

        pub(crate) fn none() -> Self {
            Self { result: None }
        }
    }

    #[async_trait::async_trait]
    impl WeatherClient for FakeWeatherClient {
        async fn get(&self, _city: &str, _region: Option<&str>) -> Result<Option<Weather>> {
            Ok(self.result.clone())
        }
    }

    #[test]
    fn cache_key_includes_region_for_disambiguation() {
        assert_ne!(cache_key("Brooklyn", Some("New York")), cache_key("Brooklyn", Some("Connecticut")));
        assert_eq!(cache_key("Brooklyn", None), "brooklyn");
    }
}
