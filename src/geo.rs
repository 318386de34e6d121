//! IP geolocation collaborator (spec.md §4.7 step 2, §6), grounded on
//! `location_service.py`. Two-TTL cache policy per spec.md §5: 1 hour for a
//! successful lookup, 5 minutes for a fallback — a deliberate deviation from
//! the Python original, which caches both for the same hour (see DESIGN.md).

use std::sync::Mutex;
use std::time::{Duration as StdDuration, Instant};

use anyhow::Result;
use serde::Deserialize;

const SUCCESS_TTL: StdDuration = StdDuration::from_secs(60 * 60);
const FALLBACK_TTL: StdDuration = StdDuration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoLocation {
    pub city: String,
    pub region: String,
    pub country: String,
}

#[async_trait::async_trait]
pub trait GeoClient: Send + Sync {
    async fn locate(&self) -> Result<Option<GeoLocation>>;
}

struct CachedLocation {
    value: Option<GeoLocation>,
    inserted_at: Instant,
    ttl: StdDuration,
}

#[derive(Default)]
struct GeoCache {
    entry: Mutex<Option<CachedLocation>>,
}

impl GeoCache {
    fn get(&self) -> Option<Option<GeoLocation>> {
        let entry = self.entry.lock().unwrap();
        entry.as_ref().and_then(|e| {
            if e.inserted_at.elapsed() < e.ttl {
                Some(e.value.clone())
            } else {
                None
            }
        })
    }

    fn put(&self, value: Option<GeoLocation>, ttl: StdDuration) {
        *self.entry.lock().unwrap() = Some(CachedLocation {
            value,
            inserted_at: Instant::now(),
            ttl,
        });
    }
}

/// `ipapi.co`-backed implementation. Falls back to a hardcoded New York
/// location on failure (matching `location_service.py`'s behaviour), but
/// caches that fallback for only 5 minutes so a flaky provider is retried
/// sooner (spec.md §5).
pub struct IpApiGeoClient {
    http_client: reqwest::Client,
    cache: GeoCache,
}

impl Default for IpApiGeoClient {
    fn default() -> Self {
        Self {
            http_client: reqwest::Client::new(),
            cache: GeoCache::default(),
        }
    }
}

impl IpApiGeoClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Deserialize)]
struct IpApiResponse {
    city: Option<String>,
    region: Option<String>,
    country_name: Option<String>,
}

#[async_trait::async_trait]
impl GeoClient for IpApiGeoClient {
    async fn locate(&self) -> Result<Option<GeoLocation>> {
        if let Some(cached) = self.cache.get() {
            return Ok(cached);
        }

        let result = async {
            let response = self
                .http_client
                .get("https://ipapi.co/json/")
                .timeout(StdDuration::from_secs(3))
                .send()
                .await?;
            let parsed: IpApiResponse = response.json().await?;
            anyhow::Ok(GeoLocation {
                city: parsed.city.unwrap_or_default(),
                region: parsed.region.unwrap_or_default(),
                country: parsed.country_name.unwrap_or_default(),
            })
        }
        .await;

        match result {
            Ok(location) => {
                self.cache.put(Some(location.clone()), SUCCESS_TTL);
                Ok(Some(location))
            }
            Err(e) => {
                tracing::warn!(error = %e, "IP geolocation failed, using fallback location");
                let fallback = GeoLocation {
                    city: "New York".to_string(),
                    region: "New York".to_string(),
                    country: "United States".to_string(),
                };
                self.cache.put(Some(fallback.clone()), FALLBACK_TTL);
                Ok(Some(fallback))
            }
        }
    }
}

// ============================================================================
// Test utilities
// ============================================================================

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    pub(crate) struct FakeGeoClient {
        result: Option<GeoLocation>,
    }

    impl FakeGeoClient {
        pub(crate) fn some(city: &str, region: &str) -> Self {
            Self {
                result: Some(GeoLocation {
                    city: city.to_string(),
                    region: region.to_string(),
                    country: "United States".to_string(),
                }),
            }
        }

        pub(crate) fn none() -> Self {
            Self { result: None }
        }
    }

    #[async_trait::async_trait]
    impl GeoClient for FakeGeoClient {
        async fn locate(&self) -> Result<Option<GeoLocation>> {
            Ok(self.result.clone())
        }
    }
}
