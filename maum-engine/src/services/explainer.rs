use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Profile;

/// Served whenever the text-generation service cannot produce an
/// explanation. Recommendations never fail because of missing text.
pub const FALLBACK_EXPLANATION: &str =
    "You two have a lot in common. Say hello and find out!";

const BREAKER_FAILURE_THRESHOLD: u32 = 3;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(60);

/// Trips after consecutive failures, then short-circuits to the fallback
/// until the cooldown elapses. One probe request closes it again.
pub struct CircuitBreaker {
    failures: AtomicU32,
    open_until: Mutex<Option<Instant>>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            open_until: Mutex::new(None),
            threshold,
            cooldown,
        }
    }

    pub fn is_open(&self) -> bool {
        let mut open_until = self.open_until.lock().unwrap_or_else(|e| e.into_inner());
        match *open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                // Cooldown elapsed; allow a probe through.
                *open_until = None;
                false
            }
            None => false,
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
        *self.open_until.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.threshold {
            *self.open_until.lock().unwrap_or_else(|e| e.into_inner()) =
                Some(Instant::now() + self.cooldown);
        }
    }
}

#[derive(Debug, Serialize)]
struct ProfileCard {
    id: Uuid,
    nickname: String,
    birth_year: i32,
    location: String,
    interests: Vec<String>,
    bio: Option<String>,
}

impl From<&Profile> for ProfileCard {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.user_id,
            nickname: profile.nickname.clone(),
            birth_year: profile.birth_year,
            location: profile.location.clone(),
            interests: profile.interest_codes(),
            bio: profile.bio.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExplainRequest {
    requester: ProfileCard,
    candidates: Vec<ProfileCard>,
}

#[derive(Debug, Deserialize)]
struct ExplainResponse {
    explanations: HashMap<Uuid, String>,
}

pub struct LiveExplainer {
    client: reqwest::Client,
    url: String,
    breaker: CircuitBreaker,
}

/// Explanation generator capability. `Live` talks to the external
/// text-generation service; `Static` is the degraded variant used when no
/// endpoint is configured.
pub enum Explainer {
    Live(LiveExplainer),
    Static,
}

impl Explainer {
    pub fn from_config(url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        if url.is_empty() {
            tracing::info!("no explainer endpoint configured, using static explanations");
            return Ok(Self::Static);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self::Live(LiveExplainer {
            client,
            url: url.to_string(),
            breaker: CircuitBreaker::new(BREAKER_FAILURE_THRESHOLD, BREAKER_COOLDOWN),
        }))
    }

    /// Explanations for the given candidates, keyed by candidate user id.
    /// May return a partial map; never errors. Callers substitute
    /// [`FALLBACK_EXPLANATION`] for anything missing.
    pub async fn batch_explain(
        &self,
        requester: &Profile,
        candidates: &[Profile],
    ) -> HashMap<Uuid, String> {
        if candidates.is_empty() {
            return HashMap::new();
        }

        let live = match self {
            Self::Live(live) => live,
            Self::Static => return HashMap::new(),
        };

        if live.breaker.is_open() {
            tracing::debug!("explainer circuit open, skipping call");
            return HashMap::new();
        }

        let request = ExplainRequest {
            requester: ProfileCard::from(requester),
            candidates: candidates.iter().map(ProfileCard::from).collect(),
        };

        match live.request(&request).await {
            Ok(explanations) => {
                live.breaker.record_success();
                explanations
            }
            Err(e) => {
                live.breaker.record_failure();
                tracing::warn!(error = %e, "explainer request failed, falling back");
                HashMap::new()
            }
        }
    }
}

impl LiveExplainer {
    async fn request(&self, request: &ExplainRequest) -> anyhow::Result<HashMap<Uuid, String>> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json::<ExplainResponse>()
            .await?;

        Ok(response.explanations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(!breaker.is_open());

        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());

        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn breaker_closes_after_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(1));
        breaker.record_failure();
        assert!(breaker.is_open());

        std::thread::sleep(Duration::from_millis(5));
        assert!(!breaker.is_open());
    }

    #[test]
    fn success_resets_failure_streak() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[tokio::test]
    async fn static_explainer_returns_empty_map() {
        let explainer = Explainer::from_config("", 5).unwrap();
        let requester = crate::models::tests::test_profile();
        let candidate = crate::models::tests::test_profile();

        let map = explainer.batch_explain(&requester, &[candidate]).await;
        assert!(map.is_empty());
    }
}
