//! Overpass HTTP client with rate-limit backoff and endpoint rotation.
//!
//! Public Overpass instances answer 429 freely under load. Each query is tried up
//! to `max_retries` times per endpoint, in endpoint order:
//! - 429: wait at least the server's `Retry-After`, then double the wait (capped)
//! - any other failure: sleep the current wait (capped), then grow it by 1.6x (capped)
//!
//! Only when every endpoint has used its retries does the caller see a
//! [`FetchError::Exhausted`]. No partial data is ever returned.

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::FetchError;
use crate::overpass::{parse_response, relations_query, select_relations, OverpassResponse, DEFAULT_ENDPOINTS};
use crate::places::{places_query, rank_places, Place};
use crate::{BoundingBox, RawRelation, RelationSource, Route};

/// Concurrent place lookups in [`OverpassClient::places_near_courses`].
const PLACES_CONCURRENCY: usize = 2;

/// Retry budget and backoff curve for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per endpoint.
    /// Default: 3
    pub max_retries: u32,

    /// First wait for each endpoint.
    /// Default: 2s
    pub initial_backoff: Duration,

    /// Ceiling for the doubled wait after a 429.
    /// Default: 20s
    pub rate_limit_cap: Duration,

    /// Longest sleep after a non-429 failure.
    /// Default: 10s
    pub error_sleep_cap: Duration,

    /// Ceiling for the grown wait after a non-429 failure.
    /// Default: 15s
    pub error_backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            rate_limit_cap: Duration::from_secs(20),
            error_sleep_cap: Duration::from_secs(10),
            error_backoff_cap: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// No sleeping at all. For tests and local mirrors.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            rate_limit_cap: Duration::ZERO,
            error_sleep_cap: Duration::ZERO,
            error_backoff_cap: Duration::ZERO,
        }
    }

    /// Wait to use after a 429 slept for `wait`.
    pub fn next_rate_limited_wait(&self, wait: Duration) -> Duration {
        wait.saturating_mul(2).min(self.rate_limit_cap)
    }

    /// How long to sleep after a non-429 failure.
    pub fn error_sleep(&self, wait: Duration) -> Duration {
        wait.min(self.error_sleep_cap)
    }

    /// Wait to use after a non-429 failure.
    pub fn next_error_wait(&self, wait: Duration) -> Duration {
        wait.mul_f64(1.6).min(self.error_backoff_cap)
    }
}

/// Where to send queries and how patiently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverpassConfig {
    /// Interpreter URLs, tried in order
    pub endpoints: Vec<String>,

    pub user_agent: String,

    /// Per-request timeout for relation queries.
    /// Default: 75s
    pub relation_timeout: Duration,

    /// Per-request timeout for place queries.
    /// Default: 60s
    pub places_timeout: Duration,

    pub retry: RetryPolicy,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            relation_timeout: Duration::from_secs(75),
            places_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a single request.
enum Attempt {
    Done(OverpassResponse),
    RateLimited(Option<Duration>),
    Failed(String),
}

/// `Retry-After` given as (possibly fractional) seconds. HTTP dates are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let seconds = value.trim().parse::<f64>().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

/// Overpass client shared across queries. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: Client,
    endpoints: Vec<String>,
    user_agent: String,
    relation_timeout: Duration,
    places_timeout: Duration,
    retry: RetryPolicy,
}

impl OverpassClient {
    pub fn new(config: &OverpassConfig) -> Result<Self, FetchError> {
        if config.endpoints.is_empty() {
            return Err(FetchError::NoEndpoints);
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoints: config.endpoints.clone(),
            user_agent: config.user_agent.clone(),
            relation_timeout: config.relation_timeout,
            places_timeout: config.places_timeout,
            retry: config.retry.clone(),
        })
    }

    async fn attempt(&self, endpoint: &str, query: &str, timeout: Duration) -> Attempt {
        let response = self
            .client
            .post(endpoint)
            .header(USER_AGENT, self.user_agent.as_str())
            .timeout(timeout)
            .body(query.to_string())
            .send()
            .await;

        let resp = match response {
            Ok(resp) => resp,
            Err(e) => return Attempt::Failed(format!("request error: {}", e)),
        };

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::RateLimited(parse_retry_after(resp.headers()));
        }
        if !status.is_success() {
            return Attempt::Failed(format!("HTTP {}", status));
        }

        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => return Attempt::Failed(format!("body download error: {}", e)),
        };

        match parse_response(&bytes) {
            Ok(parsed) => Attempt::Done(parsed),
            Err(e) => Attempt::Failed(format!("JSON parse error: {}", e)),
        }
    }

    /// Run one Overpass QL query, rotating endpoints and backing off until it
    /// succeeds or the retry budget is spent.
    pub async fn post_query(&self, query: &str, timeout: Duration) -> Result<OverpassResponse, FetchError> {
        let max_retries = self.retry.max_retries;
        let mut attempts = 0;
        let mut last_error = String::from("no attempts made");

        for endpoint in &self.endpoints {
            let mut wait = self.retry.initial_backoff;

            for retry in 1..=max_retries {
                attempts += 1;
                let last_try = retry == max_retries;

                match self.attempt(endpoint, query, timeout).await {
                    Attempt::Done(response) => {
                        if attempts > 1 {
                            info!("[OverpassClient] {} succeeded after {} attempts", endpoint, attempts);
                        }
                        return Ok(response);
                    }
                    Attempt::RateLimited(retry_after) => {
                        if let Some(server_wait) = retry_after {
                            wait = wait.max(server_wait);
                        }
                        warn!(
                            "[OverpassClient] 429 from {} (try {}/{}), backing off {:?}",
                            endpoint, retry, max_retries, wait
                        );
                        if !last_try {
                            tokio::time::sleep(wait).await;
                        }
                        wait = self.retry.next_rate_limited_wait(wait);
                        last_error = format!("HTTP 429 Too Many Requests from {}", endpoint);
                    }
                    Attempt::Failed(error) => {
                        let sleep = self.retry.error_sleep(wait);
                        warn!(
                            "[OverpassClient] {} failed (try {}/{}): {}, retrying in {:?}",
                            endpoint, retry, max_retries, error, sleep
                        );
                        if !last_try {
                            tokio::time::sleep(sleep).await;
                        }
                        wait = self.retry.next_error_wait(wait);
                        last_error = error;
                    }
                }
            }

            debug!("[OverpassClient] Rotating away from {}", endpoint);
        }

        Err(FetchError::Exhausted {
            attempts,
            endpoints: self.endpoints.len(),
            last_error,
        })
    }

    /// Named hiking/foot relations in `bbox`, at most `max_relations`.
    pub async fn fetch_trail_relations(
        &self,
        bbox: &BoundingBox,
        max_relations: usize,
    ) -> Result<Vec<RawRelation>, FetchError> {
        let start = Instant::now();
        let response = self.post_query(&relations_query(bbox), self.relation_timeout).await?;
        let relations = select_relations(&response, max_relations);

        info!(
            "[OverpassClient] {} elements -> {} relations in {:?}",
            response.elements.len(),
            relations.len(),
            start.elapsed()
        );
        Ok(relations)
    }

    /// Cafés and bars within `radius_m` of a point, best first.
    pub async fn places_near(&self, lat: f64, lon: f64, radius_m: u32) -> Result<Vec<Place>, FetchError> {
        let response = self
            .post_query(&places_query(lat, lon, radius_m), self.places_timeout)
            .await?;
        let places = rank_places(&response, lat, lon, radius_m);
        debug!("[OverpassClient] {} places within {}m of ({}, {})", places.len(), radius_m, lat, lon);
        Ok(places)
    }

    /// Places near the end of each course, keyed by `course_id`, in course order.
    ///
    /// A failed lookup only affects its own course.
    pub async fn places_near_courses(
        &self,
        courses: &[Route],
        radius_m: u32,
    ) -> Vec<(String, Result<Vec<Place>, FetchError>)> {
        stream::iter(courses)
            .map(|course| async move {
                let places = self
                    .places_near(course.end.latitude, course.end.longitude, radius_m)
                    .await;
                if let Err(ref e) = places {
                    warn!("[OverpassClient] No places for {}: {}", course.course_id, e);
                }
                (course.course_id.clone(), places)
            })
            .buffered(PLACES_CONCURRENCY)
            .collect()
            .await
    }
}

impl RelationSource for OverpassClient {
    async fn fetch_relations(
        &self,
        bbox: &BoundingBox,
        max_relations: usize,
    ) -> Result<Vec<RawRelation>, FetchError> {
        self.fetch_trail_relations(bbox, max_relations).await
    }
}
