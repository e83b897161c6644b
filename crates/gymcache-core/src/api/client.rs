//! REST client for the gym backend.
//!
//! Queries use PostgREST's nested `select` syntax so each dataset arrives
//! in a single request with its relations embedded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::{ApiError, BackendSource};
use crate::models::{CachedExercise, CachedRoutine, MembershipSnapshot, UserId};

// ============================================================================
// Constants
// ============================================================================

/// Path prefix of the REST data API relative to the backend URL.
const REST_PATH: &str = "rest/v1/";

/// Default HTTP request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Routine graph: routines → days → exercise assignments → exercise → images.
const ROUTINES_SELECT: &str = "id,name,description,category,\
routine_days(id,day_number,name,\
routine_exercises(id,sets,reps,rest_seconds,notes,order_index,\
exercise:exercises(id,name,muscle_group,exercise_images(url,order_index))))";

const EXERCISES_SELECT: &str =
    "id,name,muscle_group,description,instructions,exercise_images(url,order_index)";

const MEMBERSHIP_SELECT: &str = "id,plan_type,start_date,end_date,status,payment_method";

/// Backend client. Clone is cheap - reqwest::Client shares its pool.
#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    base_url: Url,
    api_key: Option<Arc<str>>,
    token: Option<Arc<str>>,
}

impl RestBackend {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        // Url::join drops the last segment unless the base ends with '/'
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');

        Ok(Self {
            client,
            base_url: Url::parse(&base)?,
            api_key: None,
            token: None,
        })
    }

    /// Project key sent as the `apikey` header.
    pub fn with_api_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Bearer token of the current session, sharing the connection pool.
    pub fn with_token(&self, token: impl Into<Arc<str>>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            token: Some(token.into()),
        }
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.api_key {
            headers.insert(
                "apikey",
                header::HeaderValue::from_str(key)
                    .map_err(|_| ApiError::InvalidResponse("API key is not a valid header".into()))?,
            );
        }
        // Fall back to the project key when there is no user session
        if let Some(bearer) = self.token.as_ref().or(self.api_key.as_ref()) {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", bearer))
                    .map_err(|_| ApiError::InvalidResponse("Token is not a valid header".into()))?,
            );
        }
        Ok(headers)
    }

    /// Build a table URL with the given query pairs.
    pub(crate) fn table_url(&self, table: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self.base_url.join(REST_PATH)?.join(table)?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    pub(crate) fn routines_url(&self) -> Result<Url, ApiError> {
        self.table_url(
            "routines",
            &[
                ("select", ROUTINES_SELECT),
                ("order", "name.asc"),
                ("routine_days.order", "day_number.asc"),
                ("routine_days.routine_exercises.order", "order_index.asc"),
            ],
        )
    }

    pub(crate) fn exercises_url(&self) -> Result<Url, ApiError> {
        self.table_url(
            "exercises",
            &[
                ("select", EXERCISES_SELECT),
                ("order", "name.asc"),
                ("exercise_images.order", "order_index.asc"),
            ],
        )
    }

    pub(crate) fn membership_url(&self, user_id: &UserId) -> Result<Url, ApiError> {
        let filter = format!("eq.{}", user_id);
        self.table_url(
            "memberships",
            &[
                ("select", MEMBERSHIP_SELECT),
                ("user_id", filter.as_str()),
                ("order", "start_date.desc"),
                ("limit", "1"),
            ],
        )
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry).
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url.clone())
                .headers(self.auth_headers()?)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    return serde_json::from_str(&text).map_err(|e| {
                        ApiError::InvalidResponse(format!("{} from {}", e, url.path()))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url.path(), retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    /// One cheap request to tell whether the backend is reachable at all.
    pub async fn is_reachable(&self) -> bool {
        match self.client.head(self.base_url.clone()).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Backend unreachable");
                false
            }
        }
    }
}

#[async_trait]
impl BackendSource for RestBackend {
    async fn fetch_routines(&self) -> Result<Vec<CachedRoutine>, ApiError> {
        let routines: Vec<CachedRoutine> = self.get(self.routines_url()?).await?;
        debug!(count = routines.len(), "Routines fetched");
        Ok(routines)
    }

    async fn fetch_exercises(&self) -> Result<Vec<CachedExercise>, ApiError> {
        let exercises: Vec<CachedExercise> = self.get(self.exercises_url()?).await?;
        debug!(count = exercises.len(), "Exercises fetched");
        Ok(exercises)
    }

    async fn fetch_latest_membership(
        &self,
        user_id: &UserId,
    ) -> Result<Option<MembershipSnapshot>, ApiError> {
        let rows: Vec<MembershipSnapshot> = self.get(self.membership_url(user_id)?).await?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_keep_base_path() {
        let backend = RestBackend::new("https://db.example.com/project").unwrap();
        let url = backend.exercises_url().unwrap();
        assert_eq!(url.path(), "/project/rest/v1/exercises");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("order".to_string(), "name.asc".to_string())));
        assert!(pairs.contains(&("exercise_images.order".to_string(), "order_index.asc".to_string())));
    }

    #[test]
    fn test_membership_url_filters_by_user_and_limits() {
        let backend = RestBackend::new("https://db.example.com/").unwrap();
        let url = backend.membership_url(&UserId::from("user-42")).unwrap();

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("user_id".to_string(), "eq.user-42".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "1".to_string())));
        assert!(pairs.contains(&("order".to_string(), "start_date.desc".to_string())));
    }

    #[test]
    fn test_routines_select_embeds_full_graph() {
        let backend = RestBackend::new("https://db.example.com").unwrap();
        let url = backend.routines_url().unwrap();
        let select = url
            .query_pairs()
            .find(|(k, _)| k == "select")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(select.contains("routine_days("));
        assert!(select.contains("routine_exercises("));
        assert!(select.contains("exercise:exercises("));
        assert!(select.contains("exercise_images(url,order_index)"));
    }

    #[test]
    fn test_token_falls_back_to_api_key() {
        let backend = RestBackend::new("https://db.example.com").unwrap().with_api_key("anon");
        let headers = backend.auth_headers().unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer anon");

        let signed_in = backend.with_token("user-jwt");
        let headers = signed_in.auth_headers().unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer user-jwt");
        assert_eq!(headers.get("apikey").unwrap(), "anon");
    }
}
