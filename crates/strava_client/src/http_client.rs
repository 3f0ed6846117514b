//! HTTP client implementation for the Strava v3 API.
//!
//! This module provides a reqwest-based implementation of the [`StravaClient`](crate::StravaClient) trait.

use crate::{ActivityRecord, Gear, StravaClient, StravaError};
use async_trait::async_trait;
use metrics::counter;
use secrecy::{ExposeSecret, SecretString};

/// Client for the Strava API using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestStravaClient {
    base_url: String,
    access_token: SecretString,
    client: reqwest::Client,
}

impl ReqwestStravaClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - API root including the version segment (e.g., "https://www.strava.com/api/v3")
    /// * `access_token` - OAuth2 bearer token
    pub fn new(base_url: &str, access_token: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("strava-export/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client build should not fail");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            client,
        }
    }

    /// Build an authenticated GET request for a route below the API root.
    fn get_request(&self, route: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, route.trim_start_matches('/'));
        self.client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
    }

    /// Execute a request and decode a JSON body on 200.
    ///
    /// Any other status is logged with its body and mapped to `Ok(None)`.
    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, StravaError> {
        let resp = request.send().await.inspect_err(|_| {
            counter!("strava_api_requests_total", "result" => "failure").increment(1);
        })?;
        let status = resp.status();
        let url = resp.url().path().to_string();
        if status != reqwest::StatusCode::OK {
            counter!("strava_api_requests_total", "result" => "failure").increment(1);
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %url, %body, "strava request returned no data");
            return Ok(None);
        }

        // Read as text first so a decoding failure can show what came back.
        let text = resp.text().await?;
        counter!("strava_api_requests_total", "result" => "success").increment(1);
        serde_json::from_str::<T>(&text).map(Some).map_err(|e| {
            let body_snippet: String = text.chars().take(512).collect();
            StravaError::Decode(format!("{url}: {e} - body: {body_snippet}"))
        })
    }
}

#[async_trait]
impl StravaClient for ReqwestStravaClient {
    async fn list_activities(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Option<Vec<ActivityRecord>>, StravaError> {
        tracing::debug!(page, per_page, "listing activities");
        let request = self
            .get_request("athlete/activities")
            .query(&[("per_page", per_page), ("page", page)]);
        self.execute_json(request).await
    }

    async fn get_activity(
        &self,
        activity_id: i64,
    ) -> Result<Option<ActivityRecord>, StravaError> {
        self.execute_json(self.get_request(&format!("activities/{activity_id}")))
            .await
    }

    async fn get_gear(&self, gear_id: &str) -> Result<Option<Gear>, StravaError> {
        self.execute_json(self.get_request(&format!("gear/{gear_id}")))
            .await
    }
}
