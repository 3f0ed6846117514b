//! Minimal `StravaClient` trait and the types shared by its implementations.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub mod config;
pub mod http_client;
pub mod oauth;

/// Raw activity payload, kept as a JSON object so callers can look columns up by name.
pub type ActivityRecord = serde_json::Map<String, serde_json::Value>;

/// Scope requested during authorization: read access to all activity data.
pub const ACTIVITY_READ_SCOPE: &str = "activity:read_all";

/// Largest page the activity list endpoint will serve.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum StravaError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decoding error: {0}")]
    Decode(String),
    #[error("oauth token endpoint returned {status}: {body}")]
    OAuth { status: u16, body: String },
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Gear {
    pub id: String,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Gear {
    /// `"brand model"`, the way gear is shown in the export.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.brand_name.as_deref().unwrap_or_default(),
            self.model_name.as_deref().unwrap_or_default()
        )
    }
}

/// Read-only access to the athlete endpoints used by the exporter.
///
/// Every method returns `Ok(None)` when the API answered with a non-200
/// status: callers treat that as "no data" rather than a failure. Only
/// transport and decoding problems are reported as errors.
#[async_trait]
pub trait StravaClient: Send + Sync {
    /// One page of the authenticated athlete's activities, newest first.
    async fn list_activities(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Option<Vec<ActivityRecord>>, StravaError>;

    /// Detailed representation of a single activity.
    async fn get_activity(&self, activity_id: i64)
    -> Result<Option<ActivityRecord>, StravaError>;

    /// A single gear record.
    async fn get_gear(&self, gear_id: &str) -> Result<Option<Gear>, StravaError>;
}

#[cfg(test)]
mod tests {
    use super::Gear;
    use serde_json::json;

    #[test]
    fn gear_display_name_joins_brand_and_model() {
        let payload = json!({"id": "b123", "brand_name": "Trek", "model_name": "Domane", "resource_state": 3});
        let gear: Gear = serde_json::from_value(payload).expect("deserialize gear");
        assert_eq!(gear.display_name(), "Trek Domane");
    }

    #[test]
    fn gear_display_name_tolerates_missing_parts() {
        let payload = json!({"id": "g9", "model_name": "Pegasus 40"});
        let gear: Gear = serde_json::from_value(payload).expect("deserialize gear");
        assert_eq!(gear.display_name(), " Pegasus 40");
    }
}
