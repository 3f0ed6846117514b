//! Shared test utilities and a scripted `StravaClient` used by unit tests.
#![cfg(test)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};
use strava_client::{ActivityRecord, Gear, StravaClient, StravaError};

/// Build a summary activity with the given id and extra fields.
pub fn activity(id: i64, fields: Value) -> ActivityRecord {
    let mut record = ActivityRecord::new();
    record.insert("id".into(), json!(id));
    if let Value::Object(extra) = fields {
        record.extend(extra);
    }
    record
}

#[derive(Default)]
struct Calls {
    pages: Vec<(u32, u32)>,
    details: Vec<i64>,
    gear: HashMap<String, usize>,
}

/// Serves a newest-first activity list paginated by `per_page`, plus canned
/// details and gear, and records every call.
#[derive(Default)]
pub struct MockClient {
    activities: Vec<ActivityRecord>,
    details: HashMap<i64, ActivityRecord>,
    gear: HashMap<String, Gear>,
    failing_page: Option<u32>,
    calls: Mutex<Calls>,
}

impl MockClient {
    pub fn new(activities: Vec<ActivityRecord>) -> Self {
        Self {
            activities,
            ..Self::default()
        }
    }

    pub fn with_detail(mut self, id: i64, fields: Value) -> Self {
        self.details.insert(id, activity(id, fields));
        self
    }

    pub fn with_gear(mut self, id: &str, brand: &str, model: &str) -> Self {
        self.gear.insert(
            id.to_string(),
            Gear {
                id: id.to_string(),
                brand_name: Some(brand.to_string()),
                model_name: Some(model.to_string()),
                name: None,
            },
        );
        self
    }

    /// Make the list call for `page` fail with a transport-level error.
    pub fn failing_on_page(mut self, page: u32) -> Self {
        self.failing_page = Some(page);
        self
    }

    pub fn page_calls(&self) -> Vec<(u32, u32)> {
        self.calls.lock().expect("calls").pages.clone()
    }

    pub fn detail_calls(&self) -> Vec<i64> {
        self.calls.lock().expect("calls").details.clone()
    }

    pub fn gear_calls(&self, id: &str) -> usize {
        self.calls
            .lock()
            .expect("calls")
            .gear
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        let calls = self.calls.lock().expect("calls");
        calls.pages.len() + calls.details.len() + calls.gear.values().sum::<usize>()
    }
}

#[async_trait]
impl StravaClient for MockClient {
    async fn list_activities(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Option<Vec<ActivityRecord>>, StravaError> {
        self.calls.lock().expect("calls").pages.push((page, per_page));
        if self.failing_page == Some(page) {
            return Err(StravaError::Decode("connection reset".into()));
        }
        let start = page.saturating_sub(1) as usize * per_page as usize;
        Ok(Some(
            self.activities
                .iter()
                .skip(start)
                .take(per_page as usize)
                .cloned()
                .collect(),
        ))
    }

    async fn get_activity(
        &self,
        activity_id: i64,
    ) -> Result<Option<ActivityRecord>, StravaError> {
        self.calls.lock().expect("calls").details.push(activity_id);
        Ok(self.details.get(&activity_id).cloned())
    }

    async fn get_gear(&self, gear_id: &str) -> Result<Option<Gear>, StravaError> {
        *self
            .calls
            .lock()
            .expect("calls")
            .gear
            .entry(gear_id.to_string())
            .or_default() += 1;
        Ok(self.gear.get(gear_id).cloned())
    }
}
