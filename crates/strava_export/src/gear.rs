use std::collections::HashMap;

use strava_client::StravaClient;

use crate::error::ExportResult;

/// Per-run memo of gear id to `"brand model"`.
///
/// Each distinct id is looked up at most once, including ids whose lookup
/// came back empty.
#[derive(Debug, Default)]
pub struct GearCache {
    names: HashMap<String, String>,
}

impl GearCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(&mut self, client: &dyn StravaClient, gear_id: &str) -> ExportResult<String> {
        if let Some(name) = self.names.get(gear_id) {
            return Ok(name.clone());
        }
        let name = client
            .get_gear(gear_id)
            .await?
            .map(|gear| gear.display_name())
            .unwrap_or_default();
        tracing::debug!(gear_id, %name, "gear resolved");
        self.names.insert(gear_id.to_string(), name.clone());
        Ok(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
