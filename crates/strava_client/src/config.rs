use crate::StravaError;

pub const DEFAULT_API_BASE_URL: &str = "https://www.strava.com/api/v3";
pub const DEFAULT_OAUTH_BASE_URL: &str = "https://www.strava.com/oauth";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub api_base_url: String,
    pub oauth_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            oauth_base_url: DEFAULT_OAUTH_BASE_URL.into(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, StravaError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function instead of the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, StravaError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let api_base_url = get("STRAVA_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.into());
        let oauth_base_url =
            get("STRAVA_OAUTH_BASE_URL").unwrap_or_else(|| DEFAULT_OAUTH_BASE_URL.into());
        for (key, value) in [
            ("STRAVA_API_BASE_URL", &api_base_url),
            ("STRAVA_OAUTH_BASE_URL", &oauth_base_url),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(StravaError::Config(format!(
                    "{key} must be an http(s) URL, got {value:?}"
                )));
            }
        }
        Ok(Self {
            api_base_url,
            oauth_base_url,
        })
    }
}
