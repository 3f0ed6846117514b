//! OAuth2 token endpoint client: authorize URL, code exchange and refresh.

use crate::StravaError;
use chrono::Utc;
use metrics::counter;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Redirect target registered for desktop use; the page does not need to load.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost/exchange_token";

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry in unix seconds, derived from `expires_in` when the
    /// provider only sends a relative lifetime.
    pub fn expiry(&self) -> Option<i64> {
        self.expires_at
            .or_else(|| self.expires_in.map(|secs| Utc::now().timestamp() + secs))
    }
}

#[derive(Clone, Debug)]
pub struct OAuthClient {
    base_url: String,
    client_id: String,
    client_secret: SecretString,
    client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(base_url: &str, client_id: impl Into<String>, client_secret: SecretString) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret,
            client: reqwest::Client::new(),
        }
    }

    /// URL the user opens in a browser to grant `scope` to this client.
    pub fn authorize_url(&self, redirect_uri: &str, scope: &str) -> Result<String, StravaError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/authorize", self.base_url),
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", redirect_uri),
                ("approval_prompt", "force"),
                ("scope", scope),
            ],
        )
        .map_err(|e| StravaError::Config(format!("invalid oauth base url: {e}")))?;
        Ok(url.into())
    }

    /// Trade an authorization code for a token set.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, StravaError> {
        self.token_request(TokenRequest {
            client_id: &self.client_id,
            client_secret: self.client_secret.expose_secret(),
            grant_type: "authorization_code",
            code: Some(code),
            refresh_token: None,
        })
        .await
    }

    /// Trade a refresh token for a fresh access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, StravaError> {
        self.token_request(TokenRequest {
            client_id: &self.client_id,
            client_secret: self.client_secret.expose_secret(),
            grant_type: "refresh_token",
            code: None,
            refresh_token: Some(refresh_token),
        })
        .await
    }

    async fn token_request(&self, form: TokenRequest<'_>) -> Result<TokenResponse, StravaError> {
        let url = format!("{}/token", self.base_url);
        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .inspect_err(|_| {
                counter!("strava_oauth_requests_total", "result" => "failure").increment(1);
            })?;

        let status = response.status();
        if !status.is_success() {
            counter!("strava_oauth_requests_total", "result" => "failure").increment(1);
            let body = response.text().await.unwrap_or_default();
            return Err(StravaError::OAuth {
                status: status.as_u16(),
                body: body.chars().take(256).collect(),
            });
        }

        let text = response.text().await?;
        let token = serde_json::from_str::<TokenResponse>(&text)
            .map_err(|e| StravaError::Decode(format!("token response: {e}")))?;
        counter!("strava_oauth_requests_total", "result" => "success").increment(1);
        tracing::debug!(grant_type = form.grant_type, "oauth token exchange succeeded");
        Ok(token)
    }
}
