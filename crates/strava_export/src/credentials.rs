//! Local OAuth credential storage and token acquisition.
//!
//! The export only needs a bearer token. [`CredentialManager`] reads the
//! stored record, asks its [`IdentityProvider`] for a new grant when the
//! record is missing or unusable, refreshes it when expired, and writes the
//! result back to disk.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use strava_client::ACTIVITY_READ_SCOPE;
use strava_client::oauth::{DEFAULT_REDIRECT_URI, OAuthClient, TokenResponse};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{ExportError, ExportResult};

pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";
pub const DEFAULT_CLIENT_SECRET_FILE: &str = "client_secret.json";

/// Token material persisted between runs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl CredentialRecord {
    /// Build a record from a token endpoint reply. Providers may omit the
    /// refresh token on refresh, in which case `previous_refresh` is kept.
    pub fn from_token(
        token: TokenResponse,
        previous_refresh: Option<&str>,
        scope: Option<String>,
    ) -> ExportResult<Self> {
        let refresh_token = token
            .refresh_token
            .clone()
            .or_else(|| previous_refresh.map(str::to_owned))
            .ok_or_else(|| ExportError::Auth("token response carried no refresh token".into()))?;
        Ok(Self {
            expires_at: token.expiry().unwrap_or_default(),
            access_token: token.access_token,
            refresh_token,
            token_type: token.token_type,
            scope,
        })
    }

    pub fn is_valid(&self) -> bool {
        !self.access_token.trim().is_empty() && !self.refresh_token.trim().is_empty()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// JSON file holding a [`CredentialRecord`].
#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored record, or `None` when the file is missing or unreadable as a record.
    pub fn load(&self) -> ExportResult<Option<CredentialRecord>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&text) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable credentials");
                Ok(None)
            }
        }
    }

    pub fn save(&self, record: &CredentialRecord) -> ExportResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(record)?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            options.mode(0o600);
            let mut file = options.open(&self.path)?;
            // mode only applies on creation; tighten files left by older runs
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
            file.write_all(text.as_bytes())?;
        }
        #[cfg(not(unix))]
        options.open(&self.path)?.write_all(text.as_bytes())?;
        Ok(())
    }
}

/// Registered OAuth application, read from the client secret file.
#[derive(Clone, Debug)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretFields {
    #[serde(deserialize_with = "deserialize_string_or_number")]
    client_id: String,
    client_secret: String,
    #[serde(default)]
    redirect_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

/// Either a flat object or the `installed` / `web` wrapper used by
/// downloaded client secret files.
#[derive(Deserialize)]
#[serde(untagged)]
enum ClientSecretFile {
    Installed { installed: ClientSecretFields },
    Web { web: ClientSecretFields },
    Flat(ClientSecretFields),
}

fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

impl ClientSecret {
    pub fn load(path: &Path) -> ExportResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            ExportError::Auth(format!("cannot read client secret {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> ExportResult<Self> {
        let file: ClientSecretFile = serde_json::from_str(text)
            .map_err(|e| ExportError::Auth(format!("malformed client secret: {e}")))?;
        let fields = match file {
            ClientSecretFile::Installed { installed } => installed,
            ClientSecretFile::Web { web } => web,
            ClientSecretFile::Flat(fields) => fields,
        };
        let redirect_uri = fields
            .redirect_uri
            .or_else(|| fields.redirect_uris.into_iter().next())
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        Ok(Self {
            client_id: fields.client_id,
            client_secret: SecretString::new(fields.client_secret.into()),
            redirect_uri,
        })
    }
}

/// Source of OAuth grants. The export never talks to a browser itself.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Obtain a brand-new grant for `scope`.
    async fn authorize(&self, scope: &str) -> ExportResult<CredentialRecord>;

    /// Exchange the record's refresh token for a new access token.
    async fn refresh(&self, record: &CredentialRecord) -> ExportResult<CredentialRecord>;
}

/// Interactive provider: prints the authorize URL and reads the redirect
/// URL (or the bare code) back from stdin.
#[derive(Clone, Debug)]
pub struct ConsoleAuthorizer {
    client_secret_file: PathBuf,
    oauth_base_url: String,
}

impl ConsoleAuthorizer {
    pub fn new(client_secret_file: impl Into<PathBuf>, oauth_base_url: impl Into<String>) -> Self {
        Self {
            client_secret_file: client_secret_file.into(),
            oauth_base_url: oauth_base_url.into(),
        }
    }

    fn oauth_client(&self) -> ExportResult<(OAuthClient, ClientSecret)> {
        let secret = ClientSecret::load(&self.client_secret_file)?;
        let client = OAuthClient::new(
            &self.oauth_base_url,
            secret.client_id.clone(),
            secret.client_secret.clone(),
        );
        Ok((client, secret))
    }
}

#[async_trait]
impl IdentityProvider for ConsoleAuthorizer {
    async fn authorize(&self, scope: &str) -> ExportResult<CredentialRecord> {
        let (oauth, secret) = self.oauth_client()?;
        let url = oauth
            .authorize_url(&secret.redirect_uri, scope)
            .map_err(|e| ExportError::Auth(e.to_string()))?;
        eprintln!("Open this URL in a browser and approve access:\n\n  {url}\n");
        eprintln!("Then paste the URL you were redirected to (or just the code) and press enter:");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        let code = extract_code(&line)?;

        let token = oauth
            .exchange_code(&code)
            .await
            .map_err(|e| ExportError::Auth(e.to_string()))?;
        tracing::info!("authorization granted");
        CredentialRecord::from_token(token, None, Some(scope.to_string()))
    }

    async fn refresh(&self, record: &CredentialRecord) -> ExportResult<CredentialRecord> {
        let (oauth, _) = self.oauth_client()?;
        let token = oauth
            .refresh(&record.refresh_token)
            .await
            .map_err(|e| ExportError::Auth(e.to_string()))?;
        CredentialRecord::from_token(token, Some(&record.refresh_token), record.scope.clone())
    }
}

/// Pull the authorization code out of a pasted redirect URL or bare code.
pub fn extract_code(input: &str) -> ExportResult<String> {
    let input = input.trim();
    if let Ok(url) = reqwest::Url::parse(input) {
        let mut code = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "error" => {
                    return Err(ExportError::Auth(format!("authorization refused: {value}")));
                }
                _ => {}
            }
        }
        return code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ExportError::Auth("redirect URL has no code parameter".into()));
    }
    if input.is_empty() {
        return Err(ExportError::Auth("no authorization code entered".into()));
    }
    Ok(input.to_string())
}

/// Loads, authorizes, refreshes and persists credentials.
pub struct CredentialManager<P> {
    store: CredentialStore,
    provider: P,
    now: fn() -> i64,
}

impl<P: IdentityProvider> CredentialManager<P> {
    pub fn new(store: CredentialStore, provider: P) -> Self {
        Self {
            store,
            provider,
            now: || Utc::now().timestamp(),
        }
    }

    /// Replace the clock used for expiry checks.
    pub fn with_clock(mut self, now: fn() -> i64) -> Self {
        self.now = now;
        self
    }

    /// Bearer token for API calls. With `force_reset` the stored grant is
    /// ignored and a new one is requested.
    pub async fn obtain_access_token(&self, force_reset: bool) -> ExportResult<SecretString> {
        let stored = if force_reset { None } else { self.store.load()? };
        let mut record = match stored {
            Some(record) if record.is_valid() => record,
            _ => {
                tracing::info!(force_reset, "requesting a new authorization");
                let record = self.provider.authorize(ACTIVITY_READ_SCOPE).await?;
                self.store.save(&record)?;
                record
            }
        };

        if record.is_expired((self.now)()) {
            tracing::warn!("token expired, attempting refresh");
            record = self.provider.refresh(&record).await?;
            self.store.save(&record)?;
        }

        if record.access_token.is_empty() {
            return Err(ExportError::Auth("no access token available".into()));
        }
        Ok(SecretString::new(record.access_token.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW: i64 = 1_700_000_000;

    fn record(access: &str, expires_at: i64) -> CredentialRecord {
        CredentialRecord {
            access_token: access.into(),
            refresh_token: "refresh-1".into(),
            expires_at,
            token_type: Some("Bearer".into()),
            scope: Some(ACTIVITY_READ_SCOPE.into()),
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        authorized: AtomicUsize,
        refreshed: AtomicUsize,
        fail_refresh: bool,
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn authorize(&self, scope: &str) -> ExportResult<CredentialRecord> {
            assert_eq!(scope, "activity:read_all");
            self.authorized.fetch_add(1, Ordering::SeqCst);
            Ok(record("granted", NOW + 3600))
        }

        async fn refresh(&self, old: &CredentialRecord) -> ExportResult<CredentialRecord> {
            self.refreshed.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh {
                return Err(ExportError::Auth("revoked".into()));
            }
            Ok(CredentialRecord {
                access_token: "refreshed".into(),
                expires_at: NOW + 21600,
                ..old.clone()
            })
        }
    }

    fn manager(dir: &Path, provider: FakeProvider) -> CredentialManager<FakeProvider> {
        CredentialManager::new(CredentialStore::new(dir.join("credentials.json")), provider)
            .with_clock(|| NOW)
    }

    #[tokio::test]
    async fn missing_credentials_run_authorization_and_persist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path(), FakeProvider::default());
        let token = mgr.obtain_access_token(false).await.expect("token");
        assert_eq!(token.expose_secret(), "granted");
        assert_eq!(mgr.provider.authorized.load(Ordering::SeqCst), 1);
        let saved = mgr.store.load().expect("load").expect("saved");
        assert_eq!(saved.access_token, "granted");
    }

    #[tokio::test]
    async fn valid_credentials_are_reused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path(), FakeProvider::default());
        mgr.store.save(&record("cached", NOW + 60)).expect("save");
        let token = mgr.obtain_access_token(false).await.expect("token");
        assert_eq!(token.expose_secret(), "cached");
        assert_eq!(mgr.provider.authorized.load(Ordering::SeqCst), 0);
        assert_eq!(mgr.provider.refreshed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_credentials_are_refreshed_and_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path(), FakeProvider::default());
        mgr.store.save(&record("stale", NOW - 1)).expect("save");
        let token = mgr.obtain_access_token(false).await.expect("token");
        assert_eq!(token.expose_secret(), "refreshed");
        assert_eq!(mgr.provider.refreshed.load(Ordering::SeqCst), 1);
        let saved = mgr.store.load().expect("load").expect("saved");
        assert_eq!(saved.expires_at, NOW + 21600);
        assert_eq!(saved.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn force_reset_always_authorizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path(), FakeProvider::default());
        mgr.store.save(&record("cached", NOW + 60)).expect("save");
        let token = mgr.obtain_access_token(true).await.expect("token");
        assert_eq!(token.expose_secret(), "granted");
        assert_eq!(mgr.provider.authorized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn corrupt_or_invalid_credentials_reauthorize() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path(), FakeProvider::default());
        fs::write(mgr.store.path(), "{not json").expect("write");
        mgr.obtain_access_token(false).await.expect("token");

        let mut blank = record("", NOW + 60);
        blank.refresh_token.clear();
        mgr.store.save(&blank).expect("save");
        mgr.obtain_access_token(false).await.expect("token");
        assert_eq!(mgr.provider.authorized.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_failure_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = FakeProvider {
            fail_refresh: true,
            ..FakeProvider::default()
        };
        let mgr = manager(dir.path(), provider);
        mgr.store.save(&record("stale", NOW)).expect("save");
        let err = mgr.obtain_access_token(false).await.expect_err("refresh fails");
        assert!(matches!(err, ExportError::Auth(_)));
    }

    #[test]
    fn client_secret_accepts_wrapped_and_flat_layouts() {
        let wrapped = r#"{"installed": {"client_id": 12345, "client_secret": "abc",
            "redirect_uris": ["http://localhost/cb"]}}"#;
        let secret = ClientSecret::parse(wrapped).expect("wrapped");
        assert_eq!(secret.client_id, "12345");
        assert_eq!(secret.redirect_uri, "http://localhost/cb");

        let flat = r#"{"client_id": "777", "client_secret": "xyz"}"#;
        let secret = ClientSecret::parse(flat).expect("flat");
        assert_eq!(secret.client_id, "777");
        assert_eq!(secret.client_secret.expose_secret(), "xyz");
        assert_eq!(secret.redirect_uri, DEFAULT_REDIRECT_URI);

        assert!(ClientSecret::parse(r#"{"client_id": "1"}"#).is_err());
    }

    #[test]
    fn extract_code_handles_urls_and_bare_codes() {
        assert_eq!(
            extract_code("http://localhost/exchange_token?state=&code=abc123&scope=read,activity:read_all\n")
                .expect("code"),
            "abc123"
        );
        assert_eq!(extract_code("  abc123 ").expect("code"), "abc123");
        assert!(extract_code("http://localhost/exchange_token?error=access_denied").is_err());
        assert!(extract_code("\n").is_err());
    }

    #[test]
    fn record_from_token_keeps_previous_refresh_token() {
        let token = TokenResponse {
            access_token: "new".into(),
            refresh_token: None,
            expires_at: Some(NOW),
            expires_in: None,
            token_type: Some("Bearer".into()),
        };
        let rec = CredentialRecord::from_token(token.clone(), Some("old"), None).expect("record");
        assert_eq!(rec.refresh_token, "old");
        assert!(rec.is_expired(NOW));
        assert!(CredentialRecord::from_token(token, None, None).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn saved_credentials_are_private_to_the_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path().join("nested").join("credentials.json"));
        store.save(&record("first-access-token", NOW)).expect("save");
        let mode = fs::metadata(store.path()).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        fs::set_permissions(store.path(), fs::Permissions::from_mode(0o644)).expect("loosen");
        store.save(&record("short", NOW)).expect("overwrite");
        let mode = fs::metadata(store.path()).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let saved = store.load().expect("load").expect("record");
        assert_eq!(saved.access_token, "short");
    }
}
