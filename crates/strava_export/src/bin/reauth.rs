//! Discard the stored grant and run the authorization flow again.

use anyhow::{Context, bail};

use strava_export::credentials::{ConsoleAuthorizer, CredentialManager, CredentialStore};
use strava_export::{ExportConfig, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    if std::env::args().len() > 1 {
        bail!("usage: strava-reauth (takes no arguments)");
    }
    logging::init();

    let config = ExportConfig::from_env().context("reading configuration")?;
    let store = CredentialStore::new(&config.credentials_file);
    let path = store.path().to_path_buf();
    CredentialManager::new(
        store,
        ConsoleAuthorizer::new(&config.client_secret_file, config.api.oauth_base_url.as_str()),
    )
    .obtain_access_token(true)
    .await
    .context("re-authorizing")?;

    tracing::info!(path = %path.display(), "saved new credentials");
    Ok(())
}
