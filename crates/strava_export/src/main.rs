use anyhow::Context;
use clap::Parser;

use strava_client::http_client::ReqwestStravaClient;
use strava_export::cli::Cli;
use strava_export::credentials::{ConsoleAuthorizer, CredentialManager, CredentialStore};
use strava_export::export::{self, Exporter};
use strava_export::{ExportConfig, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config = ExportConfig::from_env().context("reading configuration")?;
    let output = cli.output.clone().unwrap_or_else(|| {
        export::default_output_path(&config.output_dir, chrono::Local::now().naive_local())
    });
    // refuse before prompting for credentials or touching the network
    export::ensure_output_available(&output)?;

    let credentials = CredentialManager::new(
        CredentialStore::new(&config.credentials_file),
        ConsoleAuthorizer::new(&config.client_secret_file, config.api.oauth_base_url.as_str()),
    );
    let token = credentials
        .obtain_access_token(false)
        .await
        .context("obtaining an access token")?;

    let client = ReqwestStravaClient::new(&config.api.api_base_url, token);
    let request = cli.into_request(output);
    let summary = Exporter::new(&client, &config).run(&request).await?;

    tracing::info!(
        path = %summary.output.display(),
        rows = summary.rows_written,
        pages = summary.pages_fetched,
        stop_reason = ?summary.stop_reason,
        "wrote export"
    );
    Ok(())
}
