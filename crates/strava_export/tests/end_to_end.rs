use std::fs;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use strava_client::http_client::ReqwestStravaClient;
use strava_export::checkpoint::CheckpointStore;
use strava_export::credentials::{
    ConsoleAuthorizer, CredentialManager, CredentialRecord, CredentialStore,
};
use strava_export::transform;
use strava_export::{ExportConfig, ExportRequest, Exporter, StopReason};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ReqwestStravaClient {
    ReqwestStravaClient::new(&format!("{}/api/v3", server.uri()), SecretString::new("tok".into()))
}

fn config_in(dir: &Path, columns: &[&str]) -> ExportConfig {
    ExportConfig {
        columns: columns
            .iter()
            .map(|n| transform::column(n).expect("known column"))
            .collect(),
        checkpoint_file: dir.join("last_saved.txt"),
        credentials_file: dir.join("credentials.json"),
        client_secret_file: dir.join("client_secret.json"),
        output_dir: dir.join("data"),
        ..ExportConfig::default()
    }
}

async fn mount_page(server: &MockServer, page: u32, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn exports_all_pages_with_details_and_gear() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        1,
        json!([
            {"id": 303, "name": "Tempo Run", "type": "Run", "distance": 10000.0,
             "start_date_local": "2024-05-04T07:30:00Z", "gear_id": "g1"},
            {"id": 302, "name": "Commute", "type": "Ride", "distance": 8046.7,
             "start_date_local": "2024-05-03T17:45:12Z", "gear_id": "b9", "trainer": false}
        ]),
    )
    .await;
    mount_page(
        &server,
        2,
        json!([{"id": 301, "name": "Easy Run", "type": "Run", "distance": 0,
                "start_date_local": "2024-05-01T06:00:00Z", "gear_id": "g1"}]),
    )
    .await;
    mount_page(&server, 3, json!([])).await;

    for (id, calories) in [(303, 712.0), (302, 0.0), (301, 250.5)] {
        Mock::given(method("GET"))
            .and(path(format!("/api/v3/activities/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id, "calories": calories, "device_name": "Garmin Forerunner 255"
            })))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/v3/gear/g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "g1", "brand_name": "Saucony", "model_name": "Endorphin Speed"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/gear/b9"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Record Not Found"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(
        dir.path(),
        &["start_date_local", "name", "distance", "gear_id", "calories", "device_name", "id"],
    );
    let output = dir.path().join("data").join("export.tsv");
    let client = client_for(&server);
    let summary = Exporter::new(&client, &config)
        .run(&ExportRequest::new(&output))
        .await
        .expect("export");

    assert_eq!(summary.rows_written, 3);
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.stop_reason, StopReason::Done);

    let text = fs::read_to_string(&output).expect("output");
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(
        lines,
        [
            "start date local\tname\tdistance mi\tgear\tcalories\tdevice name\turl\t",
            "2024-05-04 07:30:00\tTempo Run\t6.21\tSaucony Endorphin Speed\t712.0\tGarmin Forerunner 255\thttps://www.strava.com/activities/303\t",
            "2024-05-03 17:45:12\tCommute\t5.00\t\t\tGarmin Forerunner 255\thttps://www.strava.com/activities/302\t",
            "2024-05-01 06:00:00\tEasy Run\t\tSaucony Endorphin Speed\t250.5\tGarmin Forerunner 255\thttps://www.strava.com/activities/301\t",
        ]
    );
    assert!(text.ends_with("\t\n"));

    let checkpoint = CheckpointStore::new(&config.checkpoint_file)
        .read()
        .expect("checkpoint");
    assert_eq!(checkpoint, Some(303));
}

#[tokio::test]
async fn second_run_only_exports_new_activities() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        1,
        json!([{"id": 12, "name": "New"}, {"id": 11, "name": "Seen"}, {"id": 10, "name": "Old"}]),
    )
    .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path(), &["name", "id"]);
    CheckpointStore::new(&config.checkpoint_file)
        .write(11)
        .expect("seed checkpoint");

    let output = dir.path().join("incremental.tsv");
    let client = client_for(&server);
    let summary = Exporter::new(&client, &config)
        .run(&ExportRequest::new(&output))
        .await
        .expect("export");

    assert_eq!(summary.stop_reason, StopReason::ReachedCheckpoint);
    assert_eq!(
        fs::read_to_string(&output).expect("output"),
        "name\turl\t\nNew\thttps://www.strava.com/activities/12\t\n"
    );
    assert_eq!(
        CheckpointStore::new(&config.checkpoint_file).read().expect("checkpoint"),
        Some(12)
    );
}

#[tokio::test]
async fn rate_limited_list_ends_the_run_quietly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"message": "Rate Limit Exceeded"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path(), &["name", "id"]);
    let output = dir.path().join("limited.tsv");
    let client = client_for(&server);
    let summary = Exporter::new(&client, &config)
        .run(&ExportRequest::new(&output).with_max_results(Some(5)))
        .await
        .expect("no data is not an error");

    assert_eq!(summary.rows_written, 0);
    assert_eq!(summary.stop_reason, StopReason::Done);
    assert_eq!(fs::read_to_string(&output).expect("output"), "name\turl\t\n");
    assert_eq!(
        CheckpointStore::new(&config.checkpoint_file).read().expect("checkpoint"),
        None
    );
}

#[tokio::test]
async fn expired_credentials_are_refreshed_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh"))
        .and(body_string_contains("client_id=4242"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": "fresh-access",
            "expires_at": 4_102_444_800i64,
            "expires_in": 21600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path(), &["id"]);
    fs::write(
        &config.client_secret_file,
        r#"{"client_id": 4242, "client_secret": "shh"}"#,
    )
    .expect("client secret");
    let store = CredentialStore::new(&config.credentials_file);
    store
        .save(&CredentialRecord {
            access_token: "stale-access".into(),
            refresh_token: "old-refresh".into(),
            expires_at: 1,
            token_type: Some("Bearer".into()),
            scope: Some("activity:read_all".into()),
        })
        .expect("seed credentials");

    let manager = CredentialManager::new(
        CredentialStore::new(&config.credentials_file),
        ConsoleAuthorizer::new(&config.client_secret_file, format!("{}/oauth", server.uri())),
    );
    let token = manager.obtain_access_token(false).await.expect("token");
    assert_eq!(token.expose_secret(), "fresh-access");

    let saved = store.load().expect("load").expect("record");
    assert_eq!(saved.access_token, "fresh-access");
    assert_eq!(saved.refresh_token, "old-refresh");
    assert_eq!(saved.expires_at, 4_102_444_800);
    assert_eq!(saved.scope.as_deref(), Some("activity:read_all"));
}
