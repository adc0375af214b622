mod common;

use async_trait::async_trait;
use axum::{Router, routing::get};
use chrono::Utc;
use common::TestServer;
use hoopla_dl::{
    Error, Result, Session, Stage, StageOutcome,
    artifacts::ArtifactStore,
    batch::{self, CancelFlag},
    catalog::{Catalog, Circulation, TitleMetadata},
    decrypt::{DecryptionCoordinator, KeySource, LicenseKeys, StaticKeys},
    download::{Downloader, ENCRYPTED_FILE},
    license::{CustomData, LicenseAcquirer, LicenseService, LicenseToken, WidevineLicense},
    manifest::{ManifestDocument, ManifestSource},
    options::{Endpoints, ToolOptions},
    reqwest::Client,
    tool::{ToolInvocation, ToolOutput, ToolRunner},
    workflow::{Services, Workflow},
};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;

const SCENARIO_MPD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" xmlns:cenc="urn:mpeg:cenc:2013" type="static">
  <Period>
    <AdaptationSet contentType="audio" mimeType="audio/mp4">
      <ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011" value="cenc" cenc:default_KID="AA-BB-CC-DD"/>
      <ContentProtection schemeIdUri="urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed">
        <cenc:pssh>QUJD</cenc:pssh>
      </ContentProtection>
    </AdaptationSet>
  </Period>
</MPD>"#;

const PLAYREADY_ONLY_MPD: &str = r#"<MPD xmlns:cenc="urn:mpeg:cenc:2013" xmlns:mspr="urn:microsoft:playready">
  <Period>
    <AdaptationSet>
      <ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011" value="cenc" cenc:default_KID="eb676abb-cb34-5e96-bbcf-616630f1a3da"/>
      <ContentProtection schemeIdUri="urn:uuid:9a04f079-9840-4286-ab92-e65be0885f95">
        <mspr:pro>UExBWVJFQURZ</mspr:pro>
      </ContentProtection>
    </AdaptationSet>
  </Period>
</MPD>"#;

const KEYED_MPD: &str = r#"<MPD xmlns:cenc="urn:mpeg:cenc:2013">
  <Period>
    <AdaptationSet>
      <ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011" value="cenc" cenc:default_KID="eb676abb-cb34-5e96-bbcf-616630f1a3da"/>
      <ContentProtection schemeIdUri="urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed">
        <cenc:pssh>AAAAMnBzc2gAAAAA7e+LqXnWSs6jyCfc1R0h7QAAABISEOtnarvLNF6Wu89hZjDxo9o=</cenc:pssh>
      </ContentProtection>
    </AdaptationSet>
  </Period>
</MPD>"#;

struct FakeCatalog;

#[async_trait]
impl Catalog for FakeCatalog {
    async fn title(&self, id: &str) -> Result<TitleMetadata> {
        if id.starts_with("missing") {
            return Err(Error::MissingMediaInfo(
                "circulation (title is not borrowed)".to_owned(),
            ));
        }

        Ok(TitleMetadata {
            id: id.to_owned(),
            title: Some("Some Audiobook".to_owned()),
            media_key: "abc123".to_owned(),
            circulation: Circulation {
                id: "c1".to_owned(),
                patron_id: "p1".to_owned(),
            },
        })
    }
}

#[derive(Default)]
struct FakeLicense {
    reject_license: bool,
    headers: Mutex<Vec<String>>,
}

#[async_trait]
impl LicenseService for FakeLicense {
    async fn issue_token(
        &self,
        media_key: &str,
        patron_id: &str,
        circulation_id: &str,
    ) -> Result<LicenseToken> {
        Ok(LicenseToken {
            token: "tok.xyz".to_owned(),
            media_key: media_key.to_owned(),
            patron_id: patron_id.to_owned(),
            circulation_id: circulation_id.to_owned(),
            retrieved_at: Utc::now(),
        })
    }

    async fn request_widevine_license(
        &self,
        token: &LicenseToken,
        header: &str,
    ) -> Result<WidevineLicense> {
        self.headers.lock().unwrap().push(header.to_owned());

        if self.reject_license {
            return Err(Error::LicenseAcquisitionFailure(
                "license proxy answered 403 Forbidden".to_owned(),
            ));
        }

        Ok(WidevineLicense {
            license: b"\x08\x02license".to_vec(),
            endpoint: "https://lic.example/".to_owned(),
            custom_data: CustomData::new(token, "hoopla"),
            retrieved_at: Utc::now(),
        })
    }
}

struct FakeManifest(Option<&'static str>);

#[async_trait]
impl ManifestSource for FakeManifest {
    async fn fetch(&self, media_key: &str) -> Result<ManifestDocument> {
        let url = format!("https://cdn.example/{}/Manifest.mpd", media_key);

        match self.0 {
            Some(xml) => Ok(ManifestDocument {
                url,
                media_key: media_key.to_owned(),
                fetched_at: Utc::now(),
                xml: xml.to_owned(),
            }),
            None => Err(Error::NetworkFailure(format!("{} (HTTP 404 Not Found)", url))),
        }
    }
}

struct FakeDownloader {
    fail: bool,
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, _item_id: &str, _manifest_url: &str, dir: &Path) -> Result<PathBuf> {
        if self.fail {
            return Err(Error::DownloadFailure("yt-dlp exited with 1: ERROR".to_owned()));
        }

        let path = dir.join(ENCRYPTED_FILE);
        tokio::fs::write(&path, b"encrypted media").await?;
        Ok(path)
    }
}

/// Stands in for mp4decrypt by copying `{input}` to `{output}`.
struct CopyRunner;

#[async_trait]
impl ToolRunner for CopyRunner {
    async fn run(&self, invocation: &ToolInvocation) -> std::io::Result<ToolOutput> {
        let [.., input, output] = invocation.args.as_slice() else {
            panic!("unexpected arguments {:?}", invocation.args);
        };
        tokio::fs::copy(input, output).await?;

        Ok(ToolOutput::Exited {
            code: Some(0),
            success: true,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Raises the cancel flag while its first title lookup is in flight.
struct CancellingCatalog(CancelFlag);

#[async_trait]
impl Catalog for CancellingCatalog {
    async fn title(&self, id: &str) -> Result<TitleMetadata> {
        self.0.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        FakeCatalog.title(id).await
    }
}

struct Fixture {
    dir: TempDir,
    catalog: Arc<dyn Catalog>,
    manifest: Option<&'static str>,
    license: Arc<dyn LicenseService>,
    keys: Arc<dyn KeySource>,
    download_fails: bool,
}

impl Fixture {
    fn new(manifest: Option<&'static str>) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            catalog: Arc::new(FakeCatalog),
            manifest,
            license: Arc::new(FakeLicense::default()),
            keys: Arc::new(LicenseKeys),
            download_fails: false,
        }
    }

    fn workflow(&self) -> Workflow {
        let services = Services {
            catalog: self.catalog.clone(),
            license: self.license.clone(),
            manifests: Arc::new(FakeManifest(self.manifest)),
            downloader: Arc::new(FakeDownloader {
                fail: self.download_fails,
            }),
            decryptor: Arc::new(DecryptionCoordinator::new(
                Arc::new(CopyRunner),
                self.keys.clone(),
                ToolOptions::decrypt(),
            )),
        };

        Workflow::new(services, ArtifactStore::new(self.dir.path()))
    }

    fn item_file(&self, item_id: &str, name: &str) -> PathBuf {
        self.dir.path().join(item_id).join(name)
    }

    fn read_json(&self, item_id: &str, name: &str) -> serde_json::Value {
        serde_json::from_slice(&std::fs::read(self.item_file(item_id, name)).unwrap()).unwrap()
    }
}

fn kind(outcome: &StageOutcome) -> &str {
    match outcome {
        StageOutcome::Failed { error, .. } => &error.kind,
        x => panic!("expected a failed stage, got {x:?}"),
    }
}

#[tokio::test]
async fn scenario_without_content_key() {
    let license = Arc::new(FakeLicense::default());
    let mut fixture = Fixture::new(Some(SCENARIO_MPD));
    fixture.license = license.clone();

    let result = fixture.workflow().run("12345").await;

    for stage in [
        Stage::Metadata,
        Stage::LicenseToken,
        Stage::Manifest,
        Stage::WidevineLicense,
        Stage::Download,
    ] {
        assert!(result.outcome(stage).is_succeeded(), "{stage}: {:?}", result.outcome(stage));
    }

    assert!(matches!(
        result.outcome(Stage::Decrypt),
        StageOutcome::Unavailable { .. }
    ));
    assert!(result.success);
    assert_eq!(*license.headers.lock().unwrap(), ["QUJD"]);

    let protection = fixture.read_json("12345", "protection.json");
    assert_eq!(protection["default_kid"], "aabbccdd");
    assert_eq!(protection["headers"], serde_json::json!({ "widevine": "QUJD" }));

    let token = fixture.read_json("12345", "license_token.json");
    assert_eq!(token["token"], "tok.xyz");

    let attempt = fixture.read_json("12345", "decrypt.json");
    assert_eq!(attempt["outcome"]["status"], "key_unavailable");

    assert!(!fixture.item_file("12345", "decrypted.mp4").exists());
    assert!(fixture.item_file("12345", "manifest.mpd").exists());
    assert_eq!(fixture.read_json("12345", "result.json")["success"], true);
}

#[tokio::test]
async fn manifest_failure_stops_the_workflow() {
    let fixture = Fixture::new(None);
    let result = fixture.workflow().run("12345").await;

    assert!(result.outcome(Stage::Metadata).is_succeeded());
    assert!(result.outcome(Stage::LicenseToken).is_succeeded());
    assert_eq!(kind(result.outcome(Stage::Manifest)), "NetworkFailure");

    for stage in [Stage::WidevineLicense, Stage::Download, Stage::Decrypt] {
        assert_eq!(result.outcome(stage), &StageOutcome::NotAttempted);
    }

    assert!(!result.success);
    assert_eq!(result.failed_stage(), Some(Stage::Manifest));
}

#[tokio::test]
async fn malformed_manifest() {
    let fixture = Fixture::new(Some("<MPD><Period></MPD>"));
    let result = fixture.workflow().run("12345").await;

    assert_eq!(kind(result.outcome(Stage::Manifest)), "ManifestParseFailure");
    assert_eq!(result.outcome(Stage::Download), &StageOutcome::NotAttempted);
    assert!(!result.success);
}

#[tokio::test]
async fn empty_license_token_keeps_partial_results() {
    let router = Router::new().route(
        "/license/castlabs/upfront-auth-tokens/:media_key/:patron_id/:circulation_id",
        get(|| async { "" }),
    );
    let server = TestServer::new(router).await;
    let endpoints = Endpoints::with_base(server.base_url());

    let mut fixture = Fixture::new(Some(SCENARIO_MPD));
    fixture.license = Arc::new(LicenseAcquirer::new(
        Client::new(),
        Arc::new(Session::new("session-token")),
        endpoints.license_token,
        endpoints.license_proxy,
        "hoopla",
    ));

    let result = fixture.workflow().run("12345").await;

    assert!(result.outcome(Stage::Metadata).is_succeeded());
    assert_eq!(kind(result.outcome(Stage::LicenseToken)), "EmptyResponse");
    assert!(result.outcome(Stage::Manifest).is_succeeded());
    assert!(matches!(
        result.outcome(Stage::WidevineLicense),
        StageOutcome::Skipped { .. }
    ));
    assert!(!result.success);

    assert!(fixture.item_file("12345", "metadata.json").exists());
    assert!(fixture.item_file("12345", "protection.json").exists());
    assert!(!fixture.item_file("12345", "license_token.json").exists());
}

#[tokio::test]
async fn missing_widevine_header_skips_license() {
    let fixture = Fixture::new(Some(PLAYREADY_ONLY_MPD));
    let result = fixture.workflow().run("12345").await;

    assert!(matches!(
        result.outcome(Stage::WidevineLicense),
        StageOutcome::Skipped { reason } if reason.contains("widevine")
    ));
    assert!(result.outcome(Stage::Download).is_succeeded());
    assert!(result.success);

    let protection = fixture.read_json("12345", "protection.json");
    assert_eq!(protection["headers"]["playready"], "UExBWVJFQURZ");
}

#[tokio::test]
async fn license_failure_stops_the_run() {
    let mut fixture = Fixture::new(Some(SCENARIO_MPD));
    fixture.license = Arc::new(FakeLicense {
        reject_license: true,
        ..Default::default()
    });

    let result = fixture.workflow().run("12345").await;

    assert_eq!(
        kind(result.outcome(Stage::WidevineLicense)),
        "LicenseAcquisitionFailure"
    );
    assert_eq!(result.outcome(Stage::Download), &StageOutcome::NotAttempted);
    assert_eq!(result.outcome(Stage::Decrypt), &StageOutcome::NotAttempted);
    assert_eq!(result.failed_stage(), Some(Stage::WidevineLicense));
    assert!(!fixture.item_file("12345", "encrypted.mp4").exists());
    assert!(!result.success);
}

#[tokio::test]
async fn download_failure() {
    let mut fixture = Fixture::new(Some(SCENARIO_MPD));
    fixture.download_fails = true;

    let result = fixture.workflow().run("12345").await;

    assert_eq!(kind(result.outcome(Stage::Download)), "DownloadFailure");
    assert_eq!(result.outcome(Stage::Decrypt), &StageOutcome::NotAttempted);
    assert!(!result.success);
}

#[tokio::test]
async fn decrypt_with_supplied_keys() {
    let mut fixture = Fixture::new(Some(KEYED_MPD));
    fixture.keys = Arc::new(
        "eb676abbcb345e96bbcf616630f1a3da:100b6c20940f779a4589152b57d2dacb"
            .parse::<StaticKeys>()
            .unwrap(),
    );

    let result = fixture.workflow().run("12345").await;

    assert!(result.outcome(Stage::Decrypt).is_succeeded());
    assert!(result.success);
    assert!(
        result
            .artifacts()
            .contains(&fixture.item_file("12345", "decrypted.mp4"))
    );
}

#[tokio::test]
async fn batch_isolates_failing_items() {
    let fixture = Fixture::new(Some(SCENARIO_MPD));
    let items = ["12345", "missing-1", "67890"].map(String::from).to_vec();

    let report = batch::run(fixture.workflow(), items, 2, &CancelFlag::new()).await;

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert!(!report.is_success());

    let failed = report
        .results
        .iter()
        .find(|x| x.item_id == "missing-1")
        .unwrap();

    assert_eq!(kind(failed.outcome(Stage::Metadata)), "MissingMediaInfo");
    assert_eq!(failed.outcome(Stage::LicenseToken), &StageOutcome::NotAttempted);
    assert!(fixture.item_file("67890", "result.json").exists());
}

#[tokio::test]
async fn cancelled_batch_starts_nothing() {
    let fixture = Fixture::new(Some(SCENARIO_MPD));
    let cancel = CancelFlag::new();
    cancel.cancel();

    let items = ["12345", "67890"].map(String::from).to_vec();
    let report = batch::run(fixture.workflow(), items, 4, &cancel).await;

    assert!(report.results.is_empty());
    assert_eq!(report.not_started, ["12345", "67890"]);
    assert!(!fixture.item_file("12345", "result.json").exists());
}

#[tokio::test]
async fn cancelling_lets_running_workflows_finish() {
    let cancel = CancelFlag::new();
    let mut fixture = Fixture::new(Some(SCENARIO_MPD));
    fixture.catalog = Arc::new(CancellingCatalog(cancel.clone()));

    let items = ["12345", "67890", "24680"].map(String::from).to_vec();
    let report = batch::run(fixture.workflow(), items, 1, &cancel).await;

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].item_id, "12345");
    assert!(report.results[0].success);
    assert_eq!(report.not_started, ["67890", "24680"]);
    assert!(!report.is_success());

    let result = fixture.read_json("12345", "result.json");
    assert_eq!(result["success"], true);
    assert_eq!(result["stages"]["DECRYPT"]["outcome"], "unavailable");
    assert!(!fixture.item_file("67890", "metadata.json").exists());
}
