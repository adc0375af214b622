//! Per title state machine.
//!
//! `METADATA -> LICENSE_TOKEN -> MANIFEST -> WIDEVINE_LICENSE -> DOWNLOAD -> DECRYPT`
//!
//! Stages run strictly in order and are never retried. Each one persists its
//! artifact into the item directory before the next starts.

mod result;
mod stage;

pub use result::WorkflowResult;
pub use stage::{Stage, StageOutcome};

use crate::{
    Error, Result,
    artifacts::{ArtifactStore, ItemArtifacts},
    catalog::Catalog,
    decrypt::{DECRYPTED_FILE, DecryptionOutcome, Decryptor},
    download::Downloader,
    error::ErrorRecord,
    license::LicenseService,
    manifest::ManifestSource,
};
use chrono::Utc;
use log::{error, info, warn};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

/// Collaborators of a workflow. Cloning shares them.
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn Catalog>,
    pub license: Arc<dyn LicenseService>,
    pub manifests: Arc<dyn ManifestSource>,
    pub downloader: Arc<dyn Downloader>,
    pub decryptor: Arc<dyn Decryptor>,
}

#[derive(Clone)]
pub struct Workflow {
    services: Services,
    store: ArtifactStore,
}

impl Workflow {
    pub fn new(services: Services, store: ArtifactStore) -> Self {
        Self { services, store }
    }

    /// Process one item. Failures end up in the returned result, never as an error.
    pub async fn run(&self, item_id: &str) -> WorkflowResult {
        let started_at = Utc::now();
        info!("[{}] Starting workflow", item_id);

        let item = match self.store.item(item_id).await {
            Ok(x) => x,
            Err(e) => {
                let mut run = Run::new(item_id, None);
                run.fail(Stage::Metadata, &e, Duration::ZERO);
                return run.finish(started_at).await;
            }
        };

        let mut run = Run::new(item_id, Some(item.clone()));
        self.stages(&mut run, &item).await;
        run.finish(started_at).await
    }

    async fn stages(&self, run: &mut Run<'_>, item: &ItemArtifacts) {
        let services = &self.services;
        let item_id = run.item_id;

        let Some(metadata) = run
            .stage(Stage::Metadata, async {
                let metadata = services.catalog.title(item_id).await?;

                if metadata.media_key.trim().is_empty() {
                    return Err(Error::MissingMediaInfo("mediaKey is empty".to_owned()));
                }

                let path = item.write_json("metadata.json", &metadata).await?;
                Ok((metadata, vec![path]))
            })
            .await
        else {
            return;
        };

        // Only the widevine license needs the token, the other stages go on without it.
        let token = run
            .stage(Stage::LicenseToken, async {
                let token = services
                    .license
                    .issue_token(
                        &metadata.media_key,
                        &metadata.circulation.patron_id,
                        &metadata.circulation.id,
                    )
                    .await?;

                if token.token.trim().is_empty() {
                    return Err(Error::EmptyResponse("license token".to_owned()));
                }

                let path = item.write_json("license_token.json", &token).await?;
                Ok((token, vec![path]))
            })
            .await;

        let Some((document, info)) = run
            .stage(Stage::Manifest, async {
                let document = services.manifests.fetch(&metadata.media_key).await?;
                let raw = item.write_text("manifest.mpd", &document.xml).await?;
                let wrapper = item.write_json("manifest.json", &document).await?;
                let info = hoopla_mpd::parse(&document.xml)?;
                let protection = item.write_json("protection.json", &info).await?;

                info!(
                    "[{}] Manifest lists {} key id(s), {} protection header(s)",
                    item_id,
                    info.key_ids().len(),
                    info.headers().len()
                );

                Ok(((document, info), vec![raw, wrapper, protection]))
            })
            .await
        else {
            return;
        };

        let license = match (&token, info.widevine_header()) {
            (Some(token), Some(header)) => {
                let Some(license) = run
                    .stage(Stage::WidevineLicense, async {
                        let license = services
                            .license
                            .request_widevine_license(token, header)
                            .await?;

                        if license.license.is_empty() {
                            return Err(Error::EmptyResponse(license.endpoint));
                        }

                        let path = item.write_json("widevine_license.json", &license).await?;
                        Ok((license, vec![path]))
                    })
                    .await
                else {
                    return;
                };

                Some(license)
            }
            (None, _) => {
                run.skip(Stage::WidevineLicense, "no license token was issued");
                None
            }
            (_, None) => {
                run.skip(Stage::WidevineLicense, "manifest has no widevine header");
                None
            }
        };

        let Some(encrypted) = run
            .stage(Stage::Download, async {
                let path = services
                    .downloader
                    .download(item_id, &document.url, item.dir())
                    .await?;
                Ok((path.clone(), vec![path]))
            })
            .await
        else {
            return;
        };

        let instant = Instant::now();
        let attempt = services
            .decryptor
            .decrypt(
                &encrypted,
                &item.path(DECRYPTED_FILE),
                info.default_kid(),
                license.as_ref(),
            )
            .await;

        let record = match item.write_json("decrypt.json", &attempt).await {
            Ok(x) => x,
            Err(e) => {
                run.fail(Stage::Decrypt, &e, instant.elapsed());
                return;
            }
        };

        if let Some(e) = attempt.error() {
            run.fail(Stage::Decrypt, &e, instant.elapsed());
            return;
        }

        let mut artifacts = vec![record];
        artifacts.extend(attempt.output.clone());

        let outcome = match attempt.outcome {
            DecryptionOutcome::KeyUnavailable { reason } => {
                warn!("[{}] {}: key unavailable, {}", item_id, Stage::Decrypt, reason);
                StageOutcome::Unavailable {
                    reason,
                    artifacts,
                    elapsed_ms: millis(instant.elapsed()),
                }
            }
            _ => StageOutcome::Succeeded {
                artifacts,
                elapsed_ms: millis(instant.elapsed()),
            },
        };

        run.stages.insert(Stage::Decrypt, outcome);
    }
}

struct Run<'a> {
    item_id: &'a str,
    item: Option<ItemArtifacts>,
    stages: BTreeMap<Stage, StageOutcome>,
}

impl<'a> Run<'a> {
    fn new(item_id: &'a str, item: Option<ItemArtifacts>) -> Self {
        Self {
            item_id,
            item,
            stages: BTreeMap::new(),
        }
    }

    async fn stage<T>(
        &mut self,
        stage: Stage,
        task: impl Future<Output = Result<(T, Vec<PathBuf>)>>,
    ) -> Option<T> {
        let instant = Instant::now();

        match task.await {
            Ok((value, artifacts)) => {
                self.stages.insert(
                    stage,
                    StageOutcome::Succeeded {
                        artifacts,
                        elapsed_ms: millis(instant.elapsed()),
                    },
                );
                Some(value)
            }
            Err(e) => {
                self.fail(stage, &e, instant.elapsed());
                None
            }
        }
    }

    fn fail(&mut self, stage: Stage, error: &Error, elapsed: Duration) {
        error!("[{}] {}: {}", self.item_id, stage, error);
        self.stages.insert(
            stage,
            StageOutcome::Failed {
                error: ErrorRecord::from(error),
                elapsed_ms: millis(elapsed),
            },
        );
    }

    fn skip(&mut self, stage: Stage, reason: &str) {
        info!("[{}] {} skipped, {}", self.item_id, stage, reason);
        self.stages.insert(
            stage,
            StageOutcome::Skipped {
                reason: reason.to_owned(),
            },
        );
    }

    async fn finish(self, started_at: chrono::DateTime<Utc>) -> WorkflowResult {
        let result = WorkflowResult::new(self.item_id.to_owned(), started_at, self.stages);

        if let Some(item) = &self.item
            && let Err(e) = item.write_json("result.json", &result).await
        {
            error!("[{}] cannot persist result ({})", self.item_id, e);
        }

        if result.success {
            info!("[{}] Workflow finished", self.item_id);
        } else {
            warn!(
                "[{}] Workflow finished without success{}",
                self.item_id,
                result
                    .failed_stage()
                    .map(|x| format!(", {} failed", x))
                    .unwrap_or_default()
            );
        }

        result
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
