use super::{ClientArgs, Credentials, EndpointArgs};
use crate::{
    artifacts::ArtifactStore,
    batch::{self, CancelFlag},
    catalog::{self, HooplaCatalog},
    decrypt::{DecryptionCoordinator, KeySource, LicenseKeys, StaticKeys},
    download::ToolDownloader,
    license::LicenseAcquirer,
    manifest::HttpManifestSource,
    options::{DEFAULT_MERCHANT, Options, ToolOptions},
    report::Summary,
    session,
    tool::{ProcessRunner, ToolRunner},
    utils,
    workflow::{Services, Workflow},
};
use anyhow::{Result, bail};
use clap::Args;
use log::{info, warn};
use std::{path::PathBuf, sync::Arc, time::Duration};

/// Run the complete workflow for borrowed titles.
#[derive(Debug, Clone, Args)]
pub struct Run {
    /// Title ids to process.
    #[arg(value_name = "TITLE_ID", required_unless_present = "borrowed")]
    pub items: Vec<String>,

    /// Also process every currently borrowed title.
    #[arg(long)]
    pub borrowed: bool,

    /// Output directory, every title is written into its own sub directory.
    #[arg(short, long, default_value = "archive")]
    pub output: PathBuf,

    #[command(flatten)]
    pub credentials: Credentials,

    /// Maximum number of titles processed at the same time.
    #[arg(short, long, help_heading = "Batch Options", default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..=32))]
    pub workers: u16,

    #[command(flatten)]
    pub client: ClientArgs,

    #[command(flatten)]
    pub endpoints: EndpointArgs,

    /// Merchant name sent with license requests.
    #[arg(long, help_heading = "Endpoint Options", default_value = DEFAULT_MERCHANT)]
    pub merchant: String,

    /// Program used for downloading the protected media.
    /// Arguments are set with --downloader-arg, defaults suit yt-dlp.
    #[arg(long, help_heading = "Tool Options", default_value = "yt-dlp")]
    pub downloader: String,

    /// Replace the downloader arguments. Supports {url}, {output} and {item} placeholders.
    /// This option can be used multiple times.
    #[arg(long, help_heading = "Tool Options", value_name = "ARG", allow_hyphen_values = true)]
    pub downloader_arg: Vec<String>,

    /// Seconds after which the downloader is killed.
    #[arg(long, help_heading = "Tool Options", default_value_t = 3600)]
    pub download_timeout: u64,

    /// Program used for decrypting the downloaded media.
    #[arg(long, help_heading = "Tool Options", default_value = "mp4decrypt")]
    pub decrypter: String,

    /// Replace the decrypter arguments. Supports {key}, {input} and {output} placeholders.
    /// This option can be used multiple times.
    #[arg(long, help_heading = "Tool Options", value_name = "ARG", allow_hyphen_values = true)]
    pub decrypter_arg: Vec<String>,

    /// Seconds after which the decrypter is killed.
    #[arg(long, help_heading = "Tool Options", default_value_t = 300)]
    pub decrypt_timeout: u64,

    /// Content keys for decrypting, KID:KEY should be specified in hex format.
    /// Without keys the decrypt stage reports the key as unavailable.
    #[arg(short, long, help_heading = "Tool Options", value_name = "KID:KEY;KID:KEY...")]
    pub keys: Option<StaticKeys>,
}

impl Run {
    fn options(&self) -> Options {
        let mut download = ToolOptions::download();
        download.program = self.downloader.clone();
        download.timeout = Duration::from_secs(self.download_timeout);

        if !self.downloader_arg.is_empty() {
            download.args = self.downloader_arg.clone();
        }

        let mut decrypt = ToolOptions::decrypt();
        decrypt.program = self.decrypter.clone();
        decrypt.timeout = Duration::from_secs(self.decrypt_timeout);

        if !self.decrypter_arg.is_empty() {
            decrypt.args = self.decrypter_arg.clone();
        }

        Options {
            endpoints: self.endpoints.endpoints(),
            merchant: self.merchant.clone(),
            output: self.output.clone(),
            download,
            decrypt,
            workers: self.workers as usize,
        }
    }

    pub async fn execute(self) -> Result<()> {
        let options = self.options();
        let endpoints = &options.endpoints;
        let client = self.client.client()?;

        let session = Arc::new(
            session::authenticate(
                &client,
                &endpoints.auth,
                &self.credentials.username,
                &self.credentials.password,
            )
            .await?,
        );

        let mut items = vec![];

        for id in &self.items {
            if !items.contains(id) {
                items.push(id.clone());
            }
        }

        if self.borrowed {
            let borrowed = catalog::Account::new(&client, &session)
                .fetch(&endpoints.borrowed)
                .await?;
            let ids = catalog::borrowed_title_ids(&borrowed);
            info!("Found {} borrowed title(s)", ids.len());

            for id in ids {
                if !items.contains(&id) {
                    items.push(id);
                }
            }
        }

        if items.is_empty() {
            warn!("Nothing to process.");
            return Ok(());
        }

        for program in [&options.download.program, &options.decrypt.program] {
            if utils::find_program(program).is_none() {
                warn!("{} couldn't be found, stages using it will fail.", program);
            }
        }

        let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner);
        let keys: Arc<dyn KeySource> = match self.keys {
            Some(keys) => Arc::new(keys),
            None => Arc::new(LicenseKeys),
        };

        let services = Services {
            catalog: Arc::new(HooplaCatalog::new(
                client.clone(),
                &endpoints.graphql,
                session.clone(),
            )),
            license: Arc::new(LicenseAcquirer::new(
                client.clone(),
                session.clone(),
                &endpoints.license_token,
                &endpoints.license_proxy,
                &options.merchant,
            )),
            manifests: Arc::new(HttpManifestSource::new(client.clone(), &endpoints.manifest)),
            downloader: Arc::new(ToolDownloader::new(
                runner.clone(),
                options.download.clone(),
            )),
            decryptor: Arc::new(DecryptionCoordinator::new(
                runner,
                keys,
                options.decrypt.clone(),
            )),
        };

        let store = ArtifactStore::new(&options.output);
        let cancel = CancelFlag::new();
        cancel.install_ctrl_c();

        let report = batch::run(
            Workflow::new(services, store.clone()),
            items,
            options.workers,
            &cancel,
        )
        .await;

        let summary = Summary::new(&report);
        let path = store.write_json("summary.json", &summary).await?;
        info!("{}", summary.render());
        info!("Summary written to {}", path.to_string_lossy());

        if !report.is_success() {
            bail!(
                "{} of {} item(s) did not succeed.",
                summary.items - summary.succeeded,
                summary.items
            );
        }

        Ok(())
    }
}
