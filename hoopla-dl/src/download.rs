use crate::{
    Error, Result,
    options::ToolOptions,
    tool::{ToolInvocation, ToolOutput, ToolRunner},
    utils,
};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// File name of the downloaded, still encrypted media inside an item directory.
pub const ENCRYPTED_FILE: &str = "encrypted.mp4";

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch the media described by `manifest_url` into `dir` and return the file path.
    async fn download(&self, item_id: &str, manifest_url: &str, dir: &Path) -> Result<PathBuf>;
}

/// Delegates the segment work to an external downloader.
pub struct ToolDownloader {
    runner: Arc<dyn ToolRunner>,
    options: ToolOptions,
}

impl ToolDownloader {
    pub fn new(runner: Arc<dyn ToolRunner>, options: ToolOptions) -> Self {
        Self { runner, options }
    }
}

#[async_trait]
impl Downloader for ToolDownloader {
    async fn download(&self, item_id: &str, manifest_url: &str, dir: &Path) -> Result<PathBuf> {
        let output = dir.join(ENCRYPTED_FILE);

        if tokio::fs::try_exists(&output).await? {
            tokio::fs::remove_file(&output).await?;
        }

        let output_arg = output.to_string_lossy();
        let invocation = ToolInvocation {
            program: self.options.program.clone(),
            args: self.options.expand(&[
                ("output", &*output_arg),
                ("url", manifest_url),
                ("item", item_id),
            ]),
            timeout: self.options.timeout,
        };

        let result = self
            .runner
            .run(&invocation)
            .await
            .map_err(|x| Error::DownloadFailure(format!("cannot start {} ({})", invocation.program, x)))?;

        match result {
            ToolOutput::TimedOut => {
                return Err(Error::DownloadFailure(format!(
                    "{} timed out after {:?}",
                    invocation.program, invocation.timeout
                )));
            }
            ToolOutput::Exited {
                success: false,
                code,
                stderr,
                ..
            } => {
                return Err(Error::DownloadFailure(format!(
                    "{} exited with {}: {}",
                    invocation.program,
                    code.map(|x| x.to_string()).unwrap_or_else(|| "signal".to_owned()),
                    utils::truncate(&stderr, 500)
                )));
            }
            ToolOutput::Exited { .. } => (),
        }

        match tokio::fs::metadata(&output).await {
            Ok(x) if x.len() > 0 => Ok(output),
            Ok(_) => Err(Error::DownloadFailure(format!(
                "{} is empty",
                output.to_string_lossy()
            ))),
            Err(_) => Err(Error::DownloadFailure(format!(
                "{} was not produced",
                output.to_string_lossy()
            ))),
        }
    }
}
