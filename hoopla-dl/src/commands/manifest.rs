use super::ClientArgs;
use anyhow::{Result, bail};
use clap::Args;
use reqwest::Url;

/// Print the protection info of a manifest as json.
#[derive(Debug, Clone, Args)]
pub struct Manifest {
    /// http(s):// | .mpd
    #[arg(required = true, value_name = "PATH|URL")]
    pub input: String,

    #[command(flatten)]
    pub client: ClientArgs,
}

impl Manifest {
    pub async fn execute(self) -> Result<()> {
        let xml = if tokio::fs::try_exists(&self.input).await? {
            tokio::fs::read_to_string(&self.input).await?
        } else if let Ok(url) = self.input.parse::<Url>()
            && matches!(url.scheme(), "http" | "https")
        {
            self.client
                .client()?
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?
        } else {
            bail!("{} is neither a file nor an http(s) url.", self.input);
        };

        let info = hoopla_mpd::parse(&xml)?;
        serde_json::to_writer_pretty(std::io::stdout(), &info)?;
        println!();
        Ok(())
    }
}
