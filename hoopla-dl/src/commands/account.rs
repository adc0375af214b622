use super::{ClientArgs, Credentials, EndpointArgs};
use crate::{
    artifacts::ArtifactStore,
    catalog::{self, Account as AccountRecords},
    session,
};
use anyhow::Result;
use clap::Args;
use log::info;
use std::path::PathBuf;

/// Archive the account user info and borrowed items listing.
#[derive(Debug, Clone, Args)]
pub struct Account {
    /// Output directory for user_info.json and borrowed_items.json.
    #[arg(short, long, default_value = "archive")]
    pub output: PathBuf,

    #[command(flatten)]
    pub credentials: Credentials,

    #[command(flatten)]
    pub client: ClientArgs,

    #[command(flatten)]
    pub endpoints: EndpointArgs,
}

impl Account {
    pub async fn execute(self) -> Result<()> {
        let endpoints = self.endpoints.endpoints();
        let client = self.client.client()?;
        let session = session::authenticate(
            &client,
            &endpoints.auth,
            &self.credentials.username,
            &self.credentials.password,
        )
        .await?;

        let records = AccountRecords::new(&client, &session);
        let store = ArtifactStore::new(&self.output);

        let user_info = records.fetch(&endpoints.user_info).await?;
        let path = store.write_json("user_info.json", &user_info).await?;
        info!("Saved {}", path.to_string_lossy());

        let borrowed = records.fetch(&endpoints.borrowed).await?;
        let path = store.write_json("borrowed_items.json", &borrowed).await?;
        info!(
            "Saved {} ({} borrowed title(s))",
            path.to_string_lossy(),
            catalog::borrowed_title_ids(&borrowed).len()
        );

        Ok(())
    }
}
