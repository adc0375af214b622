mod account;
mod manifest;
mod run;

pub use account::Account;
pub use manifest::Manifest;
pub use run::Run;

use crate::{client::ClientOptions, options::Endpoints};
use anyhow::{Result, bail};
use clap::{ColorChoice, Parser, Subcommand};
use log::LevelFilter;
use reqwest::{
    Proxy,
    header::{HeaderName, HeaderValue},
};
use std::time::Duration;

/// Acquire licenses and decrypt borrowed titles, one isolated workflow per title.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// When to output colored text.
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Show debug logs with their source location.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Args {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        }
    }

    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Account(args) => args.execute().await,
            Commands::Manifest(args) => args.execute().await,
            Commands::Run(args) => args.execute().await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Account(Account),
    Manifest(Manifest),
    Run(Run),
}

#[derive(Clone, clap::Args)]
pub struct Credentials {
    /// Account email address.
    #[arg(short, long, env = "HOOPLA_USERNAME", help_heading = "Account Options")]
    pub username: String,

    /// Account password.
    #[arg(
        short,
        long,
        env = "HOOPLA_PASSWORD",
        hide_env_values = true,
        help_heading = "Account Options"
    )]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct ClientArgs {
    /// Extra headers for every request in same format as curl.
    ///
    /// This option can be used multiple times.
    #[arg(short = 'H', long = "header", help_heading = "Client Options", value_name = "KEY:VALUE", value_parser = parse_header)]
    pub headers: Vec<(HeaderName, HeaderValue)>,

    /// Skip checking and validation of site certificates.
    #[arg(long, help_heading = "Client Options")]
    pub no_certificate_checks: bool,

    /// Set http(s) / socks proxy address for requests.
    #[arg(long, help_heading = "Client Options", value_parser = parse_proxy)]
    pub proxy: Option<Proxy>,

    /// Timeout in seconds of a single request.
    #[arg(long, help_heading = "Client Options", default_value_t = 60)]
    pub timeout: u64,

    /// Update and set user agent header for requests.
    #[arg(long, help_heading = "Client Options", default_value = crate::options::DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl ClientArgs {
    pub fn client(&self) -> Result<reqwest::Client> {
        let options = ClientOptions {
            user_agent: self.user_agent.clone(),
            proxy: self.proxy.clone(),
            timeout: Duration::from_secs(self.timeout),
            headers: self.headers.clone(),
            no_certificate_checks: self.no_certificate_checks,
        };

        Ok(options.build()?)
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct EndpointArgs {
    /// Root every endpoint at this url with the default paths, e.g. for a mirror.
    #[arg(long, help_heading = "Endpoint Options", value_name = "URL")]
    pub base_url: Option<String>,

    /// Authentication endpoint.
    #[arg(long, help_heading = "Endpoint Options", value_name = "URL")]
    pub auth_url: Option<String>,

    /// Title metadata GraphQL endpoint.
    #[arg(long, help_heading = "Endpoint Options", value_name = "URL")]
    pub graphql_url: Option<String>,

    /// License token endpoint.
    /// Supports {media_key}, {patron_id} and {circulation_id} placeholders.
    #[arg(long, help_heading = "Endpoint Options", value_name = "TEMPLATE")]
    pub license_token_url: Option<String>,

    /// Manifest location. Supports {media_key} placeholder.
    #[arg(long, help_heading = "Endpoint Options", value_name = "TEMPLATE")]
    pub manifest_url: Option<String>,

    /// Widevine license proxy endpoint.
    #[arg(long, help_heading = "Endpoint Options", value_name = "URL")]
    pub license_proxy_url: Option<String>,
}

impl EndpointArgs {
    pub fn endpoints(&self) -> Endpoints {
        let mut endpoints = match &self.base_url {
            Some(base) => Endpoints::with_base(base),
            None => Endpoints::default(),
        };

        let overrides = [
            (&self.auth_url, &mut endpoints.auth),
            (&self.graphql_url, &mut endpoints.graphql),
            (&self.license_token_url, &mut endpoints.license_token),
            (&self.manifest_url, &mut endpoints.manifest),
            (&self.license_proxy_url, &mut endpoints.license_proxy),
        ];

        for (value, endpoint) in overrides {
            if let Some(value) = value {
                *endpoint = value.clone();
            }
        }

        endpoints
    }
}

fn parse_header(value: &str) -> Result<(HeaderName, HeaderValue)> {
    if let Some((k, v)) = value.split_once(':') {
        Ok((k.trim().parse()?, v.trim().parse()?))
    } else {
        bail!("Expected 'KEY:VALUE' but found '{}'.", value);
    }
}

fn parse_proxy(value: &str) -> Result<Proxy, String> {
    Proxy::all(value).map_err(|x| x.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_overrides() {
        let args = Args::parse_from([
            "hoopla-dl",
            "run",
            "--username",
            "a@b.c",
            "--password",
            "secret",
            "--base-url",
            "http://127.0.0.1:9000",
            "--manifest-url",
            "http://cdn.local/{media_key}.mpd",
            "12345",
        ]);

        let Commands::Run(run) = args.command else {
            panic!("expected run command");
        };
        let endpoints = run.endpoints.endpoints();

        assert_eq!(endpoints.auth, "http://127.0.0.1:9000/core/tokens");
        assert_eq!(endpoints.manifest, "http://cdn.local/{media_key}.mpd");
        assert_eq!(run.items, ["12345"]);
    }

    #[test]
    fn test_parse_header() {
        let (name, value) = parse_header("x-test: 1").unwrap();

        assert_eq!(name, "x-test");
        assert_eq!(value, "1");
        assert!(parse_header("broken").is_err());
    }
}
