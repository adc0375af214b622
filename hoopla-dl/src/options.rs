use serde::Serialize;
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36";
pub const DEFAULT_MERCHANT: &str = "hoopla";
pub const DEFAULT_DECRYPT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Remote endpoints used by a workflow.
///
/// `license_token` accepts `{media_key}`, `{patron_id}` and `{circulation_id}`
/// placeholders, `manifest` accepts `{media_key}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Endpoints {
    pub auth: String,
    pub graphql: String,
    pub user_info: String,
    pub borrowed: String,
    pub license_token: String,
    pub manifest: String,
    pub license_proxy: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        let gateway = "https://patron-api-gateway.hoopladigital.com";

        Self {
            auth: format!("{gateway}/core/tokens"),
            graphql: format!("{gateway}/graphql"),
            user_info: format!("{gateway}/core/user"),
            borrowed: format!("{gateway}/core/borrowed"),
            license_token: format!(
                "{gateway}/license/castlabs/upfront-auth-tokens/{{media_key}}/{{patron_id}}/{{circulation_id}}"
            ),
            manifest: "https://dash.hoopladigital.com/{media_key}/Manifest.mpd".to_owned(),
            license_proxy: "https://lic.drmtoday.com/license-proxy-widevine/cenc/".to_owned(),
        }
    }
}

impl Endpoints {
    /// Every endpoint rooted at `base` with the default paths. Used for mirrors and local fixtures.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');

        Self {
            auth: format!("{base}/core/tokens"),
            graphql: format!("{base}/graphql"),
            user_info: format!("{base}/core/user"),
            borrowed: format!("{base}/core/borrowed"),
            license_token: format!(
                "{base}/license/castlabs/upfront-auth-tokens/{{media_key}}/{{patron_id}}/{{circulation_id}}"
            ),
            manifest: format!("{base}/dash/{{media_key}}/Manifest.mpd"),
            license_proxy: format!("{base}/license-proxy-widevine/cenc/"),
        }
    }
}

/// External program invoked for a stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolOptions {
    pub program: String,
    /// Argument template, `{input}`, `{output}`, `{url}` and `{key}` are substituted.
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ToolOptions {
    pub fn download() -> Self {
        Self {
            program: "yt-dlp".to_owned(),
            args: [
                "--allow-unplayable-formats",
                "--no-progress",
                "--no-part",
                "-o",
                "{output}",
                "{url}",
            ]
            .map(String::from)
            .to_vec(),
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }

    pub fn decrypt() -> Self {
        Self {
            program: "mp4decrypt".to_owned(),
            args: ["--key", "{key}", "{input}", "{output}"]
                .map(String::from)
                .to_vec(),
            timeout: DEFAULT_DECRYPT_TIMEOUT,
        }
    }

    pub(crate) fn expand(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |arg, (name, value)| {
                    arg.replace(&format!("{{{}}}", name), value)
                })
            })
            .collect()
    }
}

/// Everything a batch needs besides credentials.
#[derive(Clone, Debug, Serialize)]
pub struct Options {
    pub endpoints: Endpoints,
    /// Merchant name sent in the license custom data.
    pub merchant: String,
    /// Root directory, every title writes into `<output>/<title id>/`.
    pub output: PathBuf,
    pub download: ToolOptions,
    pub decrypt: ToolOptions,
    /// Maximum number of titles processed at the same time.
    pub workers: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            merchant: DEFAULT_MERCHANT.to_owned(),
            output: PathBuf::from("archive"),
            download: ToolOptions::download(),
            decrypt: ToolOptions::decrypt(),
            workers: 4,
        }
    }
}
