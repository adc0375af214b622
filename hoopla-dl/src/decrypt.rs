use crate::{
    Error, Result,
    license::WidevineLicense,
    options::ToolOptions,
    tool::{ToolInvocation, ToolOutput, ToolRunner},
    utils,
};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

/// File name of the decrypted media inside an item directory.
pub const DECRYPTED_FILE: &str = "decrypted.mp4";

/// A content key in hex, as passed to the decrypt tool.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey {
    pub kid: String,
    pub key: String,
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("kid", &self.kid)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl ContentKey {
    /// All zero keys are placeholders and never decrypt anything.
    pub fn is_placeholder(&self) -> bool {
        self.key.chars().all(|x| x == '0')
    }

    fn pair(&self) -> String {
        format!("{}:{}", self.kid, self.key)
    }
}

/// Where content keys come from.
pub trait KeySource: Send + Sync {
    fn content_key(
        &self,
        kid: Option<&str>,
        license: Option<&WidevineLicense>,
    ) -> Result<ContentKey>;
}

/// Keys from the acquired license.
///
/// The license response is opaque, no key is ever extracted from it, so this
/// source always reports the key as unavailable.
#[derive(Clone, Copy, Debug, Default)]
pub struct LicenseKeys;

impl KeySource for LicenseKeys {
    fn content_key(
        &self,
        _kid: Option<&str>,
        license: Option<&WidevineLicense>,
    ) -> Result<ContentKey> {
        Err(Error::KeyUnavailable(if license.is_some() {
            "no content key can be derived from the opaque license response".to_owned()
        } else {
            "no license was acquired".to_owned()
        }))
    }
}

/// Keys supplied by the caller as `KID:KEY;KID:KEY...` hex pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticKeys {
    keys: HashMap<String, String>,
}

impl StaticKeys {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromStr for StaticKeys {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut keys = HashMap::new();

        for pair in s.split(';').filter(|x| !x.trim().is_empty()) {
            let Some((kid, key)) = pair.split_once(':') else {
                return Err(format!("expected KID:KEY but found '{}'.", pair));
            };

            let kid = hoopla_mpd::KeyId::normalize(kid);
            let key = key.trim().replace('-', "").to_ascii_lowercase();

            if kid.is_valid() && key.len() == 32 && key.chars().all(|c| c.is_ascii_hexdigit()) {
                keys.insert(kid.into_inner(), key);
            } else {
                return Err("invalid kid key format used.".to_owned());
            }
        }

        if keys.is_empty() {
            return Err("no kid key pairs found.".to_owned());
        }

        Ok(Self { keys })
    }
}

impl KeySource for StaticKeys {
    fn content_key(
        &self,
        kid: Option<&str>,
        _license: Option<&WidevineLicense>,
    ) -> Result<ContentKey> {
        let (kid, key) = match kid {
            Some(kid) => {
                let kid = hoopla_mpd::KeyId::normalize(kid).into_inner();
                let key = self.keys.get(&kid).cloned();
                (kid, key)
            }
            // Without a default kid a lone key is unambiguous.
            None if self.keys.len() == 1 => match self.keys.iter().next() {
                Some((kid, key)) => (kid.clone(), Some(key.clone())),
                None => (String::new(), None),
            },
            None => {
                return Err(Error::KeyUnavailable(
                    "manifest has no default kid to select a key".to_owned(),
                ));
            }
        };

        let Some(key) = key else {
            return Err(Error::KeyUnavailable(format!("no key supplied for kid {}", kid)));
        };

        let key = ContentKey { kid, key };

        if key.is_placeholder() {
            return Err(Error::KeyUnavailable(format!(
                "key for kid {} is a zero placeholder",
                key.kid
            )));
        }

        Ok(key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecryptionOutcome {
    Success,
    KeyUnavailable { reason: String },
    ToolFailure { code: String, stderr: String },
    Timeout { timeout_ms: u64 },
}

/// Record of one decrypt step, persisted as `decrypt.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionAttempt {
    pub input: PathBuf,
    /// Set only when the tool produced a non empty file.
    pub output: Option<PathBuf>,
    pub kid: Option<String>,
    pub outcome: DecryptionOutcome,
}

impl DecryptionAttempt {
    /// Hard failure of the attempt, if any. Key unavailability is not one.
    pub fn error(&self) -> Option<Error> {
        match &self.outcome {
            DecryptionOutcome::Success | DecryptionOutcome::KeyUnavailable { .. } => None,
            DecryptionOutcome::ToolFailure { code, stderr } => Some(Error::DecryptionToolFailure {
                code: code.clone(),
                stderr: stderr.clone(),
            }),
            DecryptionOutcome::Timeout { timeout_ms } => Some(Error::DecryptionTimeout(
                std::time::Duration::from_millis(*timeout_ms),
            )),
        }
    }
}

#[async_trait]
pub trait Decryptor: Send + Sync {
    /// Never fails, every problem is an outcome of the returned attempt.
    async fn decrypt(
        &self,
        input: &Path,
        output: &Path,
        kid: Option<&str>,
        license: Option<&WidevineLicense>,
    ) -> DecryptionAttempt;
}

/// Resolves a key and runs the decrypt tool under a timeout.
pub struct DecryptionCoordinator {
    runner: Arc<dyn ToolRunner>,
    keys: Arc<dyn KeySource>,
    options: ToolOptions,
}

impl DecryptionCoordinator {
    pub fn new(runner: Arc<dyn ToolRunner>, keys: Arc<dyn KeySource>, options: ToolOptions) -> Self {
        Self {
            runner,
            keys,
            options,
        }
    }
}

#[async_trait]
impl Decryptor for DecryptionCoordinator {
    async fn decrypt(
        &self,
        input: &Path,
        output: &Path,
        kid: Option<&str>,
        license: Option<&WidevineLicense>,
    ) -> DecryptionAttempt {
        let mut attempt = DecryptionAttempt {
            input: input.to_owned(),
            output: None,
            kid: kid.map(|x| x.to_owned()),
            outcome: DecryptionOutcome::Success,
        };

        let key = match self.keys.content_key(kid, license) {
            Ok(x) => x,
            Err(Error::KeyUnavailable(reason)) => {
                debug!("content key unavailable, {}", reason);
                attempt.outcome = DecryptionOutcome::KeyUnavailable { reason };
                return attempt;
            }
            Err(e) => {
                attempt.outcome = DecryptionOutcome::KeyUnavailable {
                    reason: e.to_string(),
                };
                return attempt;
            }
        };

        if key.is_placeholder() {
            attempt.outcome = DecryptionOutcome::KeyUnavailable {
                reason: format!("key for kid {} is a zero placeholder", key.kid),
            };
            return attempt;
        }

        attempt.kid = Some(key.kid.clone());

        let pair = key.pair();
        let input_arg = input.to_string_lossy();
        let output_arg = output.to_string_lossy();
        let invocation = ToolInvocation {
            program: self.options.program.clone(),
            args: self.options.expand(&[
                ("key", pair.as_str()),
                ("input", &*input_arg),
                ("output", &*output_arg),
            ]),
            timeout: self.options.timeout,
        };

        attempt.outcome = match self.runner.run(&invocation).await {
            Ok(ToolOutput::Exited { success: true, .. }) => {
                match tokio::fs::metadata(output).await {
                    Ok(x) if x.len() > 0 => {
                        attempt.output = Some(output.to_owned());
                        DecryptionOutcome::Success
                    }
                    _ => DecryptionOutcome::ToolFailure {
                        code: "0".to_owned(),
                        stderr: "no output file was produced".to_owned(),
                    },
                }
            }
            Ok(ToolOutput::Exited { code, stderr, .. }) => DecryptionOutcome::ToolFailure {
                code: code
                    .map(|x| x.to_string())
                    .unwrap_or_else(|| "signal".to_owned()),
                stderr: utils::truncate(&stderr, 500),
            },
            Ok(ToolOutput::TimedOut) => DecryptionOutcome::Timeout {
                timeout_ms: invocation.timeout.as_millis().min(u64::MAX as u128) as u64,
            },
            Err(e) => DecryptionOutcome::ToolFailure {
                code: "spawn".to_owned(),
                stderr: format!("cannot start {} ({})", invocation.program, e),
            },
        };

        if attempt.output.is_none() && tokio::fs::try_exists(output).await.unwrap_or(false) {
            debug!("Deleting partial output {}", output.to_string_lossy());

            if let Err(e) = tokio::fs::remove_file(output).await {
                warn!(
                    "cannot delete partial output {} ({})",
                    output.to_string_lossy(),
                    e
                );
            }
        }

        attempt
    }
}
