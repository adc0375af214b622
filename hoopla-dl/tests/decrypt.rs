use async_trait::async_trait;
use hoopla_dl::{
    Error,
    decrypt::{DecryptionCoordinator, DecryptionOutcome, Decryptor, KeySource, LicenseKeys, StaticKeys},
    options::ToolOptions,
    tool::{ToolInvocation, ToolOutput, ToolRunner},
};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;

const KID: &str = "eb676abbcb345e96bbcf616630f1a3da";
const KEY: &str = "100b6c20940f779a4589152b57d2dacb";

/// Writes a partial output file, then answers with a canned result.
struct CannedRunner {
    output: ToolOutput,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl CannedRunner {
    fn new(output: ToolOutput) -> Arc<Self> {
        Arc::new(Self {
            output,
            calls: Mutex::new(vec![]),
        })
    }
}

#[async_trait]
impl ToolRunner for CannedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> std::io::Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        if let Some(output) = invocation.args.last() {
            tokio::fs::write(output, b"partial").await?;
        }

        Ok(self.output.clone())
    }
}

struct Files {
    _dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

fn files() -> Files {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("encrypted.mp4");
    let output = dir.path().join("decrypted.mp4");
    std::fs::write(&input, b"encrypted media").unwrap();

    Files {
        _dir: dir,
        input,
        output,
    }
}

fn keys() -> Arc<StaticKeys> {
    Arc::new(format!("{KID}:{KEY}").parse().unwrap())
}

#[tokio::test]
async fn passes_key_pair_to_tool() {
    let files = files();
    let runner = CannedRunner::new(ToolOutput::Exited {
        code: Some(0),
        success: true,
        stdout: String::new(),
        stderr: String::new(),
    });
    let coordinator = DecryptionCoordinator::new(runner.clone(), keys(), ToolOptions::decrypt());

    let attempt = coordinator
        .decrypt(&files.input, &files.output, Some(KID), None)
        .await;

    assert_eq!(attempt.outcome, DecryptionOutcome::Success);
    assert_eq!(attempt.output.as_deref(), Some(files.output.as_path()));
    assert!(attempt.error().is_none());

    let calls = runner.calls.lock().unwrap();
    assert_eq!(calls[0].program, "mp4decrypt");
    assert_eq!(calls[0].args[..2], ["--key".to_owned(), format!("{KID}:{KEY}")]);
    assert_eq!(calls[0].timeout, Duration::from_secs(300));
}

#[tokio::test]
async fn tool_failure() {
    let files = files();
    let runner = CannedRunner::new(ToolOutput::Exited {
        code: Some(1),
        success: false,
        stdout: String::new(),
        stderr: "ERROR: invalid key\n".to_owned(),
    });
    let coordinator = DecryptionCoordinator::new(runner, keys(), ToolOptions::decrypt());

    let attempt = coordinator
        .decrypt(&files.input, &files.output, Some(KID), None)
        .await;

    assert_eq!(
        attempt.outcome,
        DecryptionOutcome::ToolFailure {
            code: "1".to_owned(),
            stderr: "ERROR: invalid key".to_owned(),
        }
    );
    assert!(matches!(
        attempt.error(),
        Some(Error::DecryptionToolFailure { .. })
    ));
    assert!(attempt.output.is_none());
    assert!(!files.output.exists());
}

#[tokio::test]
async fn timeout_keeps_input() {
    let files = files();
    let runner = CannedRunner::new(ToolOutput::TimedOut);
    let coordinator = DecryptionCoordinator::new(runner, keys(), ToolOptions::decrypt());

    let attempt = coordinator
        .decrypt(&files.input, &files.output, Some(KID), None)
        .await;

    assert_eq!(attempt.outcome, DecryptionOutcome::Timeout { timeout_ms: 300_000 });
    assert!(matches!(attempt.error(), Some(Error::DecryptionTimeout(_))));
    assert!(!files.output.exists());
    assert_eq!(std::fs::read(&files.input).unwrap(), b"encrypted media");
}

#[tokio::test]
async fn key_unavailable_never_runs_the_tool() {
    let files = files();
    let runner = CannedRunner::new(ToolOutput::TimedOut);

    let sources: [Arc<dyn KeySource>; 3] = [
        Arc::new(LicenseKeys),
        Arc::new(format!("{KID}:{}", "0".repeat(32)).parse::<StaticKeys>().unwrap()),
        keys(),
    ];

    for keys in sources {
        let coordinator = DecryptionCoordinator::new(runner.clone(), keys, ToolOptions::decrypt());
        // The supplied key belongs to another kid.
        let attempt = coordinator
            .decrypt(
                &files.input,
                &files.output,
                Some("00000000000000000000000000000001"),
                None,
            )
            .await;

        assert!(matches!(
            attempt.outcome,
            DecryptionOutcome::KeyUnavailable { .. }
        ));
        assert!(attempt.error().is_none());
    }

    assert!(runner.calls.lock().unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn real_process_timeout() {
    use hoopla_dl::tool::ProcessRunner;

    let files = files();
    let options = ToolOptions {
        program: "sh".to_owned(),
        args: ["-c", "echo partial > \"$1\"; sleep 5", "sh", "{output}"]
            .map(String::from)
            .to_vec(),
        timeout: Duration::from_millis(500),
    };
    let coordinator = DecryptionCoordinator::new(Arc::new(ProcessRunner), keys(), options);

    let attempt = coordinator
        .decrypt(&files.input, &files.output, Some(KID), None)
        .await;

    assert_eq!(attempt.outcome, DecryptionOutcome::Timeout { timeout_ms: 500 });
    assert!(!files.output.exists());
    assert_eq!(std::fs::read(&files.input).unwrap(), b"encrypted media");
}
