use crate::workflow::{Workflow, WorkflowResult};
use log::{error, info, warn};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::task::JoinSet;

/// Shared stop flag. Once raised no further workflow is started.
#[derive(Clone, Debug)]
pub struct CancelFlag(Arc<AtomicBool>);

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn cancel(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// First Ctrl+C stops scheduling, a second one exits the process.
    pub fn install_ctrl_c(&self) {
        let flag = self.clone();

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() && flag.is_running() {
                warn!("Ctrl+C received, finishing running workflows.");
                flag.cancel();
            }

            if tokio::signal::ctrl_c().await.is_ok() {
                error!("Ctrl+C received, force exiting.");
                std::process::exit(1);
            }
        });
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<WorkflowResult>,
    /// Items never started because the batch was cancelled.
    pub not_started: Vec<String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|x| x.success).count()
    }

    pub fn is_success(&self) -> bool {
        self.not_started.is_empty() && self.results.iter().all(|x| x.success)
    }
}

/// Run one workflow per item, at most `workers` at the same time.
///
/// Items are independent, a failing item never affects the others and results
/// come back in completion order.
pub async fn run(
    workflow: Workflow,
    items: Vec<String>,
    workers: usize,
    cancel: &CancelFlag,
) -> BatchReport {
    let workers = workers.max(1);
    let mut report = BatchReport::default();
    let mut set = JoinSet::new();
    let mut items = items.into_iter();

    info!("Processing {} item(s) with {} worker(s)", items.len(), workers);

    while let Some(item_id) = items.next() {
        while set.len() >= workers {
            collect(set.join_next().await, &mut report);
        }

        if !cancel.is_running() {
            report.not_started.push(item_id);
            report.not_started.extend(items.by_ref());
            break;
        }

        let workflow = workflow.clone();
        set.spawn(async move { workflow.run(&item_id).await });
    }

    while let Some(x) = set.join_next().await {
        collect(Some(x), &mut report);
    }

    if !report.not_started.is_empty() {
        warn!("{} item(s) not started", report.not_started.len());
    }

    report
}

fn collect(
    joined: Option<Result<WorkflowResult, tokio::task::JoinError>>,
    report: &mut BatchReport,
) {
    match joined {
        Some(Ok(result)) => report.results.push(result),
        Some(Err(e)) => error!("workflow task aborted ({})", e),
        None => (),
    }
}
