use std::{
    collections::HashSet,
    num::NonZeroUsize,
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use flume::Sender;
use futures::{StreamExt, stream};
use tokio::fs::create_dir_all;
use tracing::{debug, error, warn};

use crate::{
    error::ReportError,
    run::{CommandTemplate, Invocation, Launcher, RunParams, RunResult, RunStatus},
};

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started { index: usize },
    Finished { index: usize, status: RunStatus },
}

/// Outcome of a whole batch, one entry per submitted run in submission order
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub results: Vec<RunResult>,
}

impl Batch {
    pub fn succeeded(&self) -> bool {
        self.results.iter().all(|r| r.status.is_success())
    }

    pub fn first_failure(&self) -> Option<&RunResult> {
        self.results
            .iter()
            .find(|r| !r.status.is_success() && r.status != RunStatus::Skipped)
    }

    /// Turns a failed batch into a [`ReportError::Process`] naming the first failed run
    pub fn check(&self) -> Result<(), ReportError> {
        match self.first_failure() {
            None => Ok(()),
            Some(failed) => Err(ReportError::Process {
                index: failed.index,
                output: failed.params.output.clone(),
                reason: failed.status.describe(),
            }),
        }
    }
}

pub struct Orchestrator<L> {
    launcher: L,
    template: CommandTemplate,
    workers: NonZeroUsize,
    events: Option<Sender<RunEvent>>,
}

impl<L: Launcher> Orchestrator<L> {
    pub fn new(launcher: L, template: CommandTemplate, workers: usize) -> Self {
        Orchestrator {
            launcher,
            template,
            workers: NonZeroUsize::new(workers).unwrap_or(NonZeroUsize::MIN),
            events: None,
        }
    }

    pub fn with_events(mut self, events: Sender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    /// Renders every run without launching anything
    pub fn plan(&self, runs: &[RunParams]) -> Result<Vec<Invocation>, ReportError> {
        let mut outputs = HashSet::new();
        runs.iter()
            .map(|run| {
                run.validate()?;
                if !outputs.insert(run.output.clone()) {
                    return Err(ReportError::Config(format!(
                        "More than one run writes {}",
                        run.output.display()
                    )));
                }
                run.render(&self.template)
            })
            .collect()
    }

    /// Runs the whole batch with at most `workers` processes in flight.
    ///
    /// Returns once every run has finished or was skipped. `Err` is only returned
    /// when the batch is rejected before anything was launched.
    pub async fn run(&self, runs: Vec<RunParams>) -> Result<Batch, ReportError> {
        let invocations = self.plan(&runs)?;
        for invocation in &invocations {
            if let Some(parent) = invocation.output.parent()
                && !parent.as_os_str().is_empty()
            {
                create_dir_all(parent).await?;
            }
        }
        debug!(
            "Running {} runs with {} workers",
            invocations.len(),
            self.workers
        );

        let failed = AtomicBool::new(false);
        let mut results = stream::iter(runs.into_iter().zip(invocations).enumerate())
            .map(|(index, (params, invocation))| {
                let failed = &failed;
                async move {
                    if failed.load(Ordering::SeqCst) {
                        warn!("Skipping run {index} ({invocation})");
                        return self.finish(index, params, RunStatus::Skipped, None);
                    }
                    self.emit(RunEvent::Started { index });
                    let start = Instant::now();
                    let status = match self.launcher.launch(&invocation).await {
                        Ok(Some(0)) => RunStatus::Succeeded,
                        Ok(code) => RunStatus::Failed { code },
                        Err(err) => RunStatus::LaunchFailed {
                            reason: err.to_string(),
                        },
                    };
                    if !status.is_success() {
                        error!("Run {index} ({invocation}): {}", status.describe());
                        failed.store(true, Ordering::SeqCst);
                    }
                    self.finish(index, params, status, Some(start))
                }
            })
            .buffer_unordered(self.workers.get())
            .collect::<Vec<_>>()
            .await;

        results.sort_by_key(|r| r.index);
        Ok(Batch { results })
    }

    fn finish(
        &self,
        index: usize,
        params: RunParams,
        status: RunStatus,
        start: Option<Instant>,
    ) -> RunResult {
        self.emit(RunEvent::Finished {
            index,
            status: status.clone(),
        });
        RunResult {
            index,
            params,
            status,
            elapsed_ms: start.map_or(0, |s| s.elapsed().as_millis() as u64),
        }
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            _ = events.send(event);
        }
    }
}
