use std::path::{Path, PathBuf};

use chrono::Local;
use common::{
    config::Config,
    orchestrator::{Orchestrator, RunEvent},
    run::{ProcessLauncher, RunParams, RunResult, RunStatus},
};
use console::style;
use eyre::{Context, Result};
use flume::{Receiver, unbounded};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{copy, create_dir_all, write},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{load_config, plot::plot_figures};

/// Run manifest written to `info.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkInfo {
    pub name: String,
    pub started: String,
    pub workers: usize,
    pub results: Vec<RunResult>,
}

impl BenchmarkInfo {
    pub fn succeeded(&self) -> bool {
        self.results.iter().all(|r| r.status.is_success())
    }
}

pub async fn run_benchmark(config_file: String, no_progress: bool, skip_plot: bool) -> Result<()> {
    let config = load_config(&config_file).await?;

    let started = Local::now();
    let file_prefix = started.format("%Y-%m-%d_%H-%M-%S").to_string();
    let results_path = PathBuf::from("results").join(format!("{}-{file_prefix}", config.name));
    println!("Results created in folder: {}", results_path.display());
    let data_path = results_path.join("data");
    create_dir_all(&data_path).await?;
    copy(&config_file, results_path.join("config.yaml")).await?;

    let runs = collect_runs(&config, &data_path)?;
    let workers = config.settings.workers.unwrap_or_else(num_cpus::get);
    let launcher = ProcessLauncher {
        env: config.settings.env.clone().unwrap_or_default(),
        capture_stdout: config.settings.capture_stdout,
    };
    let (tx, rx) = unbounded();
    let orchestrator =
        Orchestrator::new(launcher, config.settings.template(), workers).with_events(tx);
    let progress = track_progress(rx, runs.len(), no_progress);

    let batch = orchestrator.run(runs).await;
    let workers = orchestrator.workers();
    drop(orchestrator);
    progress.await?;
    let batch = batch.context("Rejected run batch")?;

    let info = BenchmarkInfo {
        name: config.name.clone(),
        started: started.to_rfc3339(),
        workers,
        results: batch.results.clone(),
    };
    write(
        results_path.join("info.json"),
        serde_json::to_string_pretty(&info)?,
    )
    .await?;
    batch.check()?;
    info!("All {} runs succeeded", batch.results.len());

    if skip_plot {
        debug!("Skipping figures");
        return Ok(());
    }
    let figure_path = results_path.join("figures");
    create_dir_all(&figure_path).await?;
    plot_figures(&config, &data_path, &figure_path)
}

/// Expands every experiment into its runs, in config order
pub fn collect_runs(config: &Config, data_path: &Path) -> Result<Vec<RunParams>> {
    let mut runs = Vec::new();
    for experiment in &config.experiments {
        let expanded = experiment
            .bench
            .runs(&experiment.name, data_path)
            .with_context(|| format!("Expand experiment {}", experiment.name))?;
        debug!(
            "{} ({}): {} runs",
            experiment.name,
            experiment.bench.name(),
            expanded.len()
        );
        runs.extend(expanded);
    }
    Ok(runs)
}

fn track_progress(events: Receiver<RunEvent>, total: usize, hidden: bool) -> JoinHandle<()> {
    let bar = if hidden {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total as u64)
    };
    if let Ok(bar_style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(bar_style.progress_chars("##-"));
    }
    tokio::spawn(async move {
        let mut running = 0usize;
        while let Ok(event) = events.recv_async().await {
            match event {
                RunEvent::Started { .. } => running += 1,
                RunEvent::Finished { index, status } => {
                    if status != RunStatus::Skipped {
                        running = running.saturating_sub(1);
                    }
                    if !status.is_success() {
                        bar.println(format!(
                            "{} run {index}: {}",
                            style("failed").red(),
                            status.describe()
                        ));
                    }
                    bar.inc(1);
                }
            }
            bar.set_message(format!("{running} running"));
        }
        bar.finish_with_message("done");
    })
}
