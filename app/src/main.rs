use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use common::{
    config::Config,
    orchestrator::Orchestrator,
    run::ProcessLauncher,
};
use console::style;
use eyre::{Context, Result, bail};
use tokio::fs::{create_dir_all, read_dir, read_to_string, remove_dir_all};
use tracing::{debug, error};
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::bench::BenchmarkInfo;

mod bench;
mod plot;

const MODULES: &[&str] = &["sort_report", "common", "sort_tester"];

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, default_value_t = false)]
    no_progress: bool,
    #[arg(short, long)]
    log: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List previous benchmark runs
    Ls,
    /// Run the configured experiments, then draw the figures
    Bench {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: String,
        /// Do not generate figures
        #[arg(long, default_value_t = false)]
        skip_plot: bool,
    },
    /// Draw figures from existing csv files
    Plot {
        /// Results folder of a previous `bench`
        #[arg(short, long, conflicts_with_all = ["config_file", "data", "out"])]
        folder: Option<String>,
        #[arg(short, long, requires = "data")]
        config_file: Option<String>,
        /// Directory holding the csv files
        #[arg(short, long, requires = "config_file")]
        data: Option<String>,
        /// Directory the figures are written to
        #[arg(short, long, requires = "config_file")]
        out: Option<String>,
    },
    /// Print the commands a `bench` would launch
    Print {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: String,
        /// Results folder of a previous `bench`, uses its config and data paths
        #[arg(short, long)]
        folder: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();
    let file_appender = tracing_appender::rolling::never(".", "log.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let mut env_filter = EnvFilter::new("");
    for log in &args.log {
        env_filter = env_filter.add_directive(log.parse()?);
    }
    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(layer().with_writer(non_blocking))
        .init();

    debug!("Available benches: {:?}", sort_tester::init_benches());

    let result = match args.command {
        Commands::Ls => list_benchmarks().await,
        Commands::Bench {
            config_file,
            skip_plot,
        } => bench::run_benchmark(config_file, args.no_progress, skip_plot).await,
        Commands::Plot {
            folder,
            config_file,
            data,
            out,
        } => plot(folder, config_file, data, out).await,
        Commands::Print {
            config_file,
            folder,
        } => print_commands(&config_file, folder.as_deref().map(Path::new)).await,
    };
    if let Err(err) = &result {
        error!("{err:#}");
    }
    result
}

pub async fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let text = read_to_string(path)
        .await
        .with_context(|| format!("Read config {}", path.display()))?;
    serde_yml::from_str(&text).with_context(|| format!("Parse config {}", path.display()))
}

async fn list_benchmarks() -> Result<()> {
    for (name, folder) in get_benchmarks().await? {
        let info = folder.join("info.json");
        let status = match read_to_string(&info).await {
            Ok(text) => match serde_json::from_str::<BenchmarkInfo>(&text) {
                Ok(info) if info.succeeded() => style(format!("{} runs ok", info.results.len())).green(),
                Ok(info) => style(format!("{} runs, failed", info.results.len())).red(),
                Err(_) => style("unreadable info.json".to_owned()).red(),
            },
            Err(_) => style("no runs".to_owned()).yellow(),
        };
        let folder = folder
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("{name} -> {folder} ({status})");
    }
    Ok(())
}

async fn get_benchmarks() -> Result<Vec<(String, PathBuf)>> {
    let mut results = Vec::new();
    let Ok(mut items) = read_dir("results").await else {
        return Ok(results);
    };
    while let Ok(Some(entry)) = items.next_entry().await {
        if entry.file_type().await?.is_dir() {
            let config_file = entry.path().join("config.yaml");
            if config_file.exists() {
                let config = load_config(&config_file).await?;
                results.push((config.name, entry.path()));
            }
        }
    }
    results.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(results)
}

/// Data directory the runs of `config_name` write to. Without a results folder the
/// timestamp is left as a `<timestamp>` marker, it is only known once `bench` starts.
fn print_data_path(config_name: &str, folder: Option<&Path>) -> PathBuf {
    match folder {
        Some(folder) => folder.join("data"),
        None => PathBuf::from("results")
            .join(format!("{config_name}-<timestamp>"))
            .join("data"),
    }
}

async fn print_commands(config_file: &str, folder: Option<&Path>) -> Result<()> {
    let config = match folder {
        Some(folder) => load_config(folder.join("config.yaml")).await?,
        None => load_config(config_file).await?,
    };
    let data_path = print_data_path(&config.name, folder);
    let runs = bench::collect_runs(&config, &data_path)?;
    let planner = Orchestrator::new(ProcessLauncher::default(), config.settings.template(), 1);
    for invocation in planner.plan(&runs)? {
        println!("{invocation}");
    }
    Ok(())
}

async fn plot(
    folder: Option<String>,
    config_file: Option<String>,
    data: Option<String>,
    out: Option<String>,
) -> Result<()> {
    let (config_path, data_path, figure_path) = match (folder, config_file, data) {
        (Some(folder), _, _) => {
            let base = PathBuf::from(folder);
            let figures = base.join("figures");
            _ = remove_dir_all(&figures).await;
            (base.join("config.yaml"), base.join("data"), figures)
        }
        (None, Some(config_file), Some(data)) => (
            PathBuf::from(config_file),
            PathBuf::from(data),
            PathBuf::from(out.unwrap_or("figures".to_owned())),
        ),
        _ => bail!("Either --folder or --config-file with --data is required"),
    };
    let config = load_config(&config_path).await?;
    create_dir_all(&figure_path).await?;
    plot::plot_figures(&config, &data_path, &figure_path)
}
