use std::path::Path;

use common::{config::Config, error::ReportError, plot::Figure};
use console::style;
use eyre::{Result, bail};
use tracing::{error, info};

/// Draws every configured figure in order. A figure that fails is logged and
/// skipped; the error is returned once all figures were attempted.
pub fn plot_figures(config: &Config, data_dir: &Path, figure_dir: &Path) -> Result<()> {
    let mut failed = Vec::new();
    for figure in &config.figures {
        match render(config, figure, data_dir, figure_dir) {
            Ok(rendered) => {
                println!("{} {}", style("saved").green(), rendered.output.display());
                if config.settings.show {
                    _ = rendered.show(config.settings.viewer.as_deref());
                }
            }
            Err(err) => {
                error!("Figure {}: {err}", figure.name);
                failed.push(figure.name.as_str());
            }
        }
    }
    if !failed.is_empty() {
        bail!(
            "{} of {} figures failed: {}",
            failed.len(),
            config.figures.len(),
            failed.join(", ")
        );
    }
    info!("Drew {} figures", config.figures.len());
    Ok(())
}

fn render(
    config: &Config,
    figure: &common::config::FigureConfig,
    data_dir: &Path,
    figure_dir: &Path,
) -> Result<Figure, ReportError> {
    let built = figure.build(data_dir, figure_dir, config.settings.dpi)?;
    built.save()?;
    Ok(built)
}
