use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    bench::Bench,
    dataset::Dataset,
    error::ReportError,
    plot::{Annotation, Figure, LegendPosition, PanelKind, PanelSpec},
    run::CommandTemplate,
    series::{Palette, Transform},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    pub settings: Settings,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub figures: Vec<FigureConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub program: String,
    /// Argument tokens with `{placeholder}`s, defaults to [`CommandTemplate::default_args`]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub capture_stdout: bool,
    pub workers: Option<usize>,
    pub env: Option<HashMap<String, String>>,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default)]
    pub show: bool,
    pub viewer: Option<String>,
}

fn default_dpi() -> u32 {
    600
}

impl Settings {
    pub fn template(&self) -> CommandTemplate {
        CommandTemplate::new(self.program.clone(), self.args.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    pub bench: Box<dyn Bench>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FigureConfig {
    pub name: String,
    /// File name inside the figure directory, `<name>.png` when unset
    pub output: Option<String>,
    #[serde(default = "default_grid")]
    pub grid: (usize, usize),
    /// Width and height in inches
    #[serde(default = "default_size")]
    pub size: (f64, f64),
    pub dpi: Option<u32>,
    #[serde(default = "default_x_label")]
    pub x_label: String,
    #[serde(default = "default_y_label")]
    pub y_label: String,
    /// Used by every panel that has no palette of its own
    pub palette: Option<Palette>,
    pub panels: Vec<PanelConfig>,
}

fn default_grid() -> (usize, usize) {
    (1, 1)
}

fn default_size() -> (f64, f64) {
    (14.0, 10.0)
}

fn default_x_label() -> String {
    "Array Length".to_owned()
}

fn default_y_label() -> String {
    "Computations (Log Scale)".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanelConfig {
    /// Csv file, relative to the data directory
    pub source: String,
    #[serde(default)]
    pub kind: PanelKind,
    #[serde(default)]
    pub transform: Transform,
    pub title: Option<String>,
    pub annotation: Option<Annotation>,
    pub legend: Option<LegendPosition>,
    pub x_limits: Option<(f64, f64)>,
    pub y_limits: Option<(f64, f64)>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub palette: Option<Palette>,
}

impl FigureConfig {
    pub fn file_name(&self) -> String {
        self.output
            .clone()
            .unwrap_or_else(|| format!("{}.png", self.name))
    }

    /// Reads and transforms every panel's csv from `data_dir`
    pub fn build(
        &self,
        data_dir: &Path,
        figure_dir: &Path,
        default_dpi: u32,
    ) -> Result<Figure, ReportError> {
        let palette = self.palette.clone().unwrap_or_default();
        let panels = self
            .panels
            .iter()
            .map(|panel| panel.build(data_dir, &self.x_label, &self.y_label, &palette))
            .collect::<Result<Vec<_>, _>>()?;
        let figure = Figure {
            name: self.name.clone(),
            grid: self.grid,
            size: self.size,
            dpi: self.dpi.unwrap_or(default_dpi),
            output: figure_dir.join(self.file_name()),
            panels,
        };
        figure.validate()?;
        debug!("Built figure {} with {} panels", figure.name, figure.panels.len());
        Ok(figure)
    }
}

impl PanelConfig {
    pub fn build(
        &self,
        data_dir: &Path,
        x_label: &str,
        y_label: &str,
        palette: &Palette,
    ) -> Result<PanelSpec, ReportError> {
        let dataset = Dataset::read(data_dir.join(&self.source))?;
        let palette = self.palette.as_ref().unwrap_or(palette);
        Ok(PanelSpec {
            kind: self.kind,
            x_label: self
                .transform
                .x_label(self.x_label.as_deref().unwrap_or(x_label)),
            y_label: self
                .transform
                .y_label(self.y_label.as_deref().unwrap_or(y_label)),
            x_limits: self.x_limits,
            y_limits: self.y_limits,
            title: self.title.clone(),
            annotation: self.annotation.clone(),
            legend: self.legend,
            series: self.transform.derive(&dataset, palette)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn figure(yaml: &str) -> FigureConfig {
        serde_yml::from_str(yaml).unwrap()
    }

    #[test]
    fn builds_figure_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fig_5.csv"), "n,Quick,Radix\n1000,10,20\n2000,40,80\n").unwrap();
        let config = figure(
            r##"
name: fig_5
grid: [1, 2]
dpi: 100
panels:
  - source: fig_5.csv
    transform:
      x_exponent: 3
      y_exponent: 1
    y_label: Computations
    legend: upper_left
  - source: fig_5.csv
    kind: bar
    transform:
      log: true
      zero_policy: clamp
    palette:
      colors: ["#000000"]
"##,
        );
        let built = config
            .build(dir.path(), &dir.path().join("figures"), 600)
            .unwrap();
        assert_eq!(built.dpi, 100);
        assert_eq!(built.output, dir.path().join("figures/fig_5.png"));

        let line = &built.panels[0];
        assert_eq!(line.x_label, "Array Length (10^3)");
        assert_eq!(line.y_label, "Computations (10^1)");
        assert_eq!(line.legend, Some(LegendPosition::UpperLeft));
        assert_eq!(line.series[0].x, vec![1.0, 2.0]);
        assert_eq!(line.series[1].y, vec![2.0, 8.0]);

        let bar = &built.panels[1];
        assert_eq!(bar.kind, PanelKind::Bar);
        assert_eq!(bar.y_label, "Computations (Log Scale)");
        assert_eq!(bar.series[1].style.color.to_string(), "#000000");
        assert!((bar.series[0].y[0] - 10f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn missing_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = figure("name: f\npanels:\n  - source: absent.csv\n");
        assert!(matches!(
            config.build(dir.path(), dir.path(), 100),
            Err(ReportError::NotFound { .. })
        ));
    }

    #[test]
    fn too_many_panels_for_grid() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "n,A\n1,1\n").unwrap();
        let config = figure("name: f\npanels:\n  - source: a.csv\n  - source: a.csv\n");
        assert!(matches!(
            config.build(dir.path(), dir.path(), 100),
            Err(ReportError::Config(_))
        ));
    }

    #[test]
    fn unknown_figure_keys_are_rejected() {
        assert!(serde_yml::from_str::<FigureConfig>("name: f\npanels: []\ncolour: red\n").is_err());
    }

    #[test]
    fn unknown_panel_keys_are_rejected() {
        let misspelled = "name: f\npanels:\n  - source: a.csv\n    legnd: upper_right\n";
        assert!(serde_yml::from_str::<FigureConfig>(misspelled).is_err());
        let bad_transform = "name: f\npanels:\n  - source: a.csv\n    transform:\n      logg: true\n";
        assert!(serde_yml::from_str::<FigureConfig>(bad_transform).is_err());
        let ok = "name: f\npanels:\n  - source: a.csv\n    legend: upper_right\n";
        let config = figure(ok);
        assert_eq!(config.panels[0].legend, Some(LegendPosition::UpperRight));
        assert_eq!(config.panels[0].transform, Transform::default());
    }
}
