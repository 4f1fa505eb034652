use std::{
    fs,
    ops::Range,
    path::PathBuf,
    process::{Command, Stdio},
    thread::{self, JoinHandle},
};

use plotters::{
    coord::{CoordTranslate, Shift, types::RangedCoordf64},
    drawing::DrawingAreaErrorKind,
    prelude::*,
    series::DashedLineSeries,
    style::{FontDesc, FontFamily, FontStyle},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::ReportError,
    series::{DisplaySeries, LineStyle, Marker},
    util::format_plain,
};

#[cfg(target_os = "macos")]
const DEFAULT_VIEWER: &str = "open";
#[cfg(not(target_os = "macos"))]
const DEFAULT_VIEWER: &str = "xdg-open";

type DrawResult<T, DB> = Result<T, DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;
type LineChart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelKind {
    #[default]
    Line,
    /// One bar per series, showing its last value
    Bar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendPosition {
    UpperLeft,
    UpperMiddle,
    UpperRight,
    MiddleLeft,
    MiddleMiddle,
    MiddleRight,
    LowerLeft,
    LowerMiddle,
    LowerRight,
}

impl From<LegendPosition> for SeriesLabelPosition {
    fn from(value: LegendPosition) -> Self {
        match value {
            LegendPosition::UpperLeft => SeriesLabelPosition::UpperLeft,
            LegendPosition::UpperMiddle => SeriesLabelPosition::UpperMiddle,
            LegendPosition::UpperRight => SeriesLabelPosition::UpperRight,
            LegendPosition::MiddleLeft => SeriesLabelPosition::MiddleLeft,
            LegendPosition::MiddleMiddle => SeriesLabelPosition::MiddleMiddle,
            LegendPosition::MiddleRight => SeriesLabelPosition::MiddleRight,
            LegendPosition::LowerLeft => SeriesLabelPosition::LowerLeft,
            LegendPosition::LowerMiddle => SeriesLabelPosition::LowerMiddle,
            LegendPosition::LowerRight => SeriesLabelPosition::LowerRight,
        }
    }
}

/// Text placed relative to the plotting area, (0, 0) is bottom left
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Annotation {
    pub text: String,
    #[serde(default = "default_annotation_x")]
    pub x: f64,
    #[serde(default = "default_annotation_y")]
    pub y: f64,
}

fn default_annotation_x() -> f64 {
    0.05
}

fn default_annotation_y() -> f64 {
    0.97
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelSpec {
    pub kind: PanelKind,
    pub x_label: String,
    pub y_label: String,
    pub x_limits: Option<(f64, f64)>,
    pub y_limits: Option<(f64, f64)>,
    pub title: Option<String>,
    pub annotation: Option<Annotation>,
    pub legend: Option<LegendPosition>,
    pub series: Vec<DisplaySeries>,
}

impl PanelSpec {
    pub fn new(kind: PanelKind, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        PanelSpec {
            kind,
            x_label: x_label.into(),
            y_label: y_label.into(),
            x_limits: None,
            y_limits: None,
            title: None,
            annotation: None,
            legend: None,
            series: Vec::new(),
        }
    }

    /// `(label, last value, color)` per series with at least one value
    pub fn bars(&self) -> Vec<(&str, f64, RGBColor)> {
        self.series
            .iter()
            .filter_map(|s| {
                s.y.last()
                    .map(|v| (s.label.as_str(), *v, s.style.color.rgb()))
            })
            .collect()
    }

    fn x_range(&self) -> Range<f64> {
        axis_range(
            self.series.iter().flat_map(|s| s.x.iter().copied()),
            self.x_limits,
        )
    }

    fn y_range(&self) -> Range<f64> {
        axis_range(
            self.series.iter().flat_map(|s| s.y.iter().copied()),
            self.y_limits,
        )
    }

    fn bar_range(&self) -> Range<f64> {
        if let Some((lo, hi)) = self.y_limits {
            return lo..hi;
        }
        let values = self.bars().into_iter().map(|(_, v, _)| v);
        axis_range(values.chain(std::iter::once(0.0)), None)
    }
}

/// Explicit limits win, otherwise the data range padded by 5% on both ends
pub fn axis_range(values: impl Iterator<Item = f64>, limits: Option<(f64, f64)>) -> Range<f64> {
    if let Some((lo, hi)) = limits {
        return lo..hi;
    }
    let bounds = values
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });
    match bounds {
        None => 0.0..1.0,
        Some((lo, hi)) if lo == hi => {
            let pad = if lo == 0.0 { 0.5 } else { lo.abs() * 0.05 };
            (lo - pad)..(hi + pad)
        }
        Some((lo, hi)) => {
            let pad = (hi - lo) * 0.05;
            (lo - pad)..(hi + pad)
        }
    }
}

/// Converts point sizes to pixels at the figure's resolution
struct Fonts {
    px_per_pt: f64,
}

impl Fonts {
    fn new(dpi: u32) -> Self {
        Fonts {
            px_per_pt: dpi as f64 / 72.0,
        }
    }

    fn px(&self, pt: f64) -> u32 {
        (pt * self.px_per_pt).round().max(1.0) as u32
    }

    fn text(&self, pt: f64) -> TextStyle<'static> {
        FontDesc::new(FontFamily::SansSerif, self.px(pt) as f64, FontStyle::Normal).color(&BLACK)
    }

    fn title(&self) -> TextStyle<'static> {
        self.text(12.0)
    }

    fn label(&self) -> TextStyle<'static> {
        self.text(10.0)
    }

    fn annotation(&self) -> TextStyle<'static> {
        self.text(12.0)
    }

    fn line_width(&self) -> u32 {
        self.px(1.5)
    }

    fn marker_size(&self) -> u32 {
        self.px(3.0)
    }

    fn x_label_area(&self) -> u32 {
        self.px(10.0) * 3
    }

    fn y_label_area(&self) -> u32 {
        self.px(10.0) * 6
    }

    fn margin(&self) -> u32 {
        self.px(6.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub name: String,
    /// (rows, columns)
    pub grid: (usize, usize),
    /// (width, height) in inches
    pub size: (f64, f64),
    pub dpi: u32,
    pub output: PathBuf,
    /// Filled into the grid row by row
    pub panels: Vec<PanelSpec>,
}

impl Figure {
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.size.0 * self.dpi as f64).round() as u32,
            (self.size.1 * self.dpi as f64).round() as u32,
        )
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        let (rows, cols) = self.grid;
        if rows == 0 || cols == 0 {
            return Err(ReportError::Config(format!(
                "Figure {} has an empty {rows}x{cols} grid",
                self.name
            )));
        }
        if self.panels.len() > rows * cols {
            return Err(ReportError::Config(format!(
                "Figure {} has {} panels but only a {rows}x{cols} grid",
                self.name,
                self.panels.len()
            )));
        }
        let (w, h) = self.pixel_size();
        if w == 0 || h == 0 {
            return Err(ReportError::Config(format!(
                "Figure {} renders to an empty {w}x{h} image",
                self.name
            )));
        }
        Ok(())
    }

    /// Draws every panel onto `root`, which should be [`Figure::pixel_size`] large
    pub fn compose<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> DrawResult<(), DB> {
        let fonts = Fonts::new(self.dpi);
        root.fill(&WHITE)?;
        let cells = root.split_evenly(self.grid);
        for (idx, (panel, cell)) in self.panels.iter().zip(&cells).enumerate() {
            debug!("Drawing {} panel {idx} ({:?})", self.name, panel.kind);
            let m = fonts.margin();
            let cell = cell.margin(m, m, m, m);
            match panel.kind {
                PanelKind::Line => draw_line_panel(&cell, panel, &fonts)?,
                PanelKind::Bar => draw_bar_panel(&cell, panel, &fonts)?,
            }
        }
        root.present()?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), ReportError> {
        self.validate()?;
        if let Some(parent) = self.output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let root = BitMapBackend::new(&self.output, self.pixel_size()).into_drawing_area();
        self.compose(&root).map_err(|err| ReportError::Render {
            path: self.output.clone(),
            message: err.to_string(),
        })?;
        info!("Saved figure {} to {}", self.name, self.output.display());
        Ok(())
    }

    /// Opens the saved image in a viewer without waiting for it. Failures are only logged.
    ///
    /// Returns the thread that reaps the viewer once it exits, `None` if it could not start.
    pub fn show(&self, viewer: Option<&str>) -> Option<JoinHandle<()>> {
        let viewer = viewer.unwrap_or(DEFAULT_VIEWER).to_owned();
        let spawned = Command::new(&viewer)
            .arg(&self.output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(mut child) => {
                debug!("Opened {} with {viewer}", self.output.display());
                Some(thread::spawn(move || match child.wait() {
                    Ok(status) => debug!("Viewer {viewer} exited with {status}"),
                    Err(err) => warn!("Could not wait for viewer {viewer}: {err}"),
                }))
            }
            Err(err) => {
                warn!("Could not display {}: {err}", self.output.display());
                None
            }
        }
    }
}

fn draw_line_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &PanelSpec,
    fonts: &Fonts,
) -> DrawResult<(), DB> {
    let mut builder = ChartBuilder::on(area);
    builder
        .margin(fonts.margin())
        .x_label_area_size(fonts.x_label_area())
        .y_label_area_size(fonts.y_label_area());
    if let Some(title) = &panel.title {
        builder.caption(title, fonts.title());
    }
    let mut chart = builder.build_cartesian_2d(panel.x_range(), panel.y_range())?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc(panel.x_label.as_str())
        .y_desc(panel.y_label.as_str())
        .x_label_formatter(&|v| format_plain(*v))
        .y_label_formatter(&|v| format_plain(*v))
        .label_style(fonts.label())
        .axis_desc_style(fonts.label())
        .draw()?;

    let mut ordered = panel.series.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|s| s.style.draw_order);
    for series in ordered {
        draw_series(&mut chart, series, fonts)?;
    }

    if let Some(position) = panel.legend {
        chart
            .configure_series_labels()
            .position(position.into())
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK.mix(0.3))
            .label_font(fonts.label())
            .draw()?;
    }

    if let Some(annotation) = &panel.annotation {
        draw_annotation(&chart.plotting_area().strip_coord_spec(), annotation, fonts)?;
    }
    Ok(())
}

fn draw_series<DB: DrawingBackend>(
    chart: &mut LineChart<'_, DB>,
    series: &DisplaySeries,
    fonts: &Fonts,
) -> DrawResult<(), DB> {
    let style = series.style.color.rgb().stroke_width(fonts.line_width());
    let points = series.points().collect::<Vec<_>>();
    let dash = fonts.px(4.0);
    let anno = match series.style.line_style {
        LineStyle::Solid => chart.draw_series(LineSeries::new(points.clone(), style))?,
        LineStyle::Dashed => {
            chart.draw_series(DashedLineSeries::new(points.clone(), dash, dash / 2, style))?
        }
        LineStyle::Dotted => chart.draw_series(DashedLineSeries::new(
            points.clone(),
            fonts.line_width(),
            fonts.line_width() * 2,
            style,
        ))?,
        LineStyle::DashDot => {
            draw_dash_dot(chart, &points, style, fonts)?;
            chart.draw_series(std::iter::empty::<PathElement<(f64, f64)>>())?
        }
    };
    let sample = fonts.px(14.0) as i32;
    anno.label(series.label.as_str())
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + sample, y)], style));

    let size = fonts.marker_size();
    match series.style.marker {
        Marker::None => {}
        Marker::Circle => {
            chart.draw_series(points.iter().map(|p| Circle::new(*p, size, style.filled())))?;
        }
        Marker::Cross => {
            chart.draw_series(points.iter().map(|p| Cross::new(*p, size, style)))?;
        }
        Marker::Triangle => {
            chart.draw_series(
                points
                    .iter()
                    .map(|p| TriangleMarker::new(*p, size, style.filled())),
            )?;
        }
    }
    Ok(())
}

fn draw_dash_dot<DB: DrawingBackend>(
    chart: &LineChart<'_, DB>,
    points: &[(f64, f64)],
    style: ShapeStyle,
    fonts: &Fonts,
) -> DrawResult<(), DB> {
    let (x_px, y_px) = chart.plotting_area().get_pixel_range();
    let spec = chart.as_coord_spec();
    let pixels = points
        .iter()
        .map(|p| {
            let (x, y) = spec.translate(p);
            (x - x_px.start, y - y_px.start)
        })
        .collect::<Vec<_>>();
    let area = chart.plotting_area().strip_coord_spec();
    let dot = fonts.line_width() as f64;
    for piece in dash_dot_pieces(&pixels, fonts.px(6.0) as f64, dot, dot * 2.0) {
        area.draw(&PathElement::new(piece, style))?;
    }
    Ok(())
}

/// Splits a pixel polyline into the drawn pieces of a repeating
/// dash, gap, dot, gap pattern. The pattern carries over between segments.
pub fn dash_dot_pieces(
    points: &[(i32, i32)],
    dash: f64,
    dot: f64,
    gap: f64,
) -> Vec<Vec<(i32, i32)>> {
    let (dash, dot, gap) = (dash.max(1.0), dot.max(1.0), gap.max(1.0));
    let pattern = [(dash, true), (gap, false), (dot, true), (gap, false)];
    let mut pieces = Vec::new();
    let mut current = Vec::new();
    let mut phase = 0;
    let mut left = pattern[0].0;
    for pair in points.windows(2) {
        let (x0, y0) = (pair[0].0 as f64, pair[0].1 as f64);
        let (dx, dy) = (pair[1].0 as f64 - x0, pair[1].1 as f64 - y0);
        let len = dx.hypot(dy);
        let at = |t: f64| {
            (
                (x0 + dx * t / len).round() as i32,
                (y0 + dy * t / len).round() as i32,
            )
        };
        let mut pos = 0.0;
        while pos < len {
            let step = left.min(len - pos);
            if pattern[phase].1 {
                if current.is_empty() {
                    current.push(at(pos));
                }
                current.push(at(pos + step));
            }
            pos += step;
            left -= step;
            if left <= 0.0 {
                if pattern[phase].1 {
                    pieces.push(std::mem::take(&mut current));
                }
                phase = (phase + 1) % pattern.len();
                left = pattern[phase].0;
            }
        }
    }
    if current.len() > 1 {
        pieces.push(current);
    }
    pieces
}

fn draw_bar_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &PanelSpec,
    fonts: &Fonts,
) -> DrawResult<(), DB> {
    let bars = panel.bars();
    let labels = bars.iter().map(|(l, _, _)| l.to_string()).collect::<Vec<_>>();
    let count = bars.len().max(1) as u32;

    let mut builder = ChartBuilder::on(area);
    builder
        .margin(fonts.margin())
        .x_label_area_size(fonts.x_label_area())
        .y_label_area_size(fonts.y_label_area());
    if let Some(title) = &panel.title {
        builder.caption(title, fonts.title());
    }
    let mut chart = builder.build_cartesian_2d((0u32..count).into_segmented(), panel.bar_range())?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(labels.len().max(1))
        .x_desc(panel.x_label.as_str())
        .y_desc(panel.y_label.as_str())
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) => labels.get(*i as usize).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .y_label_formatter(&|v| format_plain(*v))
        .label_style(fonts.label())
        .axis_desc_style(fonts.label())
        .draw()?;

    let gap = fonts.px(8.0);
    chart.draw_series(bars.iter().enumerate().map(|(i, (_, value, color))| {
        let i = i as u32;
        let mut bar = Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *value)],
            color.filled(),
        );
        bar.set_margin(0, 0, gap, gap);
        bar
    }))?;

    if let Some(annotation) = &panel.annotation {
        draw_annotation(&chart.plotting_area().strip_coord_spec(), annotation, fonts)?;
    }
    Ok(())
}

fn draw_annotation<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    annotation: &Annotation,
    fonts: &Fonts,
) -> DrawResult<(), DB> {
    let style = fonts.annotation();
    let (w, h) = area.dim_in_pixel();
    let x = (annotation.x * w as f64).round() as i32;
    let y = ((1.0 - annotation.y) * h as f64).round() as i32;
    let (tw, th) = area.estimate_text_size(&annotation.text, &style)?;
    let pad = fonts.px(1.0) as i32;
    area.draw(&Rectangle::new(
        [(x - pad, y - pad), (x + tw as i32 + pad, y + th as i32 + pad)],
        WHITE.mix(0.5).filled(),
    ))?;
    area.draw(&Text::new(annotation.text.clone(), (x, y), style))?;
    Ok(())
}
