use std::{fmt, str::FromStr};

use plotters::style::RGBColor;
use serde::{Deserialize, Serialize};

use crate::{
    dataset::Dataset,
    error::ReportError,
    util::{exponent_suffix, power_of_ten},
};

/// matplotlib's default "C0".."C9" color cycle
pub const DEFAULT_COLORS: [SeriesColor; 10] = [
    SeriesColor(0x1f, 0x77, 0xb4),
    SeriesColor(0xff, 0x7f, 0x0e),
    SeriesColor(0x2c, 0xa0, 0x2c),
    SeriesColor(0xd6, 0x27, 0x28),
    SeriesColor(0x94, 0x67, 0xbd),
    SeriesColor(0x8c, 0x56, 0x4b),
    SeriesColor(0xe3, 0x77, 0xc2),
    SeriesColor(0x7f, 0x7f, 0x7f),
    SeriesColor(0xbc, 0xbd, 0x22),
    SeriesColor(0x17, 0xbe, 0xcf),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeriesColor(pub u8, pub u8, pub u8);

impl SeriesColor {
    pub fn rgb(&self) -> RGBColor {
        RGBColor(self.0, self.1, self.2)
    }
}

impl FromStr for SeriesColor {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ReportError::Config(format!("Invalid color \"{s}\""));
        if let Some(idx) = s.strip_prefix('C') {
            let idx = idx.parse::<usize>().map_err(|_| invalid())?;
            return DEFAULT_COLORS.get(idx).copied().ok_or_else(invalid);
        }
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
        };
        Ok(SeriesColor(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for SeriesColor {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeriesColor> for String {
    fn from(value: SeriesColor) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SeriesColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
    DashDot,
}

impl FromStr for LineStyle {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "-" | "solid" => Ok(LineStyle::Solid),
            "--" | "dashed" => Ok(LineStyle::Dashed),
            ":" | "dotted" => Ok(LineStyle::Dotted),
            "-." | "dashdot" => Ok(LineStyle::DashDot),
            other => Err(ReportError::Config(format!("Invalid line style \"{other}\""))),
        }
    }
}

impl TryFrom<String> for LineStyle {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LineStyle> for String {
    fn from(value: LineStyle) -> Self {
        match value {
            LineStyle::Solid => "-",
            LineStyle::Dashed => "--",
            LineStyle::Dotted => ":",
            LineStyle::DashDot => "-.",
        }
        .to_owned()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Marker {
    #[default]
    None,
    Circle,
    Cross,
    Triangle,
}

impl FromStr for Marker {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "none" => Ok(Marker::None),
            "o" | "circle" => Ok(Marker::Circle),
            "x" | "cross" => Ok(Marker::Cross),
            "^" | "triangle" => Ok(Marker::Triangle),
            other => Err(ReportError::Config(format!("Invalid marker \"{other}\""))),
        }
    }
}

impl TryFrom<String> for Marker {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Marker> for String {
    fn from(value: Marker) -> Self {
        match value {
            Marker::None => "none",
            Marker::Circle => "o",
            Marker::Cross => "x",
            Marker::Triangle => "^",
        }
        .to_owned()
    }
}

/// Immutable style tokens shared by every panel that draws from it.
///
/// Empty lists fall back to [`DEFAULT_COLORS`], solid lines and no markers.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Palette {
    #[serde(default)]
    pub colors: Vec<SeriesColor>,
    #[serde(default)]
    pub line_styles: Vec<LineStyle>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    /// Shifts the index so a panel continues the sequence of a previous one
    #[serde(default)]
    pub offset: usize,
}

fn pick<T: Copy>(items: &[T], idx: usize, fallback: T) -> T {
    if items.is_empty() {
        fallback
    } else {
        items[idx % items.len()]
    }
}

impl Palette {
    /// Style of the `idx`-th measured (non-independent) column
    pub fn style(&self, idx: usize) -> SeriesStyle {
        let slot = idx + self.offset;
        SeriesStyle {
            color: pick(&self.colors, slot, DEFAULT_COLORS[slot % DEFAULT_COLORS.len()]),
            line_style: pick(&self.line_styles, slot, LineStyle::Solid),
            marker: pick(&self.markers, slot, Marker::None),
            draw_order: idx,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStyle {
    pub color: SeriesColor,
    pub line_style: LineStyle,
    pub marker: Marker,
    pub draw_order: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySeries {
    pub label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub style: SeriesStyle,
}

impl DisplaySeries {
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }
}

/// How a zero measurement is treated when a log transform is requested
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroPolicy {
    #[default]
    Reject,
    /// Zero counts become 1 so they land on 0 after the transform
    Clamp,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transform {
    #[serde(default)]
    pub x_exponent: i32,
    #[serde(default)]
    pub y_exponent: i32,
    #[serde(default)]
    pub log: bool,
    #[serde(default)]
    pub zero_policy: ZeroPolicy,
}

impl Transform {
    pub fn x_label(&self, base: &str) -> String {
        format!("{base}{}", exponent_suffix(self.x_exponent))
    }

    pub fn y_label(&self, base: &str) -> String {
        if self.log {
            base.to_owned()
        } else {
            format!("{base}{}", exponent_suffix(self.y_exponent))
        }
    }

    pub fn apply_x(&self, values: &[f64]) -> Vec<f64> {
        let divisor = power_of_ten(self.x_exponent);
        values.iter().map(|v| v / divisor).collect()
    }

    /// Transforms one measured column. `label` and `source` only feed errors.
    pub fn apply_y(
        &self,
        values: &[f64],
        label: &str,
        source: &std::path::Path,
    ) -> Result<Vec<f64>, ReportError> {
        if !self.log {
            let divisor = power_of_ten(self.y_exponent);
            return Ok(values.iter().map(|v| v / divisor).collect());
        }
        values
            .iter()
            .enumerate()
            .map(|(row, &v)| match v {
                v if v > 0.0 => Ok(v.ln()),
                v if v == 0.0 && self.zero_policy == ZeroPolicy::Clamp => Ok(0.0),
                v => Err(ReportError::Domain {
                    path: source.to_path_buf(),
                    series: label.to_owned(),
                    row: row + 1,
                    message: format!("Logarithm of non-positive value {v}"),
                }),
            })
            .collect()
    }

    /// One display series per measured column of `dataset`
    pub fn derive(
        &self,
        dataset: &Dataset,
        palette: &Palette,
    ) -> Result<Vec<DisplaySeries>, ReportError> {
        let x = self.apply_x(dataset.x());
        dataset
            .measured()
            .enumerate()
            .map(|(idx, (label, column))| {
                Ok(DisplaySeries {
                    label: label.to_owned(),
                    x: x.clone(),
                    y: self.apply_y(column, label, dataset.source())?,
                    style: palette.style(idx),
                })
            })
            .collect()
    }
}
