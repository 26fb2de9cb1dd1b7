use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{error::ReportError, series::SeriesKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartKind {
    Line,
    GroupedBar,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scale {
    #[default]
    Linear,
    Log2,
    Log10,
}

impl Scale {
    /// Maps a data value into plotting space
    pub fn forward(&self, v: f64) -> Option<f64> {
        match self {
            Scale::Linear => Some(v),
            Scale::Log2 if v > 0.0 => Some(v.log2()),
            Scale::Log10 if v > 0.0 => Some(v.log10()),
            _ => None,
        }
    }

    pub fn inverse(&self, v: f64) -> f64 {
        match self {
            Scale::Linear => v,
            Scale::Log2 => v.exp2(),
            Scale::Log10 => 10f64.powf(v),
        }
    }

    pub fn is_log(&self) -> bool {
        !matches!(self, Scale::Linear)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickFormat {
    #[default]
    Plain,
    /// 1024 -> "1 KB"
    Bytes,
    /// 3_200_000_000 -> "3.2G"
    Si,
}

impl TickFormat {
    pub fn format(&self, v: f64) -> String {
        match self {
            TickFormat::Plain => plain(v),
            TickFormat::Bytes => bytes(v),
            TickFormat::Si => si(v),
        }
    }
}

fn plain(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        let s = format!("{v:.2}");
        s.trim_end_matches('0').trim_end_matches('.').to_owned()
    }
}

fn bytes(v: f64) -> String {
    const UNITS: [(f64, &str); 3] = [
        (1024.0 * 1024.0 * 1024.0, "GB"),
        (1024.0 * 1024.0, "MB"),
        (1024.0, "KB"),
    ];
    for (size, unit) in UNITS {
        if v.abs() >= size {
            return format!("{} {unit}", plain(v / size));
        }
    }
    plain(v)
}

fn si(v: f64) -> String {
    const UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "G"), (1e6, "M"), (1e3, "k")];
    for (size, unit) in UNITS {
        if v.abs() >= size {
            return format!("{}{unit}", plain(v / size));
        }
    }
    plain(v)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub label: String,
    #[serde(default)]
    pub scale: Scale,
    #[serde(default)]
    pub format: TickFormat,
    /// Always include zero in the visible range
    #[serde(default)]
    pub from_zero: bool,
}

impl Axis {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_owned(),
            scale: Scale::Linear,
            format: TickFormat::Plain,
            from_zero: false,
        }
    }

    pub fn scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub fn format(mut self, format: TickFormat) -> Self {
        self.format = format;
        self
    }

    pub fn from_zero(mut self) -> Self {
        self.from_zero = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);

    /// Parses `#rrggbb`
    pub fn from_hex(hex: &str) -> Result<Self, ReportError> {
        let invalid = || ReportError::Config(format!("invalid colour {hex:?}, expected #rrggbb"));
        let digits = hex.strip_prefix('#').ok_or_else(invalid)?;
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        Ok(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marker {
    None,
    Circle,
    Square,
    Triangle,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinePattern {
    Solid,
    Dashed,
    Dotted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesStyle {
    pub label: String,
    pub color: Rgb,
    pub marker: Marker,
    pub line: LinePattern,
}

impl SeriesStyle {
    pub fn new(label: &str, color: Rgb, marker: Marker, line: LinePattern) -> Self {
        Self {
            label: label.to_owned(),
            color,
            marker,
            line,
        }
    }
}

/// Fixed visual encoding per series identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleTable {
    styles: BTreeMap<SeriesKey, SeriesStyle>,
}

impl StyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: SeriesKey, style: SeriesStyle) {
        self.styles.insert(key, style);
    }

    pub fn with(mut self, key: SeriesKey, style: SeriesStyle) -> Self {
        self.insert(key, style);
        self
    }

    pub fn lookup(&self, key: &SeriesKey) -> Result<&SeriesStyle, ReportError> {
        self.styles
            .get(key)
            .ok_or_else(|| ReportError::StyleLookup(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

/// A fixed polyline drawn over the data, e.g. ideal linear speedup
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLine {
    pub label: String,
    pub points: Vec<(f64, f64)>,
    pub color: Rgb,
    pub line: LinePattern,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegendPosition {
    UpperLeft,
    #[default]
    UpperRight,
    LowerLeft,
    LowerRight,
    Hidden,
}

/// Everything needed to draw one chart except the data itself
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: Option<String>,
    pub metric: String,
    pub x_axis: Axis,
    pub y_axis: Axis,
    pub series: Vec<(SeriesKey, SeriesStyle)>,
    pub reference_lines: Vec<ReferenceLine>,
    pub legend: LegendPosition,
}

impl ChartSpec {
    pub fn builder(kind: ChartKind, metric: &str) -> ChartSpecBuilder {
        ChartSpecBuilder {
            kind,
            title: None,
            metric: metric.to_owned(),
            x_axis: Axis::new(""),
            y_axis: Axis::new(metric),
            keys: Vec::new(),
            reference_lines: Vec::new(),
            legend: LegendPosition::default(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &SeriesKey> {
        self.series.iter().map(|(k, _)| k)
    }

    /// Drops the listed series, used when their data turned out empty
    pub fn without(mut self, missing: &[SeriesKey]) -> Self {
        self.series.retain(|(key, _)| !missing.contains(key));
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChartSpecBuilder {
    kind: ChartKind,
    title: Option<String>,
    metric: String,
    x_axis: Axis,
    y_axis: Axis,
    keys: Vec<SeriesKey>,
    reference_lines: Vec<ReferenceLine>,
    legend: LegendPosition,
}

impl ChartSpecBuilder {
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_owned());
        self
    }

    pub fn x_axis(mut self, axis: Axis) -> Self {
        self.x_axis = axis;
        self
    }

    pub fn y_axis(mut self, axis: Axis) -> Self {
        self.y_axis = axis;
        self
    }

    pub fn series(mut self, keys: impl IntoIterator<Item = SeriesKey>) -> Self {
        self.keys.extend(keys);
        self
    }

    pub fn reference_line(mut self, line: ReferenceLine) -> Self {
        self.reference_lines.push(line);
        self
    }

    pub fn legend(mut self, legend: LegendPosition) -> Self {
        self.legend = legend;
        self
    }

    /// Resolves every series style; an undeclared key fails here, before any drawing.
    pub fn build(self, styles: &StyleTable) -> Result<ChartSpec, ReportError> {
        let mut series: Vec<(SeriesKey, SeriesStyle)> = Vec::with_capacity(self.keys.len());
        for key in self.keys {
            if series.iter().any(|(k, _)| *k == key) {
                return Err(ReportError::Config(format!(
                    "series {key} is listed twice in chart {:?}",
                    self.metric
                )));
            }
            let style = styles.lookup(&key)?.clone();
            series.push((key, style));
        }
        if self.kind == ChartKind::GroupedBar && self.y_axis.scale.is_log() {
            return Err(ReportError::Config(format!(
                "bar chart {:?} cannot use a logarithmic value axis",
                self.metric
            )));
        }
        Ok(ChartSpec {
            kind: self.kind,
            title: self.title,
            metric: self.metric,
            x_axis: self.x_axis,
            y_axis: self.y_axis,
            series,
            reference_lines: self.reference_lines,
            legend: self.legend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(program: &str) -> SeriesKey {
        SeriesKey::new(&[("program", program)])
    }

    fn styles() -> StyleTable {
        StyleTable::new().with(
            key("a"),
            SeriesStyle::new("Program A", Rgb(255, 0, 0), Marker::Circle, LinePattern::Solid),
        )
    }

    #[test]
    fn undeclared_series_fails_at_build_time() {
        let err = ChartSpec::builder(ChartKind::Line, "time_seconds")
            .series([key("a"), key("b")])
            .build(&styles())
            .unwrap_err();
        match err {
            ReportError::StyleLookup(k) => assert_eq!(k, "(program=b)"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn duplicate_series_is_rejected() {
        let err = ChartSpec::builder(ChartKind::Line, "time_seconds")
            .series([key("a"), key("a")])
            .build(&styles());
        assert!(matches!(err, Err(ReportError::Config(_))));
    }

    #[test]
    fn log_bars_are_rejected() {
        let err = ChartSpec::builder(ChartKind::GroupedBar, "throughput")
            .y_axis(Axis::new("Gbps").scale(Scale::Log10))
            .build(&StyleTable::new());
        assert!(matches!(err, Err(ReportError::Config(_))));
    }

    #[test]
    fn resolves_styles_in_order() {
        let spec = ChartSpec::builder(ChartKind::Line, "time_seconds")
            .series([key("a")])
            .build(&styles())
            .unwrap();
        assert_eq!(spec.series[0].1.label, "Program A");
        assert_eq!(spec.y_axis.label, "time_seconds");
        assert!(spec.without(&[key("a")]).series.is_empty());
    }

    #[test]
    fn hex_colours() {
        assert_eq!(Rgb::from_hex("#FF6B6B").unwrap(), Rgb(0xff, 0x6b, 0x6b));
        assert!(Rgb::from_hex("FF6B6B").is_err());
        assert!(Rgb::from_hex("#FF6B").is_err());
    }

    #[test]
    fn tick_formats() {
        assert_eq!(TickFormat::Plain.format(4.0), "4");
        assert_eq!(TickFormat::Plain.format(2.5), "2.5");
        assert_eq!(TickFormat::Bytes.format(512.0), "512");
        assert_eq!(TickFormat::Bytes.format(1024.0), "1 KB");
        assert_eq!(TickFormat::Bytes.format(65536.0), "64 KB");
        assert_eq!(TickFormat::Bytes.format(1048576.0), "1 MB");
        assert_eq!(TickFormat::Si.format(3_200_000_000.0), "3.2G");
        assert_eq!(TickFormat::Si.format(850_000.0), "850k");
    }

    #[test]
    fn log_scale_rejects_non_positive_values() {
        assert_eq!(Scale::Log2.forward(1024.0), Some(10.0));
        assert_eq!(Scale::Log2.forward(0.0), None);
        assert_eq!(Scale::Log2.inverse(10.0), 1024.0);
        assert_eq!(Scale::Linear.forward(-3.0), Some(-3.0));
    }
}
