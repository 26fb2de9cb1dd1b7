use core::fmt::Debug;
use std::path::{Path, PathBuf};

use dyn_clone::{DynClone, clone_trait_object};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    chart::ChartSpec,
    config::Settings,
    error::ReportError,
    series::{Series, SeriesSelector},
    table::{Dataset, Table},
};

#[typetag::serde(tag = "type")]
pub trait Report: Debug + DynClone {
    /// Name used in log messages
    fn name(&self) -> &str;
    /// Loads every table the report reads
    fn load(&self, settings: &Settings) -> Result<Dataset, ReportError>;
    /// Builds the pages in output order
    ///
    /// Each page is built independently, so an empty page can be skipped
    /// without losing the rest.
    fn pages(&self, data: &Dataset, settings: &Settings) -> Vec<Result<Page, ReportError>>;
    /// Where and how the rendered pages are written
    fn output(&self, settings: &Settings) -> Result<OutputMode, ReportError>;
    /// Optional text summary printed after the report is written
    fn summarize(&self, _data: &Dataset) -> Result<Option<String>, ReportError> {
        Ok(None)
    }
}
clone_trait_object!(Report);

/// One chart: a spec together with the series it draws
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub spec: ChartSpec,
    pub series: Vec<Series>,
}

impl Panel {
    /// Pairs precomputed series with a spec; every series must be declared by the spec.
    pub fn new(spec: ChartSpec, series: Vec<Series>) -> Result<Self, ReportError> {
        if let Some(unknown) = series.iter().find(|s| !spec.keys().any(|k| k == s.key())) {
            return Err(ReportError::StyleLookup(unknown.key().to_string()));
        }
        if series.is_empty() {
            return Err(ReportError::EmptySeries(format!(
                "chart {:?} has no series",
                spec.metric
            )));
        }
        Ok(Self { spec, series })
    }

    /// Selects each series the spec lists. Series without rows are dropped
    /// with a warning; a chart left with none is an empty-series error.
    pub fn from_table(
        spec: ChartSpec,
        table: &Table,
        selector: &SeriesSelector<'_>,
    ) -> Result<Self, ReportError> {
        let mut series = Vec::with_capacity(spec.series.len());
        let mut missing = Vec::new();
        for key in spec.keys() {
            match selector.select_one(table, key) {
                Ok(s) => series.push(s),
                Err(err @ ReportError::EmptySeries(_)) => {
                    warn!("{err}, series skipped");
                    missing.push(key.clone());
                }
                Err(err) => return Err(err),
            }
        }
        let spec = spec.without(&missing);
        Self::new(spec, series)
    }
}

/// One output page holding a grid of panels
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub name: String,
    pub title: Option<String>,
    pub grid: (usize, usize),
    pub size: (u32, u32),
    pub panels: Vec<Panel>,
}

impl Page {
    pub fn single(name: &str, size: (u32, u32), panel: Panel) -> Self {
        Self {
            name: name.to_owned(),
            title: None,
            grid: (1, 1),
            size,
            panels: vec![panel],
        }
    }

    /// Panels fill the grid row by row
    pub fn grid(
        name: &str,
        size: (u32, u32),
        (rows, cols): (usize, usize),
        panels: Vec<Panel>,
    ) -> Result<Self, ReportError> {
        if rows == 0 || cols == 0 || panels.len() > rows * cols {
            return Err(ReportError::Config(format!(
                "page {name}: {} panels do not fit a {rows}x{cols} grid",
                panels.len()
            )));
        }
        if panels.is_empty() {
            return Err(ReportError::EmptySeries(format!("page {name} has no charts")));
        }
        Ok(Self {
            name: name.to_owned(),
            title: None,
            grid: (rows, cols),
            size,
            panels,
        })
    }

    pub fn title(mut self, title: Option<&str>) -> Self {
        self.title = title.map(str::to_owned);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Svg,
    Pdf,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self, ReportError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("png") => Ok(Self::Png),
            Some("svg") => Ok(Self::Svg),
            Some("pdf") => Ok(Self::Pdf),
            other => Err(ReportError::Config(format!(
                "unsupported output extension {other:?} for {}, expected png, svg or pdf",
                path.display()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// All pages in one multi-page PDF
    Document { path: PathBuf },
    /// One file per page, named by `pattern`
    PerChart { dir: PathBuf, pattern: String },
}

impl OutputMode {
    /// Rejects unknown placeholders and unsupported formats before anything is rendered
    pub fn validate(&self) -> Result<(), ReportError> {
        match self {
            OutputMode::Document { path } => match OutputFormat::from_path(path)? {
                OutputFormat::Pdf => Ok(()),
                _ => Err(ReportError::Config(format!(
                    "multi-page output {} must be a pdf",
                    path.display()
                ))),
            },
            OutputMode::PerChart { pattern, .. } => {
                let placeholder = Regex::new(r"\{([^{}]*)\}")
                    .map_err(|e| ReportError::Config(e.to_string()))?;
                for cap in placeholder.captures_iter(pattern) {
                    let name = &cap[1];
                    if name != "name" && name != "index" {
                        return Err(ReportError::Config(format!(
                            "unknown placeholder {{{name}}} in output pattern {pattern:?}"
                        )));
                    }
                }
                if !pattern.contains("{name}") && !pattern.contains("{index}") {
                    return Err(ReportError::Config(format!(
                        "output pattern {pattern:?} needs {{name}} or {{index}}"
                    )));
                }
                OutputFormat::from_path(Path::new(pattern)).map(|_| ())
            }
        }
    }

    /// Path and format of the file for page `index` (0-based)
    pub fn file_for(&self, name: &str, index: usize) -> Result<(PathBuf, OutputFormat), ReportError> {
        match self {
            OutputMode::Document { path } => Ok((path.clone(), OutputFormat::Pdf)),
            OutputMode::PerChart { dir, pattern } => {
                let file = pattern
                    .replace("{name}", name)
                    .replace("{index}", &(index + 1).to_string());
                let path = dir.join(file);
                let format = OutputFormat::from_path(&path)?;
                Ok((path, format))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chart::{ChartKind, LinePattern, Marker, Rgb, SeriesStyle, StyleTable},
        series::SeriesKey,
        table::{Field, MeasurementRow, Schema, Value},
    };

    fn per_chart(pattern: &str) -> OutputMode {
        OutputMode::PerChart {
            dir: PathBuf::from("out"),
            pattern: pattern.to_owned(),
        }
    }

    #[test]
    fn per_chart_names() {
        let mode = per_chart("net_io_{name}.png");
        mode.validate().unwrap();
        let (path, format) = mode.file_for("latency_vs_threads", 1).unwrap();
        assert_eq!(path, PathBuf::from("out/net_io_latency_vs_threads.png"));
        assert_eq!(format, OutputFormat::Png);

        let (path, format) = per_chart("chart-{index}.svg").file_for("x", 0).unwrap();
        assert_eq!(path, PathBuf::from("out/chart-1.svg"));
        assert_eq!(format, OutputFormat::Svg);
    }

    #[test]
    fn invalid_patterns() {
        assert!(per_chart("{title}.png").validate().is_err());
        assert!(per_chart("chart.png").validate().is_err());
        assert!(per_chart("{name}.jpg").validate().is_err());
        let doc = OutputMode::Document {
            path: PathBuf::from("report.png"),
        };
        assert!(doc.validate().is_err());
    }

    fn key(variant: &str) -> SeriesKey {
        SeriesKey::new(&[("implementation", variant)])
    }

    fn spec() -> ChartSpec {
        let styles = ["two_copy", "one_copy"]
            .into_iter()
            .fold(StyleTable::new(), |t, v| {
                t.with(
                    key(v),
                    SeriesStyle::new(v, Rgb::BLACK, Marker::Circle, LinePattern::Solid),
                )
            });
        ChartSpec::builder(ChartKind::Line, "latency_us")
            .series([key("two_copy"), key("one_copy")])
            .build(&styles)
            .unwrap()
    }

    fn table() -> Table {
        let schema = Schema::new(vec![
            Field::categorical("implementation"),
            Field::numeric("threads"),
            Field::numeric("latency_us"),
        ]);
        let row = MeasurementRow::new(vec![
            Value::Text("two_copy".into()),
            Value::Number(1.0),
            Value::Number(8.26),
        ]);
        Table::new("by-thread-count", schema, vec![row]).unwrap()
    }

    #[test]
    fn panel_drops_empty_series() {
        let selector = SeriesSelector::new(&["implementation"], "threads", "latency_us");
        let panel = Panel::from_table(spec(), &table(), &selector).unwrap();
        assert_eq!(panel.series.len(), 1);
        assert_eq!(panel.spec.series.len(), 1);
        assert_eq!(panel.spec.series[0].0, key("two_copy"));
    }

    #[test]
    fn panel_rejects_undeclared_series() {
        let stray = Series::new(key("zero_copy"), vec![(1.0, 1.0)]);
        let err = Panel::new(spec(), vec![stray]).unwrap_err();
        assert!(matches!(err, ReportError::StyleLookup(_)));
    }

    #[test]
    fn grid_must_fit() {
        let selector = SeriesSelector::new(&["implementation"], "threads", "latency_us");
        let panel = Panel::from_table(spec(), &table(), &selector).unwrap();
        let too_many = vec![panel.clone(), panel.clone(), panel.clone()];
        assert!(Page::grid("p", (800, 600), (1, 2), too_many).is_err());
        let page = Page::grid("p", (800, 600), (1, 2), vec![panel]).unwrap();
        assert_eq!(page.grid, (1, 2));
        assert!(matches!(
            Page::grid("p", (800, 600), (1, 2), vec![]),
            Err(ReportError::EmptySeries(_))
        ));
    }
}
