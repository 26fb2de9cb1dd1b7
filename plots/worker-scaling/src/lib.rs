use std::fmt::Write;

use common::{
    KB_PER_MB,
    chart::{
        Axis, ChartKind, ChartSpec, LegendPosition, LinePattern, Marker, ReferenceLine, Rgb,
        SeriesStyle, StyleTable,
    },
    config::Settings,
    error::ReportError,
    report::{OutputMode, Page, Panel, Report},
    series::{Series, SeriesKey, SeriesSelector},
    source::{CsvSource, DataSource},
    table::{Dataset, Field, Schema, Table},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const TABLE: &str = "measurements";

const PROGRAMS: [&str; 2] = ["a", "b"];
const FUNCTIONS: [&str; 3] = ["cpu", "mem", "io"];

const WORKERS_LABEL: &str = "Number of Workers";

/// Worker count sweep of process (`a`) and thread (`b`) based programs
/// running cpu, mem and io workloads, written as one multi-page PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerScaling {
    /// Measurement file, relative to the input directory
    pub input: String,
    /// Document, relative to the output directory
    pub output: String,
    /// Worker counts of the thread program kept in the comparison page
    pub thread_workers: Vec<u32>,
    pub delimiter: Option<char>,
}

impl Default for WorkerScaling {
    fn default() -> Self {
        Self {
            input: "measurements.csv".to_owned(),
            output: "worker_scaling.pdf".to_owned(),
            thread_workers: vec![2, 3, 4, 5],
            delimiter: None,
        }
    }
}

pub fn schema() -> Schema {
    Schema::new(vec![
        Field::categorical("program").alias("Program"),
        Field::categorical("function").alias("Function"),
        Field::numeric("workers").alias("Workers"),
        Field::numeric("cpu_percent").alias("CPU%"),
        Field::numeric("memory_kb").alias("Memory(KB)"),
        Field::numeric("io_kbps").alias("IO(KB/s)"),
        Field::numeric("time_seconds").alias("Time(s)"),
    ])
}

/// Links the crate so its report type is registered for deserialization
pub fn init() {
    debug!("worker-scaling report registered");
}

fn key(program: &str, function: &str) -> SeriesKey {
    SeriesKey::new(&[("program", program), ("function", function)])
}

fn color(function: &str) -> Rgb {
    match function {
        "cpu" => Rgb(0xFF, 0x6B, 0x6B),
        "mem" => Rgb(0x4E, 0xCD, 0xC4),
        _ => Rgb(0x45, 0xB7, 0xD1),
    }
}

fn encoding(program: &str) -> (Marker, LinePattern) {
    match program {
        "a" => (Marker::Circle, LinePattern::Solid),
        _ => (Marker::Square, LinePattern::Dashed),
    }
}

/// "Program A - CPU" for every program and function
fn program_styles() -> StyleTable {
    let mut styles = StyleTable::new();
    for (program, function) in PROGRAMS.into_iter().cartesian_product(FUNCTIONS) {
        let (marker, line) = encoding(program);
        let label = format!(
            "Program {} - {}",
            program.to_uppercase(),
            function.to_uppercase()
        );
        styles.insert(
            key(program, function),
            SeriesStyle::new(&label, color(function), marker, line),
        );
    }
    styles
}

/// "CPU (Processes)" and "CPU (Threads)" for the comparison page
fn comparison_styles() -> StyleTable {
    let mut styles = StyleTable::new();
    for (program, function) in PROGRAMS.into_iter().cartesian_product(FUNCTIONS) {
        let (marker, line) = encoding(program);
        let kind = if program == "a" { "Processes" } else { "Threads" };
        let label = format!("{} ({kind})", function.to_uppercase());
        styles.insert(
            key(program, function),
            SeriesStyle::new(&label, color(function), marker, line),
        );
    }
    styles
}

fn speedup_styles() -> StyleTable {
    StyleTable::new()
        .with(
            SeriesKey::new(&[("program", "a")]),
            SeriesStyle::new(
                "Program A",
                Rgb(0x1F, 0x77, 0xB4),
                Marker::Circle,
                LinePattern::Solid,
            ),
        )
        .with(
            SeriesKey::new(&[("program", "b")]),
            SeriesStyle::new(
                "Program B",
                Rgb(0xFF, 0x7F, 0x0E),
                Marker::Square,
                LinePattern::Dashed,
            ),
        )
}

fn all_keys() -> impl Iterator<Item = SeriesKey> {
    PROGRAMS
        .into_iter()
        .cartesian_product(FUNCTIONS)
        .map(|(program, function)| key(program, function))
}

/// Memory is recorded in KB and drawn in MB
fn in_mb(mut panel: Panel, metric: &str) -> Panel {
    if metric == "memory_kb" {
        panel.series = panel
            .series
            .into_iter()
            .map(|s| s.scaled(1.0 / KB_PER_MB))
            .collect();
    }
    panel
}

impl WorkerScaling {
    fn source(&self, settings: &Settings) -> Result<CsvSource, ReportError> {
        let source = CsvSource::new(TABLE, settings.input(&self.input), schema());
        match self.delimiter {
            None => Ok(source),
            Some(c) if c.is_ascii() => Ok(source.delimiter(c as u8)),
            Some(c) => Err(ReportError::Config(format!(
                "delimiter {c:?} is not a single byte character"
            ))),
        }
    }

    fn metric_page(
        &self,
        table: &Table,
        settings: &Settings,
        name: &str,
        metric: &str,
        title: &str,
        y_label: &str,
    ) -> Result<Page, ReportError> {
        let spec = ChartSpec::builder(ChartKind::Line, metric)
            .title(title)
            .x_axis(Axis::new(WORKERS_LABEL))
            .y_axis(Axis::new(y_label))
            .series(all_keys())
            .build(&program_styles())?;
        let selector = SeriesSelector::new(&["program", "function"], "workers", metric);
        let panel = in_mb(Panel::from_table(spec, table, &selector)?, metric);
        Ok(Page::single(name, settings.page_size(), panel).title(settings.system_info.as_deref()))
    }

    fn comparison_page(&self, table: &Table, settings: &Settings) -> Result<Page, ReportError> {
        let styles = comparison_styles();
        let thread_workers = &self.thread_workers;
        let metrics = [
            ("cpu_percent", "CPU Utilization (%)"),
            ("memory_kb", "Memory Usage (MB)"),
            ("time_seconds", "Execution Time (s)"),
            ("io_kbps", "I/O Throughput (KB/s)"),
        ];

        let mut panels = Vec::with_capacity(metrics.len());
        for (metric, y_label) in metrics {
            let spec = ChartSpec::builder(ChartKind::Line, metric)
                .x_axis(Axis::new(WORKERS_LABEL))
                .y_axis(Axis::new(y_label))
                .series(FUNCTIONS.into_iter().flat_map(|f| PROGRAMS.map(|p| key(p, f))))
                .build(&styles)?;
            let selector = SeriesSelector::new(&["program", "function"], "workers", metric)
                .filter(|row| {
                    row.text("program") != Some("b")
                        || row
                            .number("workers")
                            .is_some_and(|w| thread_workers.iter().any(|&t| f64::from(t) == w))
                });
            match Panel::from_table(spec, table, &selector) {
                Ok(panel) => panels.push(in_mb(panel, metric)),
                Err(err @ ReportError::EmptySeries(_)) => warn!("{err}, chart skipped"),
                Err(err) => return Err(err),
            }
        }

        let (w, h) = settings.page_size();
        Ok(
            Page::grid("processes_vs_threads", (w, h * 5 / 4), (2, 2), panels)?
                .title(Some("Processes vs Threads Comparison by Worker Type")),
        )
    }

    fn speedup_page(&self, table: &Table, settings: &Settings) -> Result<Page, ReportError> {
        let styles = speedup_styles();
        let Some((w_min, w_max)) = table.range("workers")? else {
            return Err(ReportError::EmptySeries(format!("{TABLE} has no rows")));
        };
        let ideal = ReferenceLine {
            label: "Ideal Linear Speedup".to_owned(),
            points: vec![(w_min, 1.0), (w_max, w_max / w_min)],
            color: Rgb::BLACK,
            line: LinePattern::Dotted,
        };

        let mut panels = Vec::with_capacity(FUNCTIONS.len());
        for function in FUNCTIONS {
            let selector = SeriesSelector::new(&["program"], "workers", "time_seconds")
                .filter(move |row| row.text("function") == Some(function));
            let mut series = Vec::with_capacity(PROGRAMS.len());
            for program in PROGRAMS {
                let key = SeriesKey::new(&[("program", program)]);
                match selector
                    .select_one(table, &key)
                    .and_then(|s| s.speedup())
                {
                    Ok(s) => series.push(s),
                    Err(err @ ReportError::EmptySeries(_)) => warn!("{err}, series skipped"),
                    Err(err) => return Err(err),
                }
            }
            if series.is_empty() {
                warn!("no speedup for {function} workers, chart skipped");
                continue;
            }

            let spec = ChartSpec::builder(ChartKind::Line, "speedup")
                .title(&format!("{} Worker", function.to_uppercase()))
                .x_axis(Axis::new(WORKERS_LABEL))
                .y_axis(Axis::new("Speedup"))
                .series(series.iter().map(|s: &Series| s.key().clone()))
                .reference_line(ideal.clone())
                .legend(LegendPosition::UpperLeft)
                .build(&styles)?;
            panels.push(Panel::new(spec, series)?);
        }

        let (w, h) = settings.page_size();
        Ok(
            Page::grid("speedup", (w * 3 / 2, h * 3 / 4), (1, 3), panels)?
                .title(Some("Scalability Analysis: Execution Time Speedup")),
        )
    }
}

#[typetag::serde]
impl Report for WorkerScaling {
    fn name(&self) -> &str {
        "worker-scaling"
    }

    fn load(&self, settings: &Settings) -> Result<Dataset, ReportError> {
        let table = self.source(settings)?.load()?;
        info!("{}: {} measurements", self.name(), table.len());
        Ok(Dataset::from(table))
    }

    fn pages(&self, data: &Dataset, settings: &Settings) -> Vec<Result<Page, ReportError>> {
        let table = match data.table(TABLE) {
            Ok(table) => table,
            Err(err) => return vec![Err(err)],
        };
        let metrics = [
            (
                "cpu",
                "cpu_percent",
                "CPU% vs Number of Workers",
                "CPU Utilization (%)",
            ),
            (
                "memory",
                "memory_kb",
                "Memory Usage vs Number of Workers",
                "Peak Memory Usage (MB)",
            ),
            (
                "time",
                "time_seconds",
                "Execution Time vs Number of Workers",
                "Execution Time (seconds)",
            ),
            (
                "io",
                "io_kbps",
                "I/O Usage vs Number of Workers",
                "I/O Throughput (KB/s)",
            ),
        ];

        let mut pages = metrics
            .into_iter()
            .map(|(name, metric, title, y_label)| {
                self.metric_page(table, settings, name, metric, title, y_label)
            })
            .collect::<Vec<_>>();
        pages.push(self.comparison_page(table, settings));
        pages.push(self.speedup_page(table, settings));
        pages
    }

    fn output(&self, settings: &Settings) -> Result<OutputMode, ReportError> {
        Ok(OutputMode::Document {
            path: settings.output(&self.output),
        })
    }

    fn summarize(&self, data: &Dataset) -> Result<Option<String>, ReportError> {
        let table = data.table(TABLE)?;
        let rule = "=".repeat(70);
        let mut out = String::new();
        // Writing into a String cannot fail
        _ = writeln!(out, "{rule}\nSummary Statistics\n{rule}");

        for program in PROGRAMS {
            let heading = if program == "a" {
                "Process-based (A)"
            } else {
                "Thread-based (B)"
            };
            _ = writeln!(out, "\n{heading}:\n{}", "-".repeat(70));

            for function in FUNCTIONS {
                let rows = table
                    .rows()
                    .iter()
                    .map(|row| table.view(row))
                    .filter(|v| v.text("program") == Some(program) && v.text("function") == Some(function))
                    .collect::<Vec<_>>();
                if rows.is_empty() {
                    continue;
                }
                let column = |field: &str| rows.iter().filter_map(|v| v.number(field)).collect::<Vec<_>>();
                let Some((lo, hi)) = column("workers")
                    .into_iter()
                    .minmax_by(|a, b| a.total_cmp(b))
                    .into_option() else {
                    continue;
                };

                _ = writeln!(out, "\n  {} Worker:", function.to_uppercase());
                _ = writeln!(out, "    Workers range:  {lo} - {hi}");
                _ = writeln!(out, "    Avg CPU%:       {:.2}%", mean(&column("cpu_percent")));
                _ = writeln!(
                    out,
                    "    Avg Memory:     {:.2} MB",
                    mean(&column("memory_kb")) / KB_PER_MB
                );
                _ = writeln!(out, "    Avg Time:       {:.2} seconds", mean(&column("time_seconds")));
                _ = writeln!(out, "    Avg I/O:        {:.2} KB/s", mean(&column("io_kbps")));
            }
        }
        _ = write!(out, "\n{rule}");
        Ok(Some(out))
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use plot_common::{ReportWriter, render_page};

    use super::*;

    const CSV: &str = "\
Program,Function,Workers,CPU%,Memory(KB),IO(KB/s),Time(s)
a,cpu,2,95.0,2048,10.0,10.0
a,cpu,4,180.0,4096,12.0,5.0
a,mem,2,60.0,8192,5.0,12.0
a,mem,4,90.0,16384,6.0,8.0
a,io,2,20.0,1024,400.0,20.0
a,io,4,25.0,1024,700.0,16.0
b,cpu,2,98.0,1536,9.0,9.0
b,cpu,4,190.0,1536,11.0,4.5
b,cpu,6,250.0,1536,11.0,3.5
b,mem,2,70.0,7168,4.0,11.0
b,mem,4,95.0,7168,5.0,7.0
b,io,2,22.0,1024,380.0,19.0
b,io,4,30.0,1024,650.0,15.0
";

    fn settings(dir: &Path) -> Settings {
        Settings {
            input_dir: dir.to_owned(),
            output_dir: dir.to_owned(),
            font_paths: Vec::new(),
            ..Settings::default()
        }
    }

    fn loaded(csv: &str) -> (tempfile::TempDir, Settings, Result<Dataset, ReportError>) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("measurements.csv"), csv).unwrap();
        let settings = settings(dir.path());
        let data = WorkerScaling::default().load(&settings);
        (dir, settings, data)
    }

    #[test]
    fn builds_six_pages_in_order() {
        let (_dir, settings, data) = loaded(CSV);
        let pages = WorkerScaling::default().pages(&data.unwrap(), &settings);
        let names = pages
            .iter()
            .map(|p| p.as_ref().unwrap().name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            ["cpu", "memory", "time", "io", "processes_vs_threads", "speedup"]
        );
    }

    #[test]
    fn memory_is_drawn_in_megabytes() {
        let (_dir, settings, data) = loaded(CSV);
        let pages = WorkerScaling::default().pages(&data.unwrap(), &settings);
        let memory = pages[1].as_ref().unwrap();
        let mem_a = memory.panels[0]
            .series
            .iter()
            .find(|s| *s.key() == key("a", "mem"))
            .unwrap();
        assert_eq!(mem_a.points(), &[(2.0, 8.0), (4.0, 16.0)]);
    }

    #[test]
    fn comparison_keeps_only_listed_thread_workers() {
        let (_dir, settings, data) = loaded(CSV);
        let pages = WorkerScaling::default().pages(&data.unwrap(), &settings);
        let comparison = pages[4].as_ref().unwrap();
        assert_eq!(comparison.panels.len(), 4);
        let cpu_b = comparison.panels[0]
            .series
            .iter()
            .find(|s| *s.key() == key("b", "cpu"))
            .unwrap();
        assert_eq!(
            cpu_b.points().iter().map(|p| p.0).collect::<Vec<_>>(),
            vec![2.0, 4.0]
        );
        let (_, style) = &comparison.panels[0].spec.series[1];
        assert_eq!(style.label, "CPU (Threads)");
    }

    #[test]
    fn speedup_starts_at_one_with_ideal_line() {
        let (_dir, settings, data) = loaded(CSV);
        let pages = WorkerScaling::default().pages(&data.unwrap(), &settings);
        let speedup = pages[5].as_ref().unwrap();
        assert_eq!(speedup.panels.len(), 3);
        let cpu = &speedup.panels[0];
        assert_eq!(cpu.spec.title.as_deref(), Some("CPU Worker"));
        assert_eq!(cpu.series[0].points(), &[(2.0, 1.0), (4.0, 2.0)]);
        assert_eq!(cpu.series[1].points()[0], (2.0, 1.0));
        assert_eq!(
            cpu.spec.reference_lines[0].points,
            vec![(2.0, 1.0), (6.0, 3.0)]
        );
    }

    #[test]
    fn ideal_line_starts_at_the_smallest_worker_count() {
        let csv = "\
Program,Function,Workers,CPU%,Memory(KB),IO(KB/s),Time(s)
a,cpu,1,99.0,2048,10.0,12.0
a,cpu,4,380.0,4096,12.0,4.0
a,mem,1,50.0,8192,5.0,10.0
a,mem,8,90.0,16384,6.0,5.0
a,io,1,20.0,1024,400.0,20.0
a,io,4,25.0,1024,700.0,16.0
";
        let (_dir, settings, data) = loaded(csv);
        let pages = WorkerScaling::default().pages(&data.unwrap(), &settings);
        let speedup = pages[5].as_ref().unwrap();
        for panel in &speedup.panels {
            assert_eq!(
                panel.spec.reference_lines[0].points,
                vec![(1.0, 1.0), (8.0, 8.0)]
            );
        }
        assert_eq!(speedup.panels[0].series[0].points(), &[(1.0, 1.0), (4.0, 3.0)]);
    }

    #[test]
    fn missing_function_rows_drop_only_those_series() {
        let csv = CSV
            .lines()
            .filter(|l| !l.starts_with("b,io"))
            .collect::<Vec<_>>()
            .join("\n");
        let (_dir, settings, data) = loaded(&csv);
        let pages = WorkerScaling::default().pages(&data.unwrap(), &settings);
        let io = pages[3].as_ref().unwrap();
        assert_eq!(io.panels[0].series.len(), 5);
        assert!(io.panels[0].spec.keys().all(|k| *k != key("b", "io")));
        let speedup = pages[5].as_ref().unwrap();
        assert_eq!(speedup.panels[2].series.len(), 1);
    }

    #[test]
    fn missing_time_column_is_a_schema_error() {
        let csv = CSV
            .lines()
            .map(|l| l.rsplit_once(',').unwrap().0)
            .collect::<Vec<_>>()
            .join("\n");
        let (_dir, _settings, data) = loaded(&csv);
        let err = data.unwrap_err();
        assert!(matches!(err, ReportError::Schema { .. }), "{err}");
        assert!(err.to_string().contains("time_seconds"));
    }

    #[test]
    fn missing_input_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkerScaling::default()
            .load(&settings(dir.path()))
            .unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }

    #[test]
    fn summary_lists_each_workload() {
        let (_dir, _settings, data) = loaded(CSV);
        let summary = WorkerScaling::default()
            .summarize(&data.unwrap())
            .unwrap()
            .unwrap();
        assert!(summary.contains("Process-based (A):"));
        assert!(summary.contains("Thread-based (B):"));
        assert!(summary.contains("    Workers range:  2 - 6"));
        assert!(summary.contains("    Avg CPU%:       137.50%"));
        assert!(summary.contains("    Avg Memory:     1.00 MB"));
    }

    #[test]
    fn writes_a_six_page_document() {
        let (dir, settings, data) = loaded(CSV);
        let report = WorkerScaling::default();
        let figures = report
            .pages(&data.unwrap(), &settings)
            .into_iter()
            .map(|page| page.and_then(|p| render_page(&p)))
            .collect();
        let mode = report.output(&settings).unwrap();
        let summary = ReportWriter::new().write(figures, &mode).unwrap();
        assert!(summary.skipped.is_empty());
        let bytes = fs::read(dir.path().join("worker_scaling.pdf")).unwrap();
        let count = |needle: &[u8]| bytes.windows(needle.len()).filter(|w| *w == needle).count();
        assert_eq!(count(b"/Type /Page") - count(b"/Type /Pages"), 6);
    }

    #[test]
    fn deserializes_from_yaml() {
        let report: Box<dyn Report> = serde_yml::from_str(
            "type: WorkerScaling\ninput: data.csv\nthread_workers: [1, 2]\n",
        )
        .unwrap();
        assert_eq!(report.name(), "worker-scaling");
        let bad = serde_yml::from_str::<Box<dyn Report>>("type: WorkerScaling\ncolumns: 3\n");
        assert!(bad.is_err());
    }
}
