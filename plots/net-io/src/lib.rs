use common::{
    chart::{
        Axis, ChartKind, ChartSpec, ChartSpecBuilder, LegendPosition, LinePattern, Marker, Rgb,
        Scale, SeriesStyle, StyleTable, TickFormat,
    },
    config::Settings,
    error::ReportError,
    report::{OutputMode, Page, Panel, Report},
    series::{SeriesKey, SeriesSelector},
    source::{DataSource, LiteralSource},
    table::{Dataset, Field, Schema, Table},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const BY_MESSAGE_SIZE: &str = "by-message-size";
pub const BY_THREAD_COUNT: &str = "by-thread-count";

const IMPLEMENTATIONS: [&str; 3] = ["two_copy", "one_copy", "zero_copy"];

/// Socket copy strategies compared on message size and thread count. The
/// measurements are part of the report; each chart becomes its own image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetIo {
    /// Directory of the images, relative to the output directory
    pub dir: String,
    /// File name pattern with `{name}` and/or `{index}`
    pub pattern: String,
    /// Printed above every chart, overrides the global setting
    pub system_info: Option<String>,
}

impl Default for NetIo {
    fn default() -> Self {
        Self {
            dir: ".".to_owned(),
            pattern: "net_io_{name}.png".to_owned(),
            system_info: None,
        }
    }
}

/// Links the crate so its report type is registered for deserialization
pub fn init() {
    debug!("net-io report registered");
}

fn key(implementation: &str) -> SeriesKey {
    SeriesKey::new(&[("implementation", implementation)])
}

fn styles() -> StyleTable {
    StyleTable::new()
        .with(
            key("two_copy"),
            SeriesStyle::new(
                "Two-Copy (send/recv)",
                Rgb(0xE7, 0x4C, 0x3C),
                Marker::Circle,
                LinePattern::Solid,
            ),
        )
        .with(
            key("one_copy"),
            SeriesStyle::new(
                "One-Copy (sendmsg+iovec)",
                Rgb(0x2E, 0xCC, 0x71),
                Marker::Square,
                LinePattern::Solid,
            ),
        )
        .with(
            key("zero_copy"),
            SeriesStyle::new(
                "Zero-Copy (MSG_ZEROCOPY)",
                Rgb(0x34, 0x98, 0xDB),
                Marker::Triangle,
                LinePattern::Solid,
            ),
        )
}

/// Measured with 4 threads
pub fn by_message_size() -> LiteralSource {
    let schema = Schema::new(vec![
        Field::categorical("implementation"),
        Field::numeric("msg_size"),
        Field::numeric("throughput_gbps"),
        Field::numeric("l1_misses"),
        Field::numeric("context_switches"),
        Field::numeric("cycles_per_byte"),
    ]);
    LiteralSource::new(BY_MESSAGE_SIZE, schema, "implementation")
        .shared("msg_size", &[1024.0, 4096.0, 65536.0, 1048576.0])
        .variant("two_copy")
        .column("throughput_gbps", &[9.3742, 14.4076, 38.9824, 44.0402])
        .column(
            "l1_misses",
            &[3963320820.0, 3375278746.0, 2943379236.0, 3123572797.0],
        )
        .column("context_switches", &[1895182.0, 2509493.0, 774042.0, 853238.0])
        .column("cycles_per_byte", &[11.99, 6.52, 2.06, 1.95])
        .variant("one_copy")
        .column("throughput_gbps", &[7.0840, 13.6835, 42.9614, 48.4065])
        .column(
            "l1_misses",
            &[3237920369.0, 3187780795.0, 3218773154.0, 3461652149.0],
        )
        .column("context_switches", &[1627504.0, 3328111.0, 889593.0, 931450.0])
        .column("cycles_per_byte", &[14.30, 5.96, 1.87, 1.84])
        .variant("zero_copy")
        .column("throughput_gbps", &[4.6127, 10.2657, 30.1563, 35.3253])
        .column(
            "l1_misses",
            &[2993598361.0, 3140791657.0, 3077558012.0, 3131315716.0],
        )
        .column("context_switches", &[3209825.0, 3075449.0, 1678570.0, 714696.0])
        .column("cycles_per_byte", &[17.98, 7.99, 2.96, 2.60])
}

/// Measured with 4096 byte messages
pub fn by_thread_count() -> LiteralSource {
    let schema = Schema::new(vec![
        Field::categorical("implementation"),
        Field::numeric("threads"),
        Field::numeric("latency_us"),
    ]);
    LiteralSource::new(BY_THREAD_COUNT, schema, "implementation")
        .shared("threads", &[1.0, 2.0, 4.0, 8.0])
        .variant("two_copy")
        .column("latency_us", &[8.26, 9.10, 9.04, 6.98])
        .variant("one_copy")
        .column("latency_us", &[9.57, 9.29, 9.53, 8.64])
        .variant("zero_copy")
        .column("latency_us", &[12.25, 12.25, 12.71, 16.45])
}

fn message_size_axis() -> Axis {
    Axis::new("Message Size").format(TickFormat::Bytes)
}

impl NetIo {
    fn title<'a>(&'a self, settings: &'a Settings) -> Option<&'a str> {
        self.system_info
            .as_deref()
            .or(settings.system_info.as_deref())
    }

    fn panel(
        &self,
        table: &Table,
        kind: ChartKind,
        x: &str,
        metric: &str,
        build: impl FnOnce(ChartSpecBuilder) -> ChartSpecBuilder,
    ) -> Result<Panel, ReportError> {
        let builder = ChartSpec::builder(kind, metric).series(IMPLEMENTATIONS.map(key));
        let spec = build(builder).build(&styles())?;
        let selector = SeriesSelector::new(&["implementation"], x, metric);
        Panel::from_table(spec, table, &selector)
    }

    fn throughput(&self, data: &Dataset, settings: &Settings) -> Result<Page, ReportError> {
        let panel = self.panel(
            data.table(BY_MESSAGE_SIZE)?,
            ChartKind::GroupedBar,
            "msg_size",
            "throughput_gbps",
            |b| {
                b.title("Throughput vs Message Size")
                    .x_axis(message_size_axis())
                    .y_axis(Axis::new("Throughput (Gbps)").from_zero())
                    .legend(LegendPosition::UpperLeft)
            },
        )?;
        Ok(Page::single("throughput_vs_msg_size", settings.page_size(), panel)
            .title(self.title(settings)))
    }

    fn latency(&self, data: &Dataset, settings: &Settings) -> Result<Page, ReportError> {
        let panel = self.panel(
            data.table(BY_THREAD_COUNT)?,
            ChartKind::Line,
            "threads",
            "latency_us",
            |b| {
                b.title("Latency vs Thread Count")
                    .x_axis(Axis::new("Thread Count"))
                    .y_axis(Axis::new("Average Latency (µs)").from_zero())
                    .legend(LegendPosition::LowerRight)
            },
        )?;
        Ok(Page::single("latency_vs_threads", settings.page_size(), panel)
            .title(self.title(settings)))
    }

    fn cache_misses(&self, data: &Dataset, settings: &Settings) -> Result<Page, ReportError> {
        let table = data.table(BY_MESSAGE_SIZE)?;
        let charts = [
            (
                "l1_misses",
                "L1 Cache Misses vs Message Size",
                "L1 Data Cache Misses",
            ),
            (
                "context_switches",
                "Context Switches vs Message Size",
                "Context Switches",
            ),
        ];
        let mut panels = Vec::with_capacity(charts.len());
        for (metric, title, y_label) in charts {
            let panel = self.panel(table, ChartKind::GroupedBar, "msg_size", metric, |b| {
                b.title(title)
                    .x_axis(message_size_axis())
                    .y_axis(Axis::new(y_label).format(TickFormat::Si))
                    .legend(LegendPosition::LowerRight)
            });
            match panel {
                Ok(panel) => panels.push(panel),
                Err(err @ ReportError::EmptySeries(_)) => warn!("{err}, chart skipped"),
                Err(err) => return Err(err),
            }
        }
        let (w, h) = settings.page_size();
        Ok(
            Page::grid("cache_misses_vs_msg_size", (w * 3 / 2, h), (1, 2), panels)?
                .title(self.title(settings)),
        )
    }

    fn cycles_per_byte(&self, data: &Dataset, settings: &Settings) -> Result<Page, ReportError> {
        let panel = self.panel(
            data.table(BY_MESSAGE_SIZE)?,
            ChartKind::Line,
            "msg_size",
            "cycles_per_byte",
            |b| {
                b.title("CPU Cycles per Byte vs Message Size")
                    .x_axis(
                        Axis::new("Message Size (bytes)")
                            .scale(Scale::Log2)
                            .format(TickFormat::Bytes),
                    )
                    .y_axis(Axis::new("CPU Cycles per Byte").from_zero())
            },
        )?;
        Ok(
            Page::single("cycles_per_byte_vs_msg_size", settings.page_size(), panel)
                .title(self.title(settings)),
        )
    }
}

#[typetag::serde]
impl Report for NetIo {
    fn name(&self) -> &str {
        "net-io"
    }

    fn load(&self, _settings: &Settings) -> Result<Dataset, ReportError> {
        let mut data = Dataset::new();
        for source in [by_message_size(), by_thread_count()] {
            let table = source.load()?;
            info!("{}: {} rows in {}", self.name(), table.len(), source.name());
            data.insert(table);
        }
        Ok(data)
    }

    fn pages(&self, data: &Dataset, settings: &Settings) -> Vec<Result<Page, ReportError>> {
        vec![
            self.throughput(data, settings),
            self.latency(data, settings),
            self.cache_misses(data, settings),
            self.cycles_per_byte(data, settings),
        ]
    }

    fn output(&self, settings: &Settings) -> Result<OutputMode, ReportError> {
        Ok(OutputMode::PerChart {
            dir: settings.output(&self.dir),
            pattern: self.pattern.clone(),
        })
    }
}
