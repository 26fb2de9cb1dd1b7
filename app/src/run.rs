use common::{
    config::Config,
    report::{OutputMode, Page, Report},
    table::Dataset,
};
use eyre::{Context, Result};
use plot_common::{ReportWriter, fonts, render_page};
use tracing::{info, warn};

struct Plan<'c> {
    report: &'c dyn Report,
    data: Dataset,
    pages: Vec<Page>,
    mode: OutputMode,
}

/// Loads every report, then builds every page, then renders and writes.
/// Fatal errors in the first two stages leave no output behind.
pub fn run(config: &Config) -> Result<()> {
    let settings = &config.settings;
    info!("Running {} ({} reports)", config.name, config.reports.len());

    let mut loaded = Vec::with_capacity(config.reports.len());
    for report in &config.reports {
        let data = report
            .load(settings)
            .wrap_err_with(|| format!("loading {}", report.name()))?;
        loaded.push((&**report, data));
    }

    let mut plans = Vec::with_capacity(loaded.len());
    for (report, data) in loaded {
        let mut pages = Vec::new();
        for (index, page) in report.pages(&data, settings).into_iter().enumerate() {
            match page {
                Ok(page) => pages.push(page),
                Err(err) if !err.is_fatal() => {
                    warn!("{}: page {} skipped: {err}", report.name(), index + 1)
                }
                Err(err) => {
                    return Err(err).wrap_err_with(|| format!("building {}", report.name()));
                }
            }
        }
        let mode = report
            .output(settings)
            .and_then(|mode| mode.validate().map(|()| mode))
            .wrap_err_with(|| format!("output of {}", report.name()))?;
        plans.push(Plan {
            report,
            data,
            pages,
            mode,
        });
    }

    if let Some(font) = fonts::register(&settings.font_paths) {
        info!("Bitmap text uses {}", font.display());
    }
    let writer = ReportWriter::new();
    for plan in plans {
        if let Some(summary) = plan.report.summarize(&plan.data)? {
            println!("{summary}");
        }
        let figures = plan.pages.iter().map(render_page).collect();
        let summary = writer
            .write(figures, &plan.mode)
            .wrap_err_with(|| format!("writing {}", plan.report.name()))?;
        for path in &summary.written {
            println!("Wrote {}", path.display());
        }
        if !summary.skipped.is_empty() {
            warn!(
                "{}: {} charts not written",
                plan.report.name(),
                summary.skipped.len()
            );
        }
    }
    Ok(())
}
