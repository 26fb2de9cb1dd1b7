use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use common::{
    error::ReportError,
    report::{OutputFormat, OutputMode},
};
use plotters::prelude::{BitMapBackend, SVGBackend};
use tracing::{error, info, warn};

use crate::{fonts, pdf, render::Figure, scene::replay};

/// Files written by one report, and the pages that were left out
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

/// Writes rendered figures. PNG text uses the font from
/// [`fonts::register`]; without one, PNGs are written without text.
#[derive(Debug, Default, Clone)]
pub struct ReportWriter;

impl ReportWriter {
    pub fn new() -> Self {
        Self
    }

    /// Writes every rendered page. Pages that failed to render, and per-chart
    /// files that fail to write, are logged and skipped; the rest are still
    /// written and flushed.
    pub fn write(
        &self,
        figures: Vec<Result<Figure, ReportError>>,
        mode: &OutputMode,
    ) -> Result<WriteSummary, ReportError> {
        mode.validate()?;
        let mut summary = WriteSummary::default();
        let mut ready = Vec::with_capacity(figures.len());
        for (index, figure) in figures.into_iter().enumerate() {
            match figure {
                Ok(figure) => ready.push((index, figure)),
                Err(err) => {
                    error!("Page {} not written: {err}", index + 1);
                    summary.skipped.push(err.to_string());
                }
            }
        }

        match mode {
            OutputMode::Document { path } => {
                if ready.is_empty() {
                    warn!("Nothing to write to {}", path.display());
                    return Ok(summary);
                }
                let bytes = pdf::encode(ready.iter().map(|(_, figure)| &figure.scene));
                write_file(path, &bytes)?;
                info!("Wrote {} pages to {}", ready.len(), path.display());
                summary.written.push(path.clone());
            }
            OutputMode::PerChart { .. } => {
                for (index, figure) in &ready {
                    let (path, format) = mode.file_for(&figure.name, *index)?;
                    match self.write_one(figure, &path, format) {
                        Ok(()) => {
                            info!("Wrote {}", path.display());
                            summary.written.push(path);
                        }
                        Err(err) => {
                            error!("{}: {err}", path.display());
                            summary.skipped.push(format!("{}: {err}", path.display()));
                        }
                    }
                }
            }
        }
        Ok(summary)
    }

    fn write_one(&self, figure: &Figure, path: &Path, format: OutputFormat) -> Result<(), ReportError> {
        match format {
            OutputFormat::Pdf => write_file(path, &pdf::encode([&figure.scene])),
            OutputFormat::Svg => {
                let mut svg = String::new();
                {
                    let mut backend = SVGBackend::with_string(&mut svg, figure.scene.size());
                    replay(&figure.scene, &mut backend, true)
                        .map_err(|e| ReportError::Render(format!("{e:?}")))?;
                }
                write_file(path, svg.as_bytes())
            }
            OutputFormat::Png => {
                let with_text = fonts::registered().is_some();
                if !with_text {
                    warn!("{}: no font registered, writing without text", path.display());
                }
                ensure_parent(path)?;
                let mut backend = BitMapBackend::new(path, figure.scene.size());
                replay(&figure.scene, &mut backend, with_text)
                    .map_err(|e| ReportError::Render(format!("{e:?}")))
            }
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    ensure_parent(path)?;
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(bytes)?;
    file.flush()?;
    Ok(())
}
