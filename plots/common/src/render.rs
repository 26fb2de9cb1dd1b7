use std::fmt::Debug;

use common::{
    chart::{Axis, ChartKind, ChartSpec, LegendPosition, LinePattern, Marker, Rgb, Scale},
    error::ReportError,
    report::{Page, Panel},
    series::{Series, SeriesKey},
};
use plotters::{
    coord::{Shift, cartesian::Cartesian2d, types::RangedCoordf64},
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};
use tracing::debug;

use crate::scene::{Scene, SceneBackend, text_width};

/// Share of a category's width covered by its bars
pub const BAR_GROUP_WIDTH: f64 = 0.8;

const DASH: (f64, f64) = (8.0, 5.0);
const DOT: (f64, f64) = (2.0, 4.0);
const MARKER_SIZE: i32 = 4;

/// A rendered page: the recorded scene plus the layout of every chart on it
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub name: String,
    pub size: (u32, u32),
    pub scene: Scene,
    pub charts: Vec<ChartGeometry>,
}

/// One line trace in plotting space (log axes already applied)
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub key: SeriesKey,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub key: SeriesKey,
    pub category: usize,
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
}

impl Bar {
    /// True when the interiors intersect; touching edges do not count
    pub fn overlaps(&self, other: &Bar) -> bool {
        const EPS: f64 = 1e-9;
        self.x0 < other.x1 - EPS
            && other.x0 < self.x1 - EPS
            && self.y0 < other.y1 - EPS
            && other.y0 < self.y1 - EPS
    }
}

/// Data-space layout of one chart, computed before anything is drawn
#[derive(Debug, Clone, PartialEq)]
pub struct ChartGeometry {
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    /// Sorted distinct x values, bar charts only
    pub categories: Vec<f64>,
    pub traces: Vec<Trace>,
    pub references: Vec<Vec<(f64, f64)>>,
    pub bars: Vec<Bar>,
}

fn render_error<E: Debug>(err: E) -> ReportError {
    ReportError::Render(format!("{err:?}"))
}

fn project(axis: &Axis, v: f64, what: &str) -> Result<f64, ReportError> {
    axis.scale.forward(v).ok_or_else(|| {
        ReportError::Render(format!(
            "{what}: value {v} cannot be shown on the logarithmic axis `{}`",
            axis.label
        ))
    })
}

fn padded((lo, hi): (f64, f64), fraction: f64) -> (f64, f64) {
    let span = hi - lo;
    if span.abs() < 1e-12 {
        let pad = if lo.abs() > 0.0 { lo.abs() * 0.1 } else { 1.0 };
        (lo - pad, hi + pad)
    } else {
        (lo - span * fraction, hi + span * fraction)
    }
}

fn extent<'p>(points: impl Iterator<Item = &'p (f64, f64)>) -> Option<((f64, f64), (f64, f64))> {
    points.fold(None, |acc, &(x, y)| match acc {
        None => Some(((x, x), (y, y))),
        Some(((x0, x1), (y0, y1))) => Some(((x0.min(x), x1.max(x)), (y0.min(y), y1.max(y)))),
    })
}

/// Positions every trace, reference line and bar of a chart in data space.
pub fn layout(spec: &ChartSpec, series: &[Series]) -> Result<ChartGeometry, ReportError> {
    let ordered = spec
        .series
        .iter()
        .filter_map(|(key, _)| series.iter().find(|s| s.key() == key))
        .collect::<Vec<_>>();
    if ordered.is_empty() {
        return Err(ReportError::EmptySeries(format!(
            "chart {:?} has no series to draw",
            spec.metric
        )));
    }
    match spec.kind {
        ChartKind::Line => line_layout(spec, &ordered),
        ChartKind::GroupedBar => bar_layout(&ordered),
    }
}

fn line_layout(spec: &ChartSpec, series: &[&Series]) -> Result<ChartGeometry, ReportError> {
    let mut traces = Vec::with_capacity(series.len());
    for s in series {
        let what = format!("{} of {}", spec.metric, s.key());
        let points = s
            .points()
            .iter()
            .map(|&(x, y)| -> Result<(f64, f64), ReportError> {
                Ok((project(&spec.x_axis, x, &what)?, project(&spec.y_axis, y, &what)?))
            })
            .collect::<Result<Vec<_>, ReportError>>()?;
        traces.push(Trace {
            key: s.key().clone(),
            points,
        });
    }
    let mut references = Vec::with_capacity(spec.reference_lines.len());
    for line in &spec.reference_lines {
        let points = line
            .points
            .iter()
            .map(|&(x, y)| -> Result<(f64, f64), ReportError> {
                Ok((
                    project(&spec.x_axis, x, &line.label)?,
                    project(&spec.y_axis, y, &line.label)?,
                ))
            })
            .collect::<Result<Vec<_>, ReportError>>()?;
        references.push(points);
    }

    let all = traces
        .iter()
        .flat_map(|t| &t.points)
        .chain(references.iter().flatten());
    let Some((x_extent, (y_min, y_max))) = extent(all) else {
        return Err(ReportError::EmptySeries(format!(
            "chart {:?} has no points to draw",
            spec.metric
        )));
    };
    let x_range = padded(x_extent, 0.05);
    let from_zero = spec.y_axis.from_zero && !spec.y_axis.scale.is_log();
    let (mut y_lo, y_hi) = padded((if from_zero { y_min.min(0.0) } else { y_min }, y_max), 0.08);
    if from_zero && y_min >= 0.0 {
        y_lo = 0.0;
    }

    Ok(ChartGeometry {
        x_range,
        y_range: (y_lo, y_hi),
        categories: Vec::new(),
        traces,
        references,
        bars: Vec::new(),
    })
}

fn bar_layout(series: &[&Series]) -> Result<ChartGeometry, ReportError> {
    let mut categories = series
        .iter()
        .flat_map(|s| s.points().iter().map(|p| p.0))
        .collect::<Vec<_>>();
    categories.sort_by(f64::total_cmp);
    categories.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

    let n = series.len() as f64;
    let width = BAR_GROUP_WIDTH / n;
    let mut bars = Vec::new();
    for (j, s) in series.iter().enumerate() {
        let offset = (j as f64 - (n - 1.0) / 2.0) * width;
        for &(x, y) in s.points() {
            let Some(category) = categories.iter().position(|c| (c - x).abs() < 1e-9) else {
                continue;
            };
            let centre = category as f64 + offset;
            bars.push(Bar {
                key: s.key().clone(),
                category,
                x0: centre - width / 2.0,
                x1: centre + width / 2.0,
                y0: y.min(0.0),
                y1: y.max(0.0),
            });
        }
    }

    let lo = bars.iter().map(|b| b.y0).fold(0.0, f64::min);
    let hi = bars.iter().map(|b| b.y1).fold(0.0, f64::max);
    let pad = if hi - lo > 0.0 { (hi - lo) * 0.1 } else { 1.0 };
    let y_range = (if lo < 0.0 { lo - pad } else { 0.0 }, hi + pad);

    Ok(ChartGeometry {
        x_range: (-0.5, categories.len() as f64 - 0.5),
        y_range,
        categories,
        traces: Vec::new(),
        references: Vec::new(),
        bars,
    })
}

/// Splits a polyline into dash segments of `on` pixels separated by `off`
/// pixels. `scale` is pixels per data unit on each axis; the pattern carries
/// over from one segment to the next.
pub fn dash_segments(
    points: &[(f64, f64)],
    scale: (f64, f64),
    (on, off): (f64, f64),
) -> Vec<[(f64, f64); 2]> {
    let period = on + off;
    let mut dashes = Vec::new();
    let mut phase = 0.0;
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let len = (((b.0 - a.0) * scale.0).powi(2) + ((b.1 - a.1) * scale.1).powi(2)).sqrt();
        if !len.is_finite() || period <= 0.0 {
            dashes.push([a, b]);
            continue;
        }
        let at = |d: f64| (a.0 + (b.0 - a.0) * d / len, a.1 + (b.1 - a.1) * d / len);
        let mut d = 0.0;
        while d < len {
            let within = phase % period;
            let end = if within < on {
                let end = (d + on - within).min(len);
                dashes.push([at(d), at(end)]);
                end
            } else {
                (d + period - within).min(len)
            };
            phase += end - d;
            d = end;
        }
    }
    dashes
}

fn tick_label(axis: &Axis, categories: &[f64], v: f64) -> String {
    let nearest = v.round();
    let on_integer = (v - nearest).abs() < 1e-6;
    if !categories.is_empty() {
        return match (on_integer, nearest as isize) {
            (true, i) if i >= 0 && (i as usize) < categories.len() => {
                axis.format.format(categories[i as usize])
            }
            _ => String::new(),
        };
    }
    match axis.scale {
        Scale::Linear => axis.format.format(v),
        _ if on_integer => axis.format.format(axis.scale.inverse(nearest)),
        _ => String::new(),
    }
}

fn rgb(color: Rgb) -> RGBColor {
    RGBColor(color.0, color.1, color.2)
}

type Area<'b> = DrawingArea<SceneBackend<'b>, Shift>;
type Chart<'a, 'b> = ChartContext<'a, SceneBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

const LEGEND_FONT: f64 = 13.0;
const LEGEND_ROW: i32 = 20;
const LEGEND_PAD: i32 = 8;
const LEGEND_SAMPLE: i32 = 28;
const LEGEND_MARGIN: i32 = 10;

/// One legend row; `line` is `None` for bar swatches
struct LegendEntry<'s> {
    label: &'s str,
    color: RGBColor,
    line: Option<LinePattern>,
    marker: Marker,
}

/// Pixel box of the legend inside a plotting area of `dim` pixels.
/// Text is measured with the built-in width table, so no font is needed.
fn legend_box(entries: &[LegendEntry<'_>], position: LegendPosition, dim: (u32, u32)) -> Option<(i32, i32, i32, i32)> {
    if entries.is_empty() {
        return None;
    }
    let text = entries
        .iter()
        .map(|e| text_width(e.label, LEGEND_FONT))
        .fold(0.0, f64::max)
        .ceil() as i32;
    let w = 2 * LEGEND_PAD + LEGEND_SAMPLE + LEGEND_PAD + text;
    let h = 2 * LEGEND_PAD + LEGEND_ROW * entries.len() as i32;
    let (dw, dh) = (dim.0 as i32, dim.1 as i32);
    let (x, y) = match position {
        LegendPosition::Hidden => return None,
        LegendPosition::UpperLeft => (LEGEND_MARGIN, LEGEND_MARGIN),
        LegendPosition::UpperRight => (dw - w - LEGEND_MARGIN, LEGEND_MARGIN),
        LegendPosition::LowerLeft => (LEGEND_MARGIN, dh - h - LEGEND_MARGIN),
        LegendPosition::LowerRight => (dw - w - LEGEND_MARGIN, dh - h - LEGEND_MARGIN),
    };
    Some((x.max(0), y.max(0), w, h))
}

fn draw_marker_at(area: &Area<'_>, at: (i32, i32), marker: Marker, style: ShapeStyle) -> Result<(), ReportError> {
    let fill = style.color.filled();
    let (x, y) = at;
    match marker {
        Marker::None => Ok(()),
        Marker::Circle => area.draw(&Circle::new(at, MARKER_SIZE, fill)),
        Marker::Square => area.draw(&Rectangle::new(
            [(x - MARKER_SIZE, y - MARKER_SIZE), (x + MARKER_SIZE, y + MARKER_SIZE)],
            fill,
        )),
        Marker::Triangle => area.draw(&TriangleMarker::new(at, MARKER_SIZE + 1, fill)),
        Marker::Cross => area.draw(&Cross::new(at, MARKER_SIZE, style)),
    }
    .map_err(render_error)
}

fn draw_legend(area: &Area<'_>, entries: &[LegendEntry<'_>], position: LegendPosition) -> Result<(), ReportError> {
    let Some((x, y, w, h)) = legend_box(entries, position, area.dim_in_pixel()) else {
        return Ok(());
    };
    area.draw(&Rectangle::new([(x, y), (x + w, y + h)], WHITE.mix(0.85).filled()))
        .map_err(render_error)?;
    area.draw(&Rectangle::new([(x, y), (x + w, y + h)], BLACK.mix(0.4).stroke_width(1)))
        .map_err(render_error)?;

    let font = TextStyle::from(("sans-serif", LEGEND_FONT).into_font())
        .pos(Pos::new(HPos::Left, VPos::Center));
    for (row, entry) in entries.iter().enumerate() {
        let cy = y + LEGEND_PAD + LEGEND_ROW * row as i32 + LEGEND_ROW / 2;
        let sx = x + LEGEND_PAD;
        let style = entry.color.stroke_width(2);
        match entry.line {
            None => area
                .draw(&Rectangle::new(
                    [(sx + 7, cy - 5), (sx + 21, cy + 5)],
                    entry.color.filled(),
                ))
                .map_err(render_error)?,
            Some(pattern) => {
                let sample = [(sx as f64, cy as f64), ((sx + LEGEND_SAMPLE) as f64, cy as f64)];
                let segments = match pattern {
                    LinePattern::Solid => vec![sample],
                    LinePattern::Dashed => dash_segments(&sample, (1.0, 1.0), DASH),
                    LinePattern::Dotted => dash_segments(&sample, (1.0, 1.0), DOT),
                };
                for [a, b] in segments {
                    let points = vec![
                        (a.0.round() as i32, a.1.round() as i32),
                        (b.0.round() as i32, b.1.round() as i32),
                    ];
                    area.draw(&PathElement::new(points, style))
                        .map_err(render_error)?;
                }
                draw_marker_at(area, (sx + LEGEND_SAMPLE / 2, cy), entry.marker, style)?;
            }
        }
        area.draw(&Text::new(
            entry.label.to_owned(),
            (sx + LEGEND_SAMPLE + LEGEND_PAD, cy),
            font.clone(),
        ))
        .map_err(render_error)?;
    }
    Ok(())
}

/// Draws one polyline solid or as dashes
fn draw_polyline<'a, 'b: 'a>(
    chart: &mut Chart<'a, 'b>,
    points: &[(f64, f64)],
    pattern: LinePattern,
    style: ShapeStyle,
    scale: (f64, f64),
) -> Result<(), ReportError> {
    match pattern {
        LinePattern::Solid => chart.draw_series(LineSeries::new(points.iter().copied(), style)),
        LinePattern::Dashed | LinePattern::Dotted => {
            let dash = if pattern == LinePattern::Dashed { DASH } else { DOT };
            chart.draw_series(
                dash_segments(points, scale, dash)
                    .into_iter()
                    .map(|segment| PathElement::new(segment.to_vec(), style)),
            )
        }
    }
    .map_err(render_error)?;
    Ok(())
}

fn draw_markers<'a, 'b: 'a>(
    chart: &mut Chart<'a, 'b>,
    points: &[(f64, f64)],
    marker: Marker,
    style: ShapeStyle,
) -> Result<(), ReportError> {
    let fill = style.color.filled();
    let points = points.iter().copied();
    match marker {
        Marker::None => return Ok(()),
        Marker::Circle => chart
            .draw_series(points.map(|p| Circle::new(p, MARKER_SIZE, fill)))
            .map_err(render_error)?,
        Marker::Square => chart
            .draw_series(points.map(|p| {
                EmptyElement::at(p)
                    + Rectangle::new([(-MARKER_SIZE, -MARKER_SIZE), (MARKER_SIZE, MARKER_SIZE)], fill)
            }))
            .map_err(render_error)?,
        Marker::Triangle => chart
            .draw_series(points.map(|p| TriangleMarker::new(p, MARKER_SIZE + 1, fill)))
            .map_err(render_error)?,
        Marker::Cross => chart
            .draw_series(points.map(|p| Cross::new(p, MARKER_SIZE, style)))
            .map_err(render_error)?,
    };
    Ok(())
}

fn draw_chart(area: &Area<'_>, spec: &ChartSpec, geometry: &ChartGeometry) -> Result<(), ReportError> {
    let (x0, x1) = geometry.x_range;
    let (y0, y1) = geometry.y_range;

    let mut builder = ChartBuilder::on(area);
    builder.margin(12).x_label_area_size(48).y_label_area_size(76);
    if let Some(title) = &spec.title {
        builder.caption(title, ("sans-serif", 18).into_font());
    }
    let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1).map_err(render_error)?;

    let x_fmt = |v: &f64| tick_label(&spec.x_axis, &geometry.categories, *v);
    let y_fmt = |v: &f64| tick_label(&spec.y_axis, &[], *v);
    {
        let mut mesh = chart.configure_mesh();
        mesh.x_desc(spec.x_axis.label.as_str())
            .y_desc(spec.y_axis.label.as_str())
            .x_label_formatter(&x_fmt)
            .y_label_formatter(&y_fmt)
            .label_style(("sans-serif", 13).into_font())
            .axis_desc_style(("sans-serif", 15).into_font())
            .light_line_style(RGBColor(240, 240, 240))
            .bold_line_style(RGBColor(215, 215, 215));
        if spec.kind == ChartKind::GroupedBar {
            mesh.x_labels(geometry.categories.len().max(1)).disable_x_mesh();
        } else if spec.x_axis.scale.is_log() {
            let decades = (x1.floor() - x0.ceil()).max(0.0) as usize + 1;
            mesh.x_labels(decades);
        }
        mesh.draw().map_err(render_error)?;
    }

    let (px, py) = chart.plotting_area().get_pixel_range();
    let scale = (
        (px.end - px.start) as f64 / (x1 - x0),
        (py.end - py.start) as f64 / (y1 - y0),
    );

    let mut legend = Vec::with_capacity(spec.series.len() + spec.reference_lines.len());
    match spec.kind {
        ChartKind::Line => {
            for trace in &geometry.traces {
                let Some((_, style)) = spec.series.iter().find(|(k, _)| *k == trace.key) else {
                    continue;
                };
                let line = rgb(style.color).stroke_width(2);
                draw_polyline(&mut chart, &trace.points, style.line, line, scale)?;
                draw_markers(&mut chart, &trace.points, style.marker, line)?;
                legend.push(LegendEntry {
                    label: &style.label,
                    color: rgb(style.color),
                    line: Some(style.line),
                    marker: style.marker,
                });
            }
            for (reference, points) in spec.reference_lines.iter().zip(&geometry.references) {
                let line = rgb(reference.color).stroke_width(2);
                draw_polyline(&mut chart, points, reference.line, line, scale)?;
                legend.push(LegendEntry {
                    label: &reference.label,
                    color: rgb(reference.color),
                    line: Some(reference.line),
                    marker: Marker::None,
                });
            }
        }
        ChartKind::GroupedBar => {
            for (key, style) in &spec.series {
                let fill = rgb(style.color).filled();
                let bars = geometry.bars.iter().filter(|b| b.key == *key);
                chart
                    .draw_series(
                        bars.clone()
                            .map(|b| Rectangle::new([(b.x0, b.y0), (b.x1, b.y1)], fill)),
                    )
                    .map_err(render_error)?;
                chart
                    .draw_series(bars.map(|b| {
                        Rectangle::new([(b.x0, b.y0), (b.x1, b.y1)], BLACK.stroke_width(1))
                    }))
                    .map_err(render_error)?;
                legend.push(LegendEntry {
                    label: &style.label,
                    color: rgb(style.color),
                    line: None,
                    marker: Marker::None,
                });
            }
        }
    }

    draw_legend(&chart.plotting_area().strip_coord_spec(), &legend, spec.legend)
}

/// Lays out and draws every panel of a page onto a fresh scene.
pub fn render_page(page: &Page) -> Result<Figure, ReportError> {
    let charts = page
        .panels
        .iter()
        .map(|panel| layout(&panel.spec, &panel.series))
        .collect::<Result<Vec<_>, _>>()?;

    let mut scene = Scene::new(page.size);
    {
        let root = SceneBackend::new(&mut scene).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;
        let root = match &page.title {
            Some(title) => root
                .titled(title, ("sans-serif", 22).into_font())
                .map_err(render_error)?,
            None => root,
        };
        let areas = root.split_evenly(page.grid);
        for ((panel, geometry), area) in page.panels.iter().zip(&charts).zip(&areas) {
            draw_chart(area, &panel.spec, geometry)?;
        }
        root.present().map_err(render_error)?;
    }
    debug!(
        "Rendered page {} with {} charts, {} primitives",
        page.name,
        charts.len(),
        scene.primitives().len()
    );

    Ok(Figure {
        name: page.name.clone(),
        size: page.size,
        scene,
        charts,
    })
}

/// Renders a single chart as a one-panel page
pub fn render(
    name: &str,
    size: (u32, u32),
    spec: &ChartSpec,
    series: &[Series],
) -> Result<Figure, ReportError> {
    let panel = Panel::new(spec.clone(), series.to_vec())?;
    render_page(&Page::single(name, size, panel))
}
