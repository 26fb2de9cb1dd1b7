use std::convert::Infallible;

use plotters_backend::{
    BackendColor, BackendCoord, BackendStyle, BackendTextStyle, DrawingBackend, DrawingErrorKind,
    FontTransform, text_anchor,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    pub rgb: (u8, u8, u8),
    pub alpha: f64,
}

impl Paint {
    pub fn is_visible(&self) -> bool {
        self.alpha > 0.0
    }

    /// Colour blended over a white page, for outputs without transparency
    pub fn over_white(&self) -> (u8, u8, u8) {
        let a = self.alpha.clamp(0.0, 1.0);
        let blend = |c: u8| (c as f64 * a + 255.0 * (1.0 - a)).round() as u8;
        (blend(self.rgb.0), blend(self.rgb.1), blend(self.rgb.2))
    }

    fn backend(&self) -> BackendColor {
        BackendColor {
            alpha: self.alpha,
            rgb: self.rgb,
        }
    }
}

impl From<BackendColor> for Paint {
    fn from(color: BackendColor) -> Self {
        Self {
            rgb: color.rgb,
            alpha: color.alpha,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    /// Unit vectors of the text advance and of "down" in pixel space
    pub fn axes(&self) -> ((f64, f64), (f64, f64)) {
        match self {
            Rotation::None => ((1.0, 0.0), (0.0, 1.0)),
            Rotation::Rotate90 => ((0.0, 1.0), (-1.0, 0.0)),
            Rotation::Rotate180 => ((-1.0, 0.0), (0.0, -1.0)),
            Rotation::Rotate270 => ((0.0, -1.0), (1.0, 0.0)),
        }
    }

    fn transform(&self) -> FontTransform {
        match self {
            Rotation::None => FontTransform::None,
            Rotation::Rotate90 => FontTransform::Rotate90,
            Rotation::Rotate180 => FontTransform::Rotate180,
            Rotation::Rotate270 => FontTransform::Rotate270,
        }
    }
}

impl From<FontTransform> for Rotation {
    fn from(transform: FontTransform) -> Self {
        match transform {
            FontTransform::Rotate90 => Rotation::Rotate90,
            FontTransform::Rotate180 => Rotation::Rotate180,
            FontTransform::Rotate270 => Rotation::Rotate270,
            _ => Rotation::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAnchor {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAnchor {
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Pixel {
        at: BackendCoord,
        paint: Paint,
    },
    Line {
        from: BackendCoord,
        to: BackendCoord,
        paint: Paint,
        width: u32,
    },
    Rect {
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        paint: Paint,
        width: u32,
        fill: bool,
    },
    Path {
        points: Vec<BackendCoord>,
        paint: Paint,
        width: u32,
    },
    Circle {
        center: BackendCoord,
        radius: u32,
        paint: Paint,
        width: u32,
        fill: bool,
    },
    Polygon {
        points: Vec<BackendCoord>,
        paint: Paint,
    },
    Text {
        text: String,
        at: BackendCoord,
        size: f64,
        paint: Paint,
        rotation: Rotation,
        anchor: (HAnchor, VAnchor),
    },
}

/// Drawing primitives of one page, in paint order
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    size: (u32, u32),
    primitives: Vec<Primitive>,
}

impl Scene {
    pub fn new(size: (u32, u32)) -> Self {
        Self {
            size,
            primitives: Vec::new(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.primitives.iter().filter_map(|p| match p {
            Primitive::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    fn push(&mut self, primitive: Primitive) {
        self.primitives.push(primitive);
    }
}

// Helvetica advance widths for ' '..='~' in 1/1000 em
const ADVANCE: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667,
    611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500,
    222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Approximate rendered width of `text` in pixels
pub fn text_width(text: &str, size: f64) -> f64 {
    let units: u32 = text
        .chars()
        .map(|c| match c {
            ' '..='~' => ADVANCE[c as usize - 32] as u32,
            _ => 556,
        })
        .sum();
    units as f64 * size / 1000.0
}

/// Plotters backend that records primitives instead of rasterizing them.
///
/// Text is measured with fixed Helvetica metrics, so recording never needs a
/// font file and the same input always yields the same scene.
pub struct SceneBackend<'a> {
    scene: &'a mut Scene,
}

impl<'a> SceneBackend<'a> {
    pub fn new(scene: &'a mut Scene) -> Self {
        Self { scene }
    }
}

type DrawResult = Result<(), DrawingErrorKind<Infallible>>;

impl DrawingBackend for SceneBackend<'_> {
    type ErrorType = Infallible;

    fn get_size(&self) -> (u32, u32) {
        self.scene.size
    }

    fn ensure_prepared(&mut self) -> DrawResult {
        Ok(())
    }

    fn present(&mut self) -> DrawResult {
        Ok(())
    }

    fn draw_pixel(&mut self, point: BackendCoord, color: BackendColor) -> DrawResult {
        self.scene.push(Primitive::Pixel {
            at: point,
            paint: color.into(),
        });
        Ok(())
    }

    fn draw_line<S: BackendStyle>(
        &mut self,
        from: BackendCoord,
        to: BackendCoord,
        style: &S,
    ) -> DrawResult {
        self.scene.push(Primitive::Line {
            from,
            to,
            paint: style.color().into(),
            width: style.stroke_width(),
        });
        Ok(())
    }

    fn draw_rect<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
        fill: bool,
    ) -> DrawResult {
        self.scene.push(Primitive::Rect {
            upper_left,
            bottom_right,
            paint: style.color().into(),
            width: style.stroke_width(),
            fill,
        });
        Ok(())
    }

    fn draw_path<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        path: I,
        style: &S,
    ) -> DrawResult {
        self.scene.push(Primitive::Path {
            points: path.into_iter().collect(),
            paint: style.color().into(),
            width: style.stroke_width(),
        });
        Ok(())
    }

    fn draw_circle<S: BackendStyle>(
        &mut self,
        center: BackendCoord,
        radius: u32,
        style: &S,
        fill: bool,
    ) -> DrawResult {
        self.scene.push(Primitive::Circle {
            center,
            radius,
            paint: style.color().into(),
            width: style.stroke_width(),
            fill,
        });
        Ok(())
    }

    fn fill_polygon<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        vert: I,
        style: &S,
    ) -> DrawResult {
        self.scene.push(Primitive::Polygon {
            points: vert.into_iter().collect(),
            paint: style.color().into(),
        });
        Ok(())
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> DrawResult {
        let anchor = style.anchor();
        let h = match anchor.h_pos {
            text_anchor::HPos::Left => HAnchor::Left,
            text_anchor::HPos::Center => HAnchor::Center,
            text_anchor::HPos::Right => HAnchor::Right,
        };
        let v = match anchor.v_pos {
            text_anchor::VPos::Top => VAnchor::Top,
            text_anchor::VPos::Center => VAnchor::Center,
            text_anchor::VPos::Bottom => VAnchor::Bottom,
        };
        self.scene.push(Primitive::Text {
            text: text.to_owned(),
            at: pos,
            size: style.size(),
            paint: style.color().into(),
            rotation: style.transform().into(),
            anchor: (h, v),
        });
        Ok(())
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Infallible>> {
        let size = style.size();
        Ok((text_width(text, size).ceil() as u32, size.ceil() as u32))
    }

    fn blit_bitmap(
        &mut self,
        _pos: BackendCoord,
        _size: (u32, u32),
        _src: &[u8],
    ) -> DrawResult {
        Ok(())
    }
}

struct Stroke {
    paint: Paint,
    width: u32,
}

impl BackendStyle for Stroke {
    fn color(&self) -> BackendColor {
        self.paint.backend()
    }

    fn stroke_width(&self) -> u32 {
        self.width
    }
}

fn stroke(paint: &Paint, width: u32) -> Stroke {
    Stroke {
        paint: *paint,
        width,
    }
}

/// Draws a recorded scene onto another backend, e.g. a bitmap or SVG file.
/// Text is skipped when `with_text` is false.
pub fn replay<DB: DrawingBackend>(
    scene: &Scene,
    backend: &mut DB,
    with_text: bool,
) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
    use plotters::style::{IntoFont, RGBAColor, TextStyle};

    backend.ensure_prepared()?;
    for primitive in &scene.primitives {
        match primitive {
            Primitive::Pixel { at, paint } => backend.draw_pixel(*at, paint.backend())?,
            Primitive::Line {
                from,
                to,
                paint,
                width,
            } => backend.draw_line(*from, *to, &stroke(paint, *width))?,
            Primitive::Rect {
                upper_left,
                bottom_right,
                paint,
                width,
                fill,
            } => backend.draw_rect(*upper_left, *bottom_right, &stroke(paint, *width), *fill)?,
            Primitive::Path {
                points,
                paint,
                width,
            } => backend.draw_path(points.iter().copied(), &stroke(paint, *width))?,
            Primitive::Circle {
                center,
                radius,
                paint,
                width,
                fill,
            } => backend.draw_circle(*center, *radius, &stroke(paint, *width), *fill)?,
            Primitive::Polygon { points, paint } => {
                backend.fill_polygon(points.iter().copied(), &stroke(paint, 1))?
            }
            Primitive::Text {
                text,
                at,
                size,
                paint,
                rotation,
                anchor,
            } => {
                if !with_text {
                    continue;
                }
                let color = RGBAColor(paint.rgb.0, paint.rgb.1, paint.rgb.2, paint.alpha);
                let h = match anchor.0 {
                    HAnchor::Left => text_anchor::HPos::Left,
                    HAnchor::Center => text_anchor::HPos::Center,
                    HAnchor::Right => text_anchor::HPos::Right,
                };
                let v = match anchor.1 {
                    VAnchor::Top => text_anchor::VPos::Top,
                    VAnchor::Center => text_anchor::VPos::Center,
                    VAnchor::Bottom => text_anchor::VPos::Bottom,
                };
                let font = ("sans-serif", *size)
                    .into_font()
                    .transform(rotation.transform());
                let style = TextStyle::from(font)
                    .color(&color)
                    .pos(text_anchor::Pos::new(h, v));
                backend.draw_text(text, &style, *at)?;
            }
        }
    }
    backend.present()
}
