use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref, Str};

use crate::scene::{HAnchor, Paint, Primitive, Rotation, Scene, VAnchor, text_width};

/// Points per pixel; a 1200x800 page becomes 900x600 pt
const PT_PER_PX: f32 = 0.75;
// Control point distance for a quarter circle drawn as a cubic bezier
const KAPPA: f32 = 0.552_284_8;

const FONT_NAME: Name<'static> = Name(b"F1");

/// Encodes the scenes as the pages of one PDF document, in order
pub fn encode<'s>(scenes: impl IntoIterator<Item = &'s Scene>) -> Vec<u8> {
    let scenes = scenes.into_iter().collect::<Vec<_>>();
    let mut pdf = Pdf::new();

    let catalog = Ref::new(1);
    let page_tree = Ref::new(2);
    let font = Ref::new(3);
    let mut next = 4;
    let mut alloc = || {
        let id = Ref::new(next);
        next += 1;
        id
    };
    let ids = scenes
        .iter()
        .map(|_| (alloc(), alloc()))
        .collect::<Vec<(Ref, Ref)>>();

    pdf.catalog(catalog).pages(page_tree);
    pdf.pages(page_tree)
        .kids(ids.iter().map(|(page, _)| *page))
        .count(ids.len() as i32);
    pdf.type1_font(font)
        .base_font(Name(b"Helvetica"))
        .encoding_predefined(Name(b"WinAnsiEncoding"));

    for (scene, (page_id, content_id)) in scenes.iter().zip(&ids) {
        let (w, h) = scene.size();
        let mut page = pdf.page(*page_id);
        page.media_box(Rect::new(
            0.0,
            0.0,
            w as f32 * PT_PER_PX,
            h as f32 * PT_PER_PX,
        ));
        page.parent(page_tree);
        page.contents(*content_id);
        page.resources().fonts().pair(FONT_NAME, font);
        page.finish();

        let data = PageCanvas::new(h).draw(scene);
        pdf.stream(*content_id, &data);
    }
    pdf.finish()
}

struct PageCanvas {
    height: f32,
    content: Content,
}

impl PageCanvas {
    fn new(height: u32) -> Self {
        Self {
            height: height as f32,
            content: Content::new(),
        }
    }

    fn point(&self, (x, y): (i32, i32)) -> (f32, f32) {
        (x as f32 * PT_PER_PX, (self.height - y as f32) * PT_PER_PX)
    }

    fn fill(&mut self, paint: &Paint) {
        let (r, g, b) = paint.over_white();
        self.content
            .set_fill_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    }

    fn stroke(&mut self, paint: &Paint, width: u32) {
        let (r, g, b) = paint.over_white();
        self.content
            .set_stroke_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
            .set_line_width(width.max(1) as f32 * PT_PER_PX);
    }

    fn polyline(&mut self, points: &[(i32, i32)]) -> bool {
        let Some((&first, rest)) = points.split_first() else {
            return false;
        };
        let (x, y) = self.point(first);
        self.content.move_to(x, y);
        for &p in rest {
            let (x, y) = self.point(p);
            self.content.line_to(x, y);
        }
        true
    }

    fn circle(&mut self, center: (i32, i32), radius: u32) {
        let (cx, cy) = self.point(center);
        let r = radius as f32 * PT_PER_PX;
        let k = r * KAPPA;
        self.content
            .move_to(cx + r, cy)
            .cubic_to(cx + r, cy + k, cx + k, cy + r, cx, cy + r)
            .cubic_to(cx - k, cy + r, cx - r, cy + k, cx - r, cy)
            .cubic_to(cx - r, cy - k, cx - k, cy - r, cx, cy - r)
            .cubic_to(cx + k, cy - r, cx + r, cy - k, cx + r, cy)
            .close_path();
    }

    fn text(
        &mut self,
        text: &str,
        at: (i32, i32),
        size: f64,
        paint: &Paint,
        rotation: Rotation,
        anchor: (HAnchor, VAnchor),
    ) {
        let ((ax, ay), (dx, dy)) = rotation.axes();
        let width = text_width(text, size);
        let along = match anchor.0 {
            HAnchor::Left => 0.0,
            HAnchor::Center => -width / 2.0,
            HAnchor::Right => -width,
        };
        let down = match anchor.1 {
            VAnchor::Top => 0.8 * size,
            VAnchor::Center => 0.35 * size,
            VAnchor::Bottom => -0.2 * size,
        };
        let x = at.0 as f64 + along * ax + down * dx;
        let y = at.1 as f64 + along * ay + down * dy;
        let e = x as f32 * PT_PER_PX;
        let f = (self.height - y as f32) * PT_PER_PX;

        self.fill(paint);
        self.content
            .begin_text()
            .set_font(FONT_NAME, size as f32 * PT_PER_PX)
            .set_text_matrix([ax as f32, -ay as f32, -dx as f32, dy as f32, e, f])
            .show(Str(&win_ansi(text)))
            .end_text();
    }

    fn draw(mut self, scene: &Scene) -> Vec<u8> {
        for primitive in scene.primitives() {
            match primitive {
                Primitive::Pixel { at, paint } if paint.is_visible() => {
                    let (x, y) = self.point(*at);
                    self.fill(paint);
                    self.content
                        .rect(x, y - PT_PER_PX, PT_PER_PX, PT_PER_PX)
                        .fill_nonzero();
                }
                Primitive::Line {
                    from,
                    to,
                    paint,
                    width,
                } if paint.is_visible() => {
                    self.stroke(paint, *width);
                    self.polyline(&[*from, *to]);
                    self.content.stroke();
                }
                Primitive::Rect {
                    upper_left,
                    bottom_right,
                    paint,
                    width,
                    fill,
                } if paint.is_visible() => {
                    let (x0, y0) = self.point(*upper_left);
                    let (x1, y1) = self.point(*bottom_right);
                    if *fill {
                        // pixel rectangles include their bottom-right corner
                        self.fill(paint);
                        self.content
                            .rect(x0, y1 - PT_PER_PX, x1 - x0 + PT_PER_PX, y0 - y1 + PT_PER_PX)
                            .fill_nonzero();
                    } else {
                        self.stroke(paint, *width);
                        self.content.rect(x0, y1, x1 - x0, y0 - y1).stroke();
                    }
                }
                Primitive::Path {
                    points,
                    paint,
                    width,
                } if paint.is_visible() => {
                    self.stroke(paint, *width);
                    if self.polyline(points) {
                        self.content.stroke();
                    }
                }
                Primitive::Circle {
                    center,
                    radius,
                    paint,
                    width,
                    fill,
                } if paint.is_visible() => {
                    if *fill {
                        self.fill(paint);
                        self.circle(*center, *radius);
                        self.content.fill_nonzero();
                    } else {
                        self.stroke(paint, *width);
                        self.circle(*center, *radius);
                        self.content.stroke();
                    }
                }
                Primitive::Polygon { points, paint } if paint.is_visible() => {
                    self.fill(paint);
                    if self.polyline(points) {
                        self.content.close_path().fill_nonzero();
                    }
                }
                Primitive::Text {
                    text,
                    at,
                    size,
                    paint,
                    rotation,
                    anchor,
                } if paint.is_visible() && !text.is_empty() => {
                    self.text(text, *at, *size, paint, *rotation, *anchor);
                }
                _ => {}
            }
        }
        self.content.finish()
    }
}

/// Helvetica in the standard encoding covers Latin-1; anything else becomes `?`
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2212}' | '\u{2013}' => b'-',
            ' '..='~' | '\u{a0}'..='\u{ff}' => c as u8,
            _ => b'?',
        })
        .collect()
}
