pub mod fonts;
pub mod pdf;
pub mod render;
pub mod scene;
pub mod writer;

pub use render::{ChartGeometry, Figure, render, render_page};
pub use writer::{ReportWriter, WriteSummary};
