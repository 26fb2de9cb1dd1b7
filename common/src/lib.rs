pub mod chart;
pub mod config;
pub mod error;
pub mod report;
pub mod series;
pub mod source;
pub mod table;

pub const KB_PER_MB: f64 = 1024.0;
