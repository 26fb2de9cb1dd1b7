use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("NotFoundError: input file {} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("SchemaError: {source_name}: {reason}")]
    Schema { source_name: String, reason: String },
    #[error("ParseError: {source_name}:{line}: field `{field}` has malformed value {value:?}")]
    Parse {
        source_name: String,
        line: u64,
        field: String,
        value: String,
    },
    #[error("EmptySeriesError: {0}")]
    EmptySeries(String),
    #[error("StyleLookupError: no style declared for series {0}")]
    StyleLookup(String),
    #[error("RenderError: {0}")]
    Render(String),
    #[error("ConfigError: {0}")]
    Config(String),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    pub fn schema(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Fatal errors abort the run; the rest only drop the affected series or chart.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EmptySeries(_) | Self::Render(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_their_tag() {
        let err = ReportError::NotFound(PathBuf::from("measurements.csv"));
        assert_eq!(
            err.to_string(),
            "NotFoundError: input file measurements.csv does not exist"
        );
        let err = ReportError::schema("measurements", "missing field time_seconds");
        assert!(err.to_string().starts_with("SchemaError: "));
    }

    #[test]
    fn only_empty_series_and_render_failures_are_recoverable() {
        assert!(!ReportError::EmptySeries("a".into()).is_fatal());
        assert!(!ReportError::Render("b".into()).is_fatal());
        assert!(ReportError::StyleLookup("c".into()).is_fatal());
        assert!(ReportError::NotFound(PathBuf::new()).is_fatal());
    }
}
