use std::{
    fmt::Debug,
    fs::File,
    io,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, Trim};
use tracing::{debug, info};

use crate::{
    error::ReportError,
    table::{FieldKind, MeasurementRow, Schema, Table, Value},
};

pub trait DataSource: Debug {
    /// Name of the table this source produces
    fn name(&self) -> &str;
    /// Loads and validates the table against the source's schema
    fn load(&self) -> Result<Table, ReportError>;
}

/// Delimited text file whose first row is the header
#[derive(Debug, Clone)]
pub struct CsvSource {
    name: String,
    path: PathBuf,
    schema: Schema,
    delimiter: u8,
}

impl CsvSource {
    pub fn new(name: &str, path: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            name: name.to_owned(),
            path: path.into(),
            schema,
            delimiter: b',',
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File, ReportError> {
        File::open(&self.path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ReportError::NotFound(self.path.clone()),
            _ => ReportError::Io(err),
        })
    }

    fn parse_error(&self, line: u64, field: &str, value: &str) -> ReportError {
        ReportError::Parse {
            source_name: self.path.display().to_string(),
            line,
            field: field.to_owned(),
            value: value.to_owned(),
        }
    }
}

impl DataSource for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Table, ReportError> {
        let file = self.open()?;
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(file);

        let source_name = self.path.display().to_string();
        let headers = reader
            .headers()
            .map_err(|e| ReportError::schema(&source_name, format!("unreadable header: {e}")))?
            .clone();

        let mut columns = Vec::with_capacity(self.schema.len());
        let mut missing = Vec::new();
        for field in self.schema.fields() {
            match headers.iter().position(|h| field.matches(h)) {
                Some(idx) => columns.push(idx),
                None => missing.push(field.name.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(ReportError::schema(
                &source_name,
                format!("missing required fields: {}", missing.join(", ")),
            ));
        }
        debug!("{source_name}: field columns {columns:?}");

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                self.parse_error(line, "<record>", &e.to_string())
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            // skip blank trailing lines
            if record.iter().all(str::is_empty) {
                continue;
            }

            let mut values = Vec::with_capacity(columns.len());
            for (field, &col) in self.schema.fields().iter().zip(&columns) {
                let raw = record.get(col).ok_or_else(|| {
                    ReportError::schema(
                        &source_name,
                        format!("line {line}: field `{}` is missing", field.name),
                    )
                })?;
                let value = match field.kind {
                    FieldKind::Categorical => Value::Text(raw.to_owned()),
                    FieldKind::Numeric => match raw.parse::<f64>() {
                        Ok(n) if n.is_finite() => Value::Number(n),
                        _ => return Err(self.parse_error(line, &field.name, raw)),
                    },
                };
                values.push(value);
            }
            rows.push(MeasurementRow::new(values));
        }

        info!("Loaded {} rows from {source_name}", rows.len());
        Table::new(&self.name, self.schema.clone(), rows)
    }
}

/// Column-oriented data embedded in the program, one block per variant
#[derive(Debug, Clone)]
pub struct LiteralSource {
    name: String,
    schema: Schema,
    variant_field: String,
    shared: Vec<(String, Vec<f64>)>,
    variants: Vec<(String, Vec<(String, Vec<f64>)>)>,
}

impl LiteralSource {
    /// `variant_field` is the categorical field that receives each variant's name
    pub fn new(name: &str, schema: Schema, variant_field: &str) -> Self {
        Self {
            name: name.to_owned(),
            schema,
            variant_field: variant_field.to_owned(),
            shared: Vec::new(),
            variants: Vec::new(),
        }
    }

    /// A column used by every variant that does not define it itself
    pub fn shared(mut self, field: &str, values: &[f64]) -> Self {
        self.shared.push((field.to_owned(), values.to_vec()));
        self
    }

    /// Starts a new variant; following [`LiteralSource::column`] calls belong to it
    pub fn variant(mut self, name: &str) -> Self {
        self.variants.push((name.to_owned(), Vec::new()));
        self
    }

    /// Adds a column to the current variant, or a shared one before any variant
    pub fn column(mut self, field: &str, values: &[f64]) -> Self {
        let column = (field.to_owned(), values.to_vec());
        match self.variants.last_mut() {
            Some((_, columns)) => columns.push(column),
            None => self.shared.push(column),
        }
        self
    }

    fn lookup<'a>(&'a self, own: &'a [(String, Vec<f64>)], field: &str) -> Option<&'a [f64]> {
        own.iter()
            .chain(&self.shared)
            .find(|(name, _)| name == field)
            .map(|(_, values)| values.as_slice())
    }
}

impl DataSource for LiteralSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Table, ReportError> {
        if self.schema.index_of(&self.variant_field).is_none() {
            return Err(ReportError::schema(
                &self.name,
                format!("variant field `{}` is not in the schema", self.variant_field),
            ));
        }

        let mut rows = Vec::new();
        for (variant, own) in &self.variants {
            let mut columns = Vec::with_capacity(self.schema.len());
            for field in self.schema.fields() {
                if field.name == self.variant_field {
                    columns.push(None);
                    continue;
                }
                let values = self.lookup(own, &field.name).ok_or_else(|| {
                    ReportError::schema(
                        &self.name,
                        format!("variant `{variant}` is missing field `{}`", field.name),
                    )
                })?;
                columns.push(Some(values));
            }

            let lengths = columns.iter().flatten().map(|c| c.len());
            let len = lengths.clone().next().unwrap_or(0);
            if lengths.into_iter().any(|l| l != len) {
                return Err(ReportError::schema(
                    &self.name,
                    format!("variant `{variant}` has columns of different lengths"),
                ));
            }

            for i in 0..len {
                let values = columns
                    .iter()
                    .map(|column| match column {
                        Some(values) => Value::Number(values[i]),
                        None => Value::Text(variant.clone()),
                    })
                    .collect();
                rows.push(MeasurementRow::new(values));
            }
        }

        Table::new(&self.name, self.schema.clone(), rows)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::table::Field;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::categorical("program").alias("Program"),
            Field::numeric("workers").alias("Workers"),
            Field::numeric("time_seconds").alias("Time(s)"),
        ])
    }

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_with_aliases_and_ignores_extra_columns() {
        let file = csv_file("Program,Workers,CPU%,Time(s)\na,2,50.0,10.0\na, 4 ,70.0,6.0\n");
        let table = CsvSource::new("m", file.path(), schema()).load().unwrap();
        assert_eq!(table.len(), 2);
        let view = table.view(&table.rows()[1]);
        assert_eq!(view.number("workers"), Some(4.0));
        assert_eq!(view.number("time_seconds"), Some(6.0));
        assert_eq!(view.text("program"), Some("a"));
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let file = csv_file("Program,Workers,CPU%\na,2,50.0\n");
        let err = CsvSource::new("m", file.path(), schema()).load().unwrap_err();
        match err {
            ReportError::Schema { reason, .. } => assert!(reason.contains("time_seconds")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn short_row_is_a_schema_error() {
        let file = csv_file("Program,Workers,Time(s)\na,2\n");
        let err = CsvSource::new("m", file.path(), schema()).load().unwrap_err();
        assert!(matches!(err, ReportError::Schema { .. }));
    }

    #[test]
    fn malformed_number_is_a_parse_error() {
        let file = csv_file("Program,Workers,Time(s)\na,2,10.0\na,four,6.0\n");
        let err = CsvSource::new("m", file.path(), schema()).load().unwrap_err();
        match err {
            ReportError::Parse {
                line, field, value, ..
            } => {
                assert_eq!(line, 3);
                assert_eq!(field, "workers");
                assert_eq!(value, "four");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        let err = CsvSource::new("m", &path, schema()).load().unwrap_err();
        assert!(matches!(err, ReportError::NotFound(p) if p == path));
    }

    #[test]
    fn custom_delimiter() {
        let file = csv_file("program;workers;time_seconds\nb;3;7.5\n");
        let table = CsvSource::new("m", file.path(), schema())
            .delimiter(b';')
            .load()
            .unwrap();
        assert_eq!(table.view(&table.rows()[0]).number("time_seconds"), Some(7.5));
    }

    fn literal_schema() -> Schema {
        Schema::new(vec![
            Field::categorical("implementation"),
            Field::numeric("msg_size"),
            Field::numeric("throughput_gbps"),
        ])
    }

    #[test]
    fn literal_variants_share_columns() {
        let table = LiteralSource::new("by-size", literal_schema(), "implementation")
            .shared("msg_size", &[1024.0, 4096.0])
            .variant("two_copy")
            .column("throughput_gbps", &[9.3, 14.4])
            .variant("one_copy")
            .column("throughput_gbps", &[7.0, 13.6])
            .load()
            .unwrap();
        assert_eq!(table.len(), 4);
        let last = table.view(&table.rows()[3]);
        assert_eq!(last.text("implementation"), Some("one_copy"));
        assert_eq!(last.number("msg_size"), Some(4096.0));
        assert_eq!(last.number("throughput_gbps"), Some(13.6));
    }

    #[test]
    fn literal_missing_field_or_ragged_columns_fail() {
        let missing = LiteralSource::new("by-size", literal_schema(), "implementation")
            .variant("two_copy")
            .column("throughput_gbps", &[9.3])
            .load();
        assert!(matches!(missing, Err(ReportError::Schema { .. })));

        let ragged = LiteralSource::new("by-size", literal_schema(), "implementation")
            .column("msg_size", &[1024.0, 4096.0])
            .variant("two_copy")
            .column("throughput_gbps", &[9.3])
            .load();
        assert!(matches!(ragged, Err(ReportError::Schema { .. })));
    }
}
