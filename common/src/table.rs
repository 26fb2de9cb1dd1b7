use std::{collections::BTreeMap, fmt};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Categorical,
    Numeric,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    /// Other header spellings accepted for this field
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Field {
    pub fn categorical(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: FieldKind::Categorical,
            aliases: Vec::new(),
        }
    }

    pub fn numeric(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: FieldKind::Numeric,
            aliases: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_owned());
        self
    }

    pub fn matches(&self, header: &str) -> bool {
        self.name == header || self.aliases.iter().any(|a| a == header)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Number(_) => None,
        }
    }

    fn kind(&self) -> FieldKind {
        match self {
            Value::Text(_) => FieldKind::Categorical,
            Value::Number(_) => FieldKind::Numeric,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One measurement, values stored in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    values: Vec<Value>,
}

impl MeasurementRow {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    schema: Schema,
    rows: Vec<MeasurementRow>,
}

impl Table {
    /// Builds a table, rejecting rows that do not provide every schema field
    /// with a value of the declared kind.
    pub fn new(name: &str, schema: Schema, rows: Vec<MeasurementRow>) -> Result<Self, ReportError> {
        for (idx, row) in rows.iter().enumerate() {
            if row.values.len() != schema.len() {
                return Err(ReportError::schema(
                    name,
                    format!(
                        "row {idx} has {} values, schema declares {} fields",
                        row.values.len(),
                        schema.len()
                    ),
                ));
            }
            for (field, value) in schema.fields.iter().zip(&row.values) {
                if field.kind != value.kind() {
                    return Err(ReportError::schema(
                        name,
                        format!("row {idx}: field `{}` expects {:?}", field.name, field.kind),
                    ));
                }
            }
        }
        Ok(Self {
            name: name.to_owned(),
            schema,
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[MeasurementRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, field: &str) -> Result<usize, ReportError> {
        self.schema.index_of(field).ok_or_else(|| {
            ReportError::schema(
                &self.name,
                format!(
                    "unknown field `{field}`, available: {}",
                    self.schema.fields.iter().map(|f| &f.name).join(", ")
                ),
            )
        })
    }

    /// Like [`Table::column`], but also checks that the field holds numbers
    pub fn numeric_column(&self, field: &str) -> Result<usize, ReportError> {
        let idx = self.column(field)?;
        if self.schema.fields[idx].kind != FieldKind::Numeric {
            return Err(ReportError::schema(
                &self.name,
                format!("field `{field}` is categorical, a numeric field is required"),
            ));
        }
        Ok(idx)
    }

    pub fn view<'t>(&'t self, row: &'t MeasurementRow) -> RowView<'t> {
        RowView { table: self, row }
    }

    /// Distinct values of a categorical field, in order of first appearance
    pub fn distinct(&self, field: &str) -> Result<Vec<String>, ReportError> {
        let idx = self.column(field)?;
        Ok(self
            .rows
            .iter()
            .filter_map(|r| r.values[idx].as_str())
            .unique()
            .map(str::to_owned)
            .collect())
    }

    /// `(min, max)` of a numeric field, `None` for an empty table
    pub fn range(&self, field: &str) -> Result<Option<(f64, f64)>, ReportError> {
        let idx = self.numeric_column(field)?;
        let values = self.rows.iter().filter_map(|r| r.values[idx].as_f64());
        Ok(values.minmax_by(|a, b| a.total_cmp(b)).into_option())
    }
}

/// Read access to one row by field name, handed to row filters
#[derive(Debug, Clone, Copy)]
pub struct RowView<'t> {
    table: &'t Table,
    row: &'t MeasurementRow,
}

impl<'t> RowView<'t> {
    pub fn text(&self, field: &str) -> Option<&'t str> {
        let idx = self.table.schema.index_of(field)?;
        self.row.values.get(idx)?.as_str()
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        let idx = self.table.schema.index_of(field)?;
        self.row.values.get(idx)?.as_f64()
    }
}

/// The named tables one report reads
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    tables: BTreeMap<String, Table>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn table(&self, name: &str) -> Result<&Table, ReportError> {
        self.tables
            .get(name)
            .ok_or_else(|| ReportError::schema(name, "no table with this name was loaded"))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl From<Table> for Dataset {
    fn from(table: Table) -> Self {
        let mut dataset = Self::new();
        dataset.insert(table);
        dataset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::categorical("program"),
            Field::numeric("workers"),
            Field::numeric("time_seconds"),
        ])
    }

    fn row(program: &str, workers: f64, time: f64) -> MeasurementRow {
        MeasurementRow::new(vec![
            Value::Text(program.to_owned()),
            Value::Number(workers),
            Value::Number(time),
        ])
    }

    #[test]
    fn rejects_short_rows() {
        let short = MeasurementRow::new(vec![Value::Text("a".into()), Value::Number(2.0)]);
        let err = Table::new("t", schema(), vec![short]).unwrap_err();
        assert!(matches!(err, ReportError::Schema { .. }));
    }

    #[test]
    fn rejects_values_of_the_wrong_kind() {
        let bad = MeasurementRow::new(vec![
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0),
        ]);
        assert!(Table::new("t", schema(), vec![bad]).is_err());
    }

    #[test]
    fn distinct_and_range() {
        let table = Table::new(
            "t",
            schema(),
            vec![row("b", 4.0, 6.0), row("a", 2.0, 10.0), row("b", 8.0, 3.0)],
        )
        .unwrap();
        assert_eq!(table.distinct("program").unwrap(), vec!["b", "a"]);
        assert_eq!(table.range("workers").unwrap(), Some((2.0, 8.0)));
        assert!(table.range("program").is_err());
        assert!(table.column("cpu_percent").is_err());
    }

    #[test]
    fn row_view_reads_by_name() {
        let table = Table::new("t", schema(), vec![row("a", 2.0, 10.0)]).unwrap();
        let view = table.view(&table.rows()[0]);
        assert_eq!(view.text("program"), Some("a"));
        assert_eq!(view.number("workers"), Some(2.0));
        assert_eq!(view.number("program"), None);
        assert_eq!(view.text("missing"), None);
    }

    #[test]
    fn dataset_lookup() {
        let dataset = Dataset::from(Table::new("t", schema(), vec![]).unwrap());
        assert!(dataset.table("t").is_ok());
        assert!(matches!(
            dataset.table("other"),
            Err(ReportError::Schema { .. })
        ));
    }
}
