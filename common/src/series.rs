use std::{collections::BTreeMap, fmt};

use itertools::Itertools;
use tracing::debug;

use crate::{
    error::ReportError,
    table::{RowView, Table, Value},
};

/// Categorical identity of one trace or bar group, as `(field, value)` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey(Vec<(String, String)>);

impl SeriesKey {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(f, v)| ((*f).to_owned(), (*v).to_owned()))
                .collect(),
        )
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    fn matches(&self, view: &RowView<'_>) -> bool {
        self.0
            .iter()
            .all(|(field, value)| view.text(field) == Some(value.as_str()))
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({})",
            self.0.iter().map(|(k, v)| format!("{k}={v}")).join(", ")
        )
    }
}

/// Points of one series, sorted ascending by x
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    key: SeriesKey,
    points: Vec<(f64, f64)>,
}

impl Series {
    pub fn new(key: SeriesKey, mut points: Vec<(f64, f64)>) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { key, points }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Multiplies every y value, e.g. `1.0 / 1024.0` to turn KB into MB
    pub fn scaled(mut self, factor: f64) -> Self {
        for point in &mut self.points {
            point.1 *= factor;
        }
        self
    }

    /// `y[0] / y[i]` for every sample; the smallest x is the baseline
    pub fn speedup(&self) -> Result<Series, ReportError> {
        let Some(&(_, baseline)) = self.points.first() else {
            return Err(ReportError::EmptySeries(format!(
                "speedup of {}: series has no samples",
                self.key
            )));
        };
        if baseline == 0.0 || !baseline.is_finite() {
            return Err(ReportError::EmptySeries(format!(
                "speedup of {}: baseline value is {baseline}",
                self.key
            )));
        }
        let points = self
            .points
            .iter()
            .map(|&(x, y)| {
                if y == 0.0 {
                    Err(ReportError::EmptySeries(format!(
                        "speedup of {}: zero value at x = {x}",
                        self.key
                    )))
                } else {
                    Ok((x, baseline / y))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Series {
            key: self.key.clone(),
            points,
        })
    }
}

type RowFilter<'f> = Box<dyn Fn(&RowView<'_>) -> bool + 'f>;

/// Groups table rows into series of `(x, metric)` points
pub struct SeriesSelector<'f> {
    group_by: Vec<String>,
    x: String,
    metric: String,
    filter: Option<RowFilter<'f>>,
}

impl fmt::Debug for SeriesSelector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesSelector")
            .field("group_by", &self.group_by)
            .field("x", &self.x)
            .field("metric", &self.metric)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

impl<'f> SeriesSelector<'f> {
    pub fn new(group_by: &[&str], x: &str, metric: &str) -> Self {
        Self {
            group_by: group_by.iter().map(|f| (*f).to_owned()).collect(),
            x: x.to_owned(),
            metric: metric.to_owned(),
            filter: None,
        }
    }

    /// Rows failing the predicate are dropped before grouping
    pub fn filter(mut self, filter: impl Fn(&RowView<'_>) -> bool + 'f) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    fn keep(&self, view: &RowView<'_>) -> bool {
        self.filter.as_ref().is_none_or(|f| f(view))
    }

    /// Every group present in the table, ordered by key
    pub fn select(&self, table: &Table) -> Result<Vec<Series>, ReportError> {
        let group_cols = self
            .group_by
            .iter()
            .map(|f| table.column(f))
            .collect::<Result<Vec<_>, _>>()?;
        let x_col = table.numeric_column(&self.x)?;
        let y_col = table.numeric_column(&self.metric)?;

        let mut groups: BTreeMap<SeriesKey, Vec<(f64, f64)>> = BTreeMap::new();
        for row in table.rows() {
            if !self.keep(&table.view(row)) {
                continue;
            }
            let key = SeriesKey(
                self.group_by
                    .iter()
                    .zip(&group_cols)
                    .map(|(field, &col)| {
                        let value = row.get(col).map(|v| v.to_string()).unwrap_or_default();
                        (field.clone(), value)
                    })
                    .collect(),
            );
            if let Some(x) = row.get(x_col).and_then(Value::as_f64)
                && let Some(y) = row.get(y_col).and_then(Value::as_f64)
            {
                groups.entry(key).or_default().push((x, y));
            }
        }

        if groups.is_empty() {
            return Err(ReportError::EmptySeries(format!(
                "{} vs {} in {}: no rows selected",
                self.metric,
                self.x,
                table.name()
            )));
        }
        debug!(
            "{}: {} series of {} vs {}",
            table.name(),
            groups.len(),
            self.metric,
            self.x
        );
        Ok(groups
            .into_iter()
            .map(|(key, points)| Series::new(key, points))
            .collect())
    }

    /// The series of one requested key
    pub fn select_one(&self, table: &Table, key: &SeriesKey) -> Result<Series, ReportError> {
        let x_col = table.numeric_column(&self.x)?;
        let y_col = table.numeric_column(&self.metric)?;
        for (field, _) in key.pairs() {
            table.column(field)?;
        }

        let points = table
            .rows()
            .iter()
            .filter(|row| {
                let view = table.view(row);
                key.matches(&view) && self.keep(&view)
            })
            .filter_map(|row| Some((row.get(x_col)?.as_f64()?, row.get(y_col)?.as_f64()?)))
            .collect::<Vec<_>>();

        if points.is_empty() {
            return Err(ReportError::EmptySeries(format!(
                "{} vs {} for {key} in {}: no rows selected",
                self.metric,
                self.x,
                table.name()
            )));
        }
        Ok(Series::new(key.clone(), points))
    }
}
