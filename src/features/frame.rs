use crate::error::Result;
use crate::models::ClimateRow;
use chrono::NaiveDate;
use polars::prelude::*;
use std::ops::Range;

/// Partition column for every per-city window expression
pub const CITY_COLUMN: &str = "city";

/// Feature table keyed by (city, date), backed by a polars [`DataFrame`].
///
/// Rows are kept sorted by city (first-seen order) and then ascending
/// date. Feature columns are `Float64` and may hold nulls until
/// [`FeatureFrame::fill_gaps`] runs.
#[derive(Debug, Clone, Default)]
pub struct FeatureFrame {
    df: DataFrame,
    cities: Vec<String>,
    dates: Vec<NaiveDate>,
}

impl FeatureFrame {
    /// Build a frame from raw rows. `humidity` and `aqi_avg` columns are
    /// only created when at least one row carries the value.
    pub fn from_rows(rows: &[ClimateRow]) -> Result<Self> {
        let mut city_order: Vec<&str> = Vec::new();
        for row in rows {
            if !city_order.contains(&row.city.as_str()) {
                city_order.push(&row.city);
            }
        }

        let mut sorted: Vec<&ClimateRow> = rows.iter().collect();
        sorted.sort_by_key(|r| {
            let rank = city_order
                .iter()
                .position(|c| *c == r.city)
                .unwrap_or(usize::MAX);
            (rank, r.date)
        });

        let cities: Vec<String> = sorted.iter().map(|r| r.city.clone()).collect();
        let dates = sorted.iter().map(|r| r.date).collect();

        let mut columns = vec![
            Series::new(CITY_COLUMN.into(), cities.clone()),
            Series::new("temp_max".into(), sorted.iter().map(|r| r.temp_max).collect::<Vec<f64>>()),
            Series::new("temp_min".into(), sorted.iter().map(|r| r.temp_min).collect::<Vec<f64>>()),
            Series::new("rain".into(), sorted.iter().map(|r| r.rain).collect::<Vec<f64>>()),
        ];
        if sorted.iter().any(|r| r.humidity.is_some()) {
            let humidity: Vec<Option<f64>> = sorted.iter().map(|r| r.humidity).collect();
            columns.push(Series::new("humidity".into(), humidity));
        }
        if sorted.iter().any(|r| r.aqi.is_some()) {
            let aqi: Vec<Option<f64>> = sorted.iter().map(|r| r.aqi).collect();
            columns.push(Series::new("aqi_avg".into(), aqi));
        }

        Ok(Self {
            df: DataFrame::new(columns)?,
            cities,
            dates,
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    /// Feature column names in insertion order, without the city key
    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .filter(|n| n != CITY_COLUMN)
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        name != CITY_COLUMN && self.df.column(name).is_ok()
    }

    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        if name == CITY_COLUMN {
            return None;
        }
        let values = self.df.column(name).ok()?.f64().ok()?;
        Some(values.into_iter().collect())
    }

    /// Single value, `None` for unknown columns, out-of-range rows or gaps
    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        if row >= self.len() || name == CITY_COLUMN {
            return None;
        }
        self.df.column(name).ok()?.f64().ok()?.get(row)
    }

    /// Insert or replace a column. Length must match the row count.
    pub fn insert(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<()> {
        self.df.with_column(Series::new(name.into(), values))?;
        Ok(())
    }

    /// Evaluate `exprs` against the current columns and add their outputs.
    ///
    /// Expressions in one call only see columns that existed before it.
    pub fn with_exprs(&mut self, exprs: Vec<Expr>) -> Result<()> {
        if exprs.is_empty() {
            return Ok(());
        }
        self.df = self.df.clone().lazy().with_columns(exprs).collect()?;
        Ok(())
    }

    /// Contiguous row ranges, one per city
    pub fn city_groups(&self) -> Vec<Range<usize>> {
        let mut groups = Vec::new();
        let mut start = 0;
        for i in 1..=self.cities.len() {
            if i == self.cities.len() || self.cities[i] != self.cities[start] {
                groups.push(start..i);
                start = i;
            }
        }
        groups
    }

    /// Apply `f` to each city's run of `source` and store the concatenated
    /// result as `target`. For sequence logic with no window expression.
    pub fn derive_per_city<F>(&mut self, source: &str, target: &str, f: F) -> Result<()>
    where
        F: Fn(&[Option<f64>]) -> Vec<Option<f64>>,
    {
        let Some(values) = self.column(source) else {
            return Ok(());
        };
        let mut out = Vec::with_capacity(values.len());
        for group in self.city_groups() {
            out.extend(f(&values[group]));
        }
        self.insert(target, out)
    }

    /// Backward-fill, then forward-fill, then zero-fill every column within
    /// each city. No column holds a gap afterwards.
    pub fn fill_gaps(&mut self) -> Result<()> {
        let groups = self.city_groups();
        for name in self.column_names() {
            let column = self.df.column(&name)?.clone();
            let mut filled: Option<Series> = None;
            for group in &groups {
                let part = column
                    .slice(group.start as i64, group.len())
                    .fill_null(FillNullStrategy::Backward(None))?
                    .fill_null(FillNullStrategy::Forward(None))?
                    .fill_null(FillNullStrategy::Zero)?;
                match filled.as_mut() {
                    Some(all) => {
                        all.append(&part)?;
                    }
                    None => filled = Some(part),
                }
            }
            if let Some(all) = filled {
                self.df.with_column(all)?;
            }
        }
        Ok(())
    }

    /// Values of `names` for every row, in the given order. Unknown columns
    /// and gaps read as zero.
    pub fn reindexed(&self, names: &[String]) -> Vec<Vec<f64>> {
        let cols: Vec<Option<Vec<Option<f64>>>> = names.iter().map(|n| self.column(n)).collect();
        (0..self.len())
            .map(|row| {
                cols.iter()
                    .map(|c| c.as_ref().and_then(|c| c[row]).unwrap_or(0.0))
                    .collect()
            })
            .collect()
    }
}
