use chrono::NaiveDate;
use nalgebra::DMatrix;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ReturnKind {
    #[default]
    Simple,
    Log,
}

/// How a date present for one asset but missing for another is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MissingDataPolicy {
    /// Repeat the previous close (a zero return for that asset on that date)
    #[default]
    ForwardFill,
    /// Keep only dates every asset has
    Drop,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: Decimal,
}

/// Price history for one symbol, as supplied by the persistence layer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistory {
    pub symbol: String,
    pub prices: Vec<PricePoint>,
}

impl PriceHistory {
    pub fn new(symbol: impl Into<String>, prices: Vec<PricePoint>) -> Self {
        Self {
            symbol: symbol.into(),
            prices,
        }
    }
}

/// Ordered `(date, return)` observations for one asset or portfolio.
///
/// Dates are strictly increasing, values are finite fractional returns. The series is
/// immutable once built; transforms produce new series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnSeries {
    symbol: String,
    kind: ReturnKind,
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ReturnSeries {
    pub fn new(
        symbol: impl Into<String>,
        kind: ReturnKind,
        dates: Vec<NaiveDate>,
        values: Vec<f64>,
    ) -> Result<Self> {
        let symbol = symbol.into();
        if dates.len() != values.len() {
            return Err(Error::invalid_parameter(
                "returns",
                format!(
                    "{}: {} dates but {} values",
                    symbol,
                    dates.len(),
                    values.len()
                ),
            ));
        }
        validate_dates(&symbol, &dates)?;
        for (date, value) in dates.iter().zip(values.iter()) {
            validate_return(&symbol, kind, *date, *value)?;
        }
        Ok(Self {
            symbol,
            kind,
            dates,
            values,
        })
    }

    /// Builds a simple-return series on consecutive calendar days starting 1970-01-01.
    pub fn from_values(symbol: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let dates = consecutive_dates(values.len());
        Self::new(symbol, ReturnKind::Simple, dates, values)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn kind(&self) -> ReturnKind {
        self.kind
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Values as simple returns; log returns are converted with `e^r - 1`.
    pub fn simple_values(&self) -> Vec<f64> {
        match self.kind {
            ReturnKind::Simple => self.values.clone(),
            ReturnKind::Log => self.values.iter().map(|r| r.exp_m1()).collect(),
        }
    }

    /// The same series expressed as simple returns.
    pub fn to_simple(&self) -> ReturnSeries {
        ReturnSeries {
            symbol: self.symbol.clone(),
            kind: ReturnKind::Simple,
            dates: self.dates.clone(),
            values: self.simple_values(),
        }
    }

    /// A new series on the same dates with different values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<ReturnSeries> {
        ReturnSeries::new(self.symbol.clone(), self.kind, self.dates.clone(), values)
    }

    /// The trailing `n` observations (the whole series when shorter).
    pub fn tail(&self, n: usize) -> ReturnSeries {
        let start = self.len().saturating_sub(n);
        ReturnSeries {
            symbol: self.symbol.clone(),
            kind: self.kind,
            dates: self.dates[start..].to_vec(),
            values: self.values[start..].to_vec(),
        }
    }

    /// Observations whose date lies in `[start, end]`; open ends are unbounded.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> ReturnSeries {
        let (dates, values) = self
            .dates
            .iter()
            .zip(self.values.iter())
            .filter(|(d, _)| in_range(**d, start, end))
            .map(|(d, v)| (*d, *v))
            .unzip();
        ReturnSeries {
            symbol: self.symbol.clone(),
            kind: self.kind,
            dates,
            values,
        }
    }
}

/// Returns of several assets on one shared calendar.
///
/// `columns[i][t]` is the return of `symbols[i]` over the period ending `dates[t]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnMatrix {
    symbols: Vec<String>,
    kind: ReturnKind,
    dates: Vec<NaiveDate>,
    columns: Vec<Vec<f64>>,
}

impl ReturnMatrix {
    pub fn new(
        symbols: Vec<String>,
        kind: ReturnKind,
        dates: Vec<NaiveDate>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if symbols.is_empty() {
            return Err(Error::invalid_parameter(
                "symbols",
                "at least one asset is required",
            ));
        }
        if symbols.len() != columns.len() {
            return Err(Error::invalid_parameter(
                "columns",
                format!("{} symbols but {} columns", symbols.len(), columns.len()),
            ));
        }
        for (i, symbol) in symbols.iter().enumerate() {
            if symbols[..i].contains(symbol) {
                return Err(Error::invalid_parameter(
                    "symbols",
                    format!("duplicate symbol {}", symbol),
                ));
            }
        }
        validate_dates("matrix", &dates)?;
        for (symbol, column) in symbols.iter().zip(columns.iter()) {
            if column.len() != dates.len() {
                return Err(Error::invalid_parameter(
                    "columns",
                    format!(
                        "{}: {} values for {} dates",
                        symbol,
                        column.len(),
                        dates.len()
                    ),
                ));
            }
            for (date, value) in dates.iter().zip(column.iter()) {
                validate_return(symbol, kind, *date, *value)?;
            }
        }
        Ok(Self {
            symbols,
            kind,
            dates,
            columns,
        })
    }

    /// Builds a matrix from series that already share the same dates.
    pub fn from_series(series: &[ReturnSeries]) -> Result<Self> {
        let first = series.first().ok_or_else(|| {
            Error::invalid_parameter("series", "at least one series is required")
        })?;
        for s in series {
            if s.dates != first.dates {
                return Err(Error::invalid_parameter(
                    "series",
                    format!(
                        "{} is not aligned with {}; build the matrix from price histories",
                        s.symbol, first.symbol
                    ),
                ));
            }
            if s.kind != first.kind {
                return Err(Error::invalid_parameter(
                    "series",
                    format!("{} mixes simple and log returns", s.symbol),
                ));
            }
        }
        Self::new(
            series.iter().map(|s| s.symbol.clone()).collect(),
            first.kind,
            first.dates.clone(),
            series.iter().map(|s| s.values.clone()).collect(),
        )
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn kind(&self) -> ReturnKind {
        self.kind
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn n_assets(&self) -> usize {
        self.symbols.len()
    }

    pub fn n_periods(&self) -> usize {
        self.dates.len()
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    pub fn column(&self, index: usize) -> &[f64] {
        &self.columns[index]
    }

    /// Column `index` as simple returns.
    pub fn simple_column(&self, index: usize) -> Vec<f64> {
        match self.kind {
            ReturnKind::Simple => self.columns[index].clone(),
            ReturnKind::Log => self.columns[index].iter().map(|r| r.exp_m1()).collect(),
        }
    }

    pub fn series(&self, index: usize) -> ReturnSeries {
        ReturnSeries {
            symbol: self.symbols[index].clone(),
            kind: self.kind,
            dates: self.dates.clone(),
            values: self.columns[index].clone(),
        }
    }

    /// Periods x assets matrix of simple returns.
    pub fn to_simple_dmatrix(&self) -> DMatrix<f64> {
        let simple: Vec<Vec<f64>> = (0..self.n_assets())
            .map(|i| self.simple_column(i))
            .collect();
        DMatrix::from_fn(self.n_periods(), self.n_assets(), |t, i| simple[i][t])
    }

    /// Rebuilds a simple-return matrix on the same symbols and dates.
    pub fn with_simple_dmatrix(&self, data: &DMatrix<f64>) -> Result<ReturnMatrix> {
        let columns = (0..self.n_assets())
            .map(|i| data.column(i).iter().copied().collect())
            .collect();
        ReturnMatrix::new(
            self.symbols.clone(),
            ReturnKind::Simple,
            self.dates.clone(),
            columns,
        )
    }

    /// Trailing `n` periods.
    pub fn tail(&self, n: usize) -> ReturnMatrix {
        let start = self.n_periods().saturating_sub(n);
        ReturnMatrix {
            symbols: self.symbols.clone(),
            kind: self.kind,
            dates: self.dates[start..].to_vec(),
            columns: self.columns.iter().map(|c| c[start..].to_vec()).collect(),
        }
    }

    /// Periods whose date lies in `[start, end]`.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> ReturnMatrix {
        let keep: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| in_range(**d, start, end))
            .map(|(t, _)| t)
            .collect();
        ReturnMatrix {
            symbols: self.symbols.clone(),
            kind: self.kind,
            dates: keep.iter().map(|&t| self.dates[t]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| keep.iter().map(|&t| c[t]).collect())
                .collect(),
        }
    }

    /// Return series of a portfolio holding `weights` constantly (re-applied each period).
    pub fn portfolio_series(&self, name: &str, weights: &[f64]) -> Result<ReturnSeries> {
        if weights.len() != self.n_assets() {
            return Err(Error::invalid_parameter(
                "weights",
                format!(
                    "expected {} weights, got {}",
                    self.n_assets(),
                    weights.len()
                ),
            ));
        }
        let simple: Vec<Vec<f64>> = (0..self.n_assets())
            .map(|i| self.simple_column(i))
            .collect();
        let values = (0..self.n_periods())
            .map(|t| {
                weights
                    .iter()
                    .zip(simple.iter())
                    .map(|(w, col)| w * col[t])
                    .sum()
            })
            .collect();
        ReturnSeries::new(name, ReturnKind::Simple, self.dates.clone(), values)
    }
}

fn in_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
}

fn consecutive_dates(n: usize) -> Vec<NaiveDate> {
    let epoch = NaiveDate::default();
    epoch.iter_days().take(n).collect()
}

fn validate_dates(context: &str, dates: &[NaiveDate]) -> Result<()> {
    for pair in dates.windows(2) {
        if pair[1] <= pair[0] {
            return Err(Error::invalid_parameter(
                "dates",
                format!(
                    "{}: dates must be strictly increasing ({} then {})",
                    context, pair[0], pair[1]
                ),
            ));
        }
    }
    Ok(())
}

fn validate_return(symbol: &str, kind: ReturnKind, date: NaiveDate, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::invalid_parameter(
            "returns",
            format!("{}: non-finite return on {}", symbol, date),
        ));
    }
    if kind == ReturnKind::Simple && value < -1.0 {
        return Err(Error::invalid_parameter(
            "returns",
            format!(
                "{}: return {} on {} is a loss beyond 100%",
                symbol, value, date
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_series_rejects_unordered_dates() {
        let result = ReturnSeries::new(
            "AAA",
            ReturnKind::Simple,
            vec![date(2024, 1, 2), date(2024, 1, 2)],
            vec![0.01, 0.02],
        );
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_series_rejects_total_loss_beyond_100_percent() {
        let result = ReturnSeries::from_values("AAA", vec![0.01, -1.5]);
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
        assert!(ReturnSeries::from_values("AAA", vec![0.01, -1.0]).is_ok());
    }

    #[test]
    fn test_log_series_converts_to_simple() {
        let series = ReturnSeries::new(
            "AAA",
            ReturnKind::Log,
            vec![date(2024, 1, 2), date(2024, 1, 3)],
            vec![0.0, 2f64.ln()],
        )
        .unwrap();
        let simple = series.simple_values();
        assert!((simple[0]).abs() < 1e-15);
        assert!((simple[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_portfolio_series_weights_columns() {
        let a = ReturnSeries::from_values("A", vec![0.10, -0.05]).unwrap();
        let b = ReturnSeries::from_values("B", vec![0.00, 0.05]).unwrap();
        let matrix = ReturnMatrix::from_series(&[a, b]).unwrap();
        let portfolio = matrix.portfolio_series("P", &[0.5, 0.5]).unwrap();
        assert!((portfolio.values()[0] - 0.05).abs() < 1e-12);
        assert!(portfolio.values()[1].abs() < 1e-12);
    }

    #[test]
    fn test_tail_and_between() {
        let series = ReturnSeries::from_values("A", vec![0.01, 0.02, 0.03, 0.04]).unwrap();
        assert_eq!(series.tail(2).values(), &[0.03, 0.04]);
        assert_eq!(series.tail(10).len(), 4);

        let dates = series.dates().to_vec();
        let window = series.between(Some(dates[1]), Some(dates[2]));
        assert_eq!(window.values(), &[0.02, 0.03]);
    }

    #[test]
    fn test_matrix_rejects_duplicate_symbols() {
        let a = ReturnSeries::from_values("A", vec![0.01, 0.02]).unwrap();
        let result = ReturnMatrix::from_series(&[a.clone(), a]);
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }
}
