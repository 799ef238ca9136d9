use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use log::debug;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::returns_model::{
    MissingDataPolicy, PriceHistory, ReturnKind, ReturnMatrix, ReturnSeries,
};
use crate::config::AnalyticsConfig;
use crate::constants::MIN_OBSERVATIONS;
use crate::errors::{Error, Result};

/// Turns raw price history into aligned periodic return series.
#[derive(Debug, Clone, Copy)]
pub struct ReturnSeriesBuilder {
    kind: ReturnKind,
    missing_data: MissingDataPolicy,
}

impl ReturnSeriesBuilder {
    pub fn new(kind: ReturnKind, missing_data: MissingDataPolicy) -> Self {
        Self { kind, missing_data }
    }

    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self::new(config.return_kind, config.missing_data)
    }

    /// Return series of a single price history.
    pub fn build_series(&self, history: &PriceHistory) -> Result<ReturnSeries> {
        let prices = validated_prices(history)?;
        let dates: Vec<NaiveDate> = prices.iter().skip(1).map(|(d, _)| *d).collect();
        let closes: Vec<f64> = prices.iter().map(|(_, p)| *p).collect();
        ReturnSeries::new(
            history.symbol.clone(),
            self.kind,
            dates,
            self.period_returns(&closes),
        )
    }

    /// Aligns several price histories onto one calendar and converts them to returns.
    pub fn build_matrix(&self, histories: &[PriceHistory]) -> Result<ReturnMatrix> {
        if histories.is_empty() {
            return Err(Error::invalid_parameter(
                "histories",
                "at least one price history is required",
            ));
        }
        let validated = histories
            .iter()
            .map(|h| validated_prices(h).map(|p| (h.symbol.clone(), p)))
            .collect::<Result<Vec<_>>>()?;

        let calendar = match self.missing_data {
            MissingDataPolicy::ForwardFill => forward_fill_calendar(&validated),
            MissingDataPolicy::Drop => intersection_calendar(&validated),
        };
        if calendar.len() < MIN_OBSERVATIONS {
            return Err(Error::insufficient_data(
                "aligned price history",
                MIN_OBSERVATIONS,
                calendar.len(),
            ));
        }
        debug!(
            "Aligned {} price histories on {} dates ({:?})",
            histories.len(),
            calendar.len(),
            self.missing_data
        );

        let mut symbols = Vec::with_capacity(validated.len());
        let mut columns = Vec::with_capacity(validated.len());
        for (symbol, prices) in &validated {
            let by_date: BTreeMap<NaiveDate, f64> = prices.iter().copied().collect();
            let mut aligned = Vec::with_capacity(calendar.len());
            for date in &calendar {
                // The calendar starts no earlier than each asset's first date, so a
                // preceding close always exists.
                let close = by_date
                    .range(..=*date)
                    .next_back()
                    .map(|(_, p)| *p)
                    .ok_or_else(|| {
                        Error::insufficient_data(format!("prices for {}", symbol), 1, 0)
                    })?;
                aligned.push(close);
            }
            symbols.push(symbol.clone());
            columns.push(self.period_returns(&aligned));
        }

        ReturnMatrix::new(symbols, self.kind, calendar[1..].to_vec(), columns)
    }

    /// Inner-joins a portfolio series and a benchmark series on their common dates.
    pub fn align_benchmark(
        portfolio: &ReturnSeries,
        benchmark: &ReturnSeries,
    ) -> Result<(ReturnSeries, ReturnSeries)> {
        let bench: BTreeMap<NaiveDate, f64> = benchmark
            .dates()
            .iter()
            .copied()
            .zip(benchmark.simple_values())
            .collect();
        let mut dates = Vec::new();
        let mut p_values = Vec::new();
        let mut b_values = Vec::new();
        for (date, value) in portfolio.dates().iter().zip(portfolio.simple_values()) {
            if let Some(b) = bench.get(date) {
                dates.push(*date);
                p_values.push(value);
                b_values.push(*b);
            }
        }
        if dates.len() < MIN_OBSERVATIONS {
            return Err(Error::insufficient_data(
                "benchmark comparison",
                MIN_OBSERVATIONS,
                dates.len(),
            ));
        }
        Ok((
            ReturnSeries::new(
                portfolio.symbol(),
                ReturnKind::Simple,
                dates.clone(),
                p_values,
            )?,
            ReturnSeries::new(benchmark.symbol(), ReturnKind::Simple, dates, b_values)?,
        ))
    }

    fn period_returns(&self, closes: &[f64]) -> Vec<f64> {
        closes
            .windows(2)
            .map(|w| match self.kind {
                ReturnKind::Simple => w[1] / w[0] - 1.0,
                ReturnKind::Log => (w[1] / w[0]).ln(),
            })
            .collect()
    }
}

impl Default for ReturnSeriesBuilder {
    fn default() -> Self {
        Self::new(ReturnKind::default(), MissingDataPolicy::default())
    }
}

fn validated_prices(history: &PriceHistory) -> Result<Vec<(NaiveDate, f64)>> {
    if history.prices.len() < MIN_OBSERVATIONS {
        return Err(Error::insufficient_data(
            format!("returns of {}", history.symbol),
            MIN_OBSERVATIONS,
            history.prices.len(),
        ));
    }
    let mut out = Vec::with_capacity(history.prices.len());
    let mut previous: Option<NaiveDate> = None;
    for point in &history.prices {
        if let Some(prev) = previous {
            if point.date <= prev {
                return Err(Error::invalid_parameter(
                    "prices",
                    format!(
                        "{}: dates must be strictly increasing ({} then {})",
                        history.symbol, prev, point.date
                    ),
                ));
            }
        }
        previous = Some(point.date);
        out.push((point.date, to_price(&history.symbol, point.date, point.close)?));
    }
    Ok(out)
}

fn to_price(symbol: &str, date: NaiveDate, close: Decimal) -> Result<f64> {
    match close.to_f64() {
        Some(p) if p > 0.0 && p.is_finite() => Ok(p),
        _ => Err(Error::invalid_parameter(
            "prices",
            format!("{}: close {} on {} must be positive", symbol, close, date),
        )),
    }
}

/// Union of all dates between the latest first date and the earliest last date.
fn forward_fill_calendar(histories: &[(String, Vec<(NaiveDate, f64)>)]) -> Vec<NaiveDate> {
    let start = histories.iter().filter_map(|(_, p)| p.first()).map(|(d, _)| *d).max();
    let end = histories.iter().filter_map(|(_, p)| p.last()).map(|(d, _)| *d).min();
    let (Some(start), Some(end)) = (start, end) else {
        return Vec::new();
    };
    histories
        .iter()
        .flat_map(|(_, p)| p.iter().map(|(d, _)| *d))
        .filter(|d| *d >= start && *d <= end)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Dates present in every history.
fn intersection_calendar(histories: &[(String, Vec<(NaiveDate, f64)>)]) -> Vec<NaiveDate> {
    let mut sets = histories
        .iter()
        .map(|(_, p)| p.iter().map(|(d, _)| *d).collect::<BTreeSet<_>>());
    let Some(first) = sets.next() else {
        return Vec::new();
    };
    sets.fold(first, |acc, s| acc.intersection(&s).copied().collect())
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::PricePoint;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn history(symbol: &str, points: &[(u32, Decimal)]) -> PriceHistory {
        PriceHistory::new(
            symbol,
            points
                .iter()
                .map(|(d, p)| PricePoint {
                    date: date(*d),
                    close: *p,
                })
                .collect(),
        )
    }

    #[test]
    fn test_simple_returns() {
        let h = history("AAA", &[(2, dec!(100)), (3, dec!(110)), (4, dec!(99))]);
        let series = ReturnSeriesBuilder::default().build_series(&h).unwrap();
        assert_eq!(series.dates(), &[date(3), date(4)]);
        assert!((series.values()[0] - 0.10).abs() < 1e-12);
        assert!((series.values()[1] + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_log_returns() {
        let h = history("AAA", &[(2, dec!(100)), (3, dec!(200))]);
        let builder = ReturnSeriesBuilder::new(ReturnKind::Log, MissingDataPolicy::Drop);
        let series = builder.build_series(&h).unwrap();
        assert!((series.values()[0] - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_non_positive_price() {
        let h = history("AAA", &[(2, dec!(100)), (3, dec!(0))]);
        let result = ReturnSeriesBuilder::default().build_series(&h);
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_single_price_is_insufficient() {
        let h = history("AAA", &[(2, dec!(100))]);
        let result = ReturnSeriesBuilder::default().build_series(&h);
        assert!(matches!(result, Err(Error::InsufficientData { .. })));
    }

    #[test]
    fn test_forward_fill_repeats_previous_close() {
        let a = history("A", &[(2, dec!(100)), (3, dec!(101)), (4, dec!(102)), (5, dec!(103))]);
        let b = history("B", &[(2, dec!(50)), (4, dec!(55)), (5, dec!(55))]);
        let builder = ReturnSeriesBuilder::new(ReturnKind::Simple, MissingDataPolicy::ForwardFill);
        let matrix = builder.build_matrix(&[a, b]).unwrap();
        assert_eq!(matrix.dates(), &[date(3), date(4), date(5)]);
        // B is missing on the 3rd: zero return there, the whole move lands on the 4th
        assert_eq!(matrix.column(1)[0], 0.0);
        assert!((matrix.column(1)[1] - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_drop_keeps_common_dates() {
        let a = history("A", &[(2, dec!(100)), (3, dec!(101)), (4, dec!(102)), (5, dec!(103))]);
        let b = history("B", &[(2, dec!(50)), (4, dec!(55)), (5, dec!(55))]);
        let builder = ReturnSeriesBuilder::new(ReturnKind::Simple, MissingDataPolicy::Drop);
        let matrix = builder.build_matrix(&[a, b]).unwrap();
        assert_eq!(matrix.dates(), &[date(4), date(5)]);
        assert!((matrix.column(0)[0] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_forward_fill_trims_to_common_span() {
        let a = history("A", &[(2, dec!(100)), (3, dec!(101)), (8, dec!(102))]);
        let b = history("B", &[(3, dec!(50)), (4, dec!(51)), (5, dec!(52))]);
        let matrix = ReturnSeriesBuilder::default().build_matrix(&[a, b]).unwrap();
        // Calendar runs from the 3rd (latest start) to the 5th (earliest end)
        assert_eq!(matrix.dates(), &[date(4), date(5)]);
        assert_eq!(matrix.column(0), &[0.0, 0.0]);
    }

    #[test]
    fn test_align_benchmark_inner_join() {
        let p = ReturnSeries::new(
            "P",
            ReturnKind::Simple,
            vec![date(2), date(3), date(4)],
            vec![0.01, 0.02, 0.03],
        )
        .unwrap();
        let b = ReturnSeries::new(
            "B",
            ReturnKind::Simple,
            vec![date(3), date(4), date(5)],
            vec![0.1, 0.2, 0.3],
        )
        .unwrap();
        let (p2, b2) = ReturnSeriesBuilder::align_benchmark(&p, &b).unwrap();
        assert_eq!(p2.values(), &[0.02, 0.03]);
        assert_eq!(b2.values(), &[0.1, 0.2]);
    }
}
