use chrono::{Datelike, NaiveDate, Weekday};

/// Calendar bucket used to detect rebalance dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarPeriod {
    Month,
    Quarter,
    Year,
}

/// Identifies the bucket a date falls in: `(year, index within year)`.
pub fn period_key(date: NaiveDate, period: CalendarPeriod) -> (i32, u32) {
    match period {
        CalendarPeriod::Month => (date.year(), date.month0()),
        CalendarPeriod::Quarter => (date.year(), date.month0() / 3),
        CalendarPeriod::Year => (date.year(), 0),
    }
}

/// True when `date` is the last observation of its period, i.e. the next observation
/// falls into a different bucket. The final observation of a series has no successor
/// and is never a period end.
pub fn is_period_end(date: NaiveDate, next: Option<NaiveDate>, period: CalendarPeriod) -> bool {
    match next {
        Some(next) => period_key(date, period) != period_key(next, period),
        None => false,
    }
}

/// All weekdays from `start` to `end` inclusive.
pub fn get_weekdays_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if start > end {
        return Vec::new();
    }
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(current);
        }
        match current.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_end_detection() {
        assert!(is_period_end(
            date(2024, 1, 31),
            Some(date(2024, 2, 1)),
            CalendarPeriod::Month
        ));
        assert!(!is_period_end(
            date(2024, 1, 30),
            Some(date(2024, 1, 31)),
            CalendarPeriod::Month
        ));
        assert!(!is_period_end(date(2024, 1, 31), None, CalendarPeriod::Month));
    }

    #[test]
    fn test_quarter_and_year_buckets() {
        assert!(!is_period_end(
            date(2024, 1, 31),
            Some(date(2024, 2, 1)),
            CalendarPeriod::Quarter
        ));
        assert!(is_period_end(
            date(2024, 3, 29),
            Some(date(2024, 4, 1)),
            CalendarPeriod::Quarter
        ));
        assert!(is_period_end(
            date(2023, 12, 29),
            Some(date(2024, 1, 2)),
            CalendarPeriod::Year
        ));
    }

    #[test]
    fn test_weekdays_skip_weekends() {
        // 2024-01-05 is a Friday
        let days = get_weekdays_between(date(2024, 1, 5), date(2024, 1, 9));
        assert_eq!(
            days,
            vec![date(2024, 1, 5), date(2024, 1, 8), date(2024, 1, 9)]
        );
        assert!(get_weekdays_between(date(2024, 1, 9), date(2024, 1, 5)).is_empty());
    }
}
