use chrono::{Duration, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

// Inclusive date span; `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ModelError> {
        if start > end {
            return Err(ModelError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    // Parses both ends with `format`, rejecting anything that does not match it exactly.
    pub fn parse(start: &str, end: &str, format: &str) -> Result<Self, ModelError> {
        Self::new(parse_date(start, format)?, parse_date(end, format)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    // Number of days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    // Nights between check-in and check-out.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(DateRange { start, end })
    }

    // Smallest range covering both.
    pub fn union(&self, other: &DateRange) -> DateRange {
        DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    // Consecutive windows of at most `max_days`, covering this range exactly.
    pub fn windows(&self, max_days: i64) -> Vec<DateRange> {
        let step = max_days.max(1);
        let mut windows = Vec::new();
        let mut cursor = self.start;
        while cursor <= self.end {
            let end = (cursor + Duration::days(step - 1)).min(self.end);
            windows.push(DateRange { start: cursor, end });
            cursor = end + Duration::days(1);
        }
        windows
    }

    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.days()).map(move |offset| start + Duration::days(offset))
    }
}

// chrono accepts unpadded fields, so anything that does not round-trip is rejected too
pub fn parse_date(value: &str, format: &str) -> Result<NaiveDate, ModelError> {
    let trimmed = value.trim();
    let invalid = || ModelError::OutOfRange {
        field: "date".to_string(),
        value: value.to_string(),
    };
    let parsed = NaiveDate::parse_from_str(trimmed, format).map_err(|_| invalid())?;
    if parsed.format(format).to_string() != trimmed {
        return Err(invalid());
    }
    Ok(parsed)
}

// Rounds half away from zero to two places, the way amounts go on the wire.
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// Sum that reports overflow instead of panicking.
pub fn checked_sum<I: IntoIterator<Item = Decimal>>(amounts: I) -> Option<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
}

pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", round_amount(amount))
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), ModelError> {
    if value.trim().is_empty() {
        return Err(ModelError::MissingField(field.to_string()));
    }
    Ok(())
}

pub fn require_non_negative(field: &str, amount: Decimal) -> Result<(), ModelError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ModelError::OutOfRange {
            field: field.to_string(),
            value: amount.to_string(),
        });
    }
    Ok(())
}

pub fn require_currency(currency: &str) -> Result<(), ModelError> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ModelError::InvalidCode {
            field: "currency".to_string(),
            value: currency.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

#[cfg(test)]
pub(crate) fn range(start: &str, end: &str) -> DateRange {
    DateRange::new(date(start), date(end)).unwrap()
}
