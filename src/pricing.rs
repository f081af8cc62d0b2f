// Price/availability calculator
// Turns a nightly rate and a date range into a deterministic price breakdown and
// decides whether the quote may be submitted.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Property;

/// Flat charge added once per booking.
pub const CLEANING_FEE: f64 = 50.0;

/// Platform commission, as a percentage of the subtotal.
pub const SERVICE_FEE_PERCENT: f64 = 15.0;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// Validation errors for a quote, one per form field
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("date in past: check-in {0} is before today")]
    DateInPast(NaiveDate),

    #[error("invalid range: check-out must be after check-in")]
    InvalidRange,

    #[error("guest count out of range: {guests} (allowed 1..={max_guests})")]
    GuestCountOutOfRange { guests: u32, max_guests: u32 },

    #[error("invalid nightly rate: {0}")]
    InvalidRate(f64),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

impl QuoteError {
    // Name of the form field the error belongs to
    pub fn field(&self) -> &'static str {
        match self {
            QuoteError::DateInPast(_) => "checkInDate",
            QuoteError::InvalidRange => "checkOutDate",
            QuoteError::GuestCountOutOfRange { .. } => "guestCount",
            QuoteError::InvalidRate(_) => "pricePerNight",
            QuoteError::InvalidDate(_) => "date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub nights: u32,
    pub subtotal: f64,
    pub cleaning_fee: f64,
    pub service_fee: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingQuote {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_count: u32,
    pub nightly_rate: f64,
    pub max_guests: u32,
}

/// Parses a calendar date in `YYYY-MM-DD` form, as carried in query strings.
pub fn parse_date(value: &str) -> Result<NaiveDate, QuoteError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| QuoteError::InvalidDate(value.to_string()))
}

/// Number of nights between two calendar dates; zero when the range is empty or reversed.
///
/// Calendar dates carry no time component, so the day difference is already whole and
/// the ceiling of the difference is the difference itself.
pub fn nights_between(check_in: NaiveDate, check_out: NaiveDate) -> u32 {
    let days = (check_out - check_in).num_days();
    if days <= 0 {
        0
    } else {
        u32::try_from(days).unwrap_or(u32::MAX)
    }
}

// Round half up
fn round_half_up(amount: f64) -> f64 {
    (amount + 0.5).floor()
}

/// Service fee for a subtotal: 15% rounded half up.
pub fn service_fee(subtotal: f64) -> f64 {
    // subtotal * 15 / 100 keeps exact halves exact (10 -> 1.5 -> 2)
    round_half_up(subtotal * SERVICE_FEE_PERCENT / 100.0)
}

/// Price breakdown for a nightly rate and a number of nights.
pub fn price_breakdown(nightly_rate: f64, nights: u32) -> PriceBreakdown {
    let subtotal = nightly_rate * f64::from(nights);
    let service_fee = service_fee(subtotal);

    PriceBreakdown {
        nights,
        subtotal,
        cleaning_fee: CLEANING_FEE,
        service_fee,
        total: subtotal + CLEANING_FEE + service_fee,
    }
}

impl BookingQuote {
    pub fn new(
        check_in: NaiveDate,
        check_out: NaiveDate,
        guest_count: u32,
        nightly_rate: f64,
        max_guests: u32,
    ) -> Self {
        Self {
            check_in,
            check_out,
            guest_count,
            nightly_rate,
            max_guests,
        }
    }

    // Quote for a fetched property, taking the rate and guest limit from it
    pub fn for_property(
        property: &Property,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guest_count: u32,
    ) -> Self {
        Self::new(
            check_in,
            check_out,
            guest_count,
            property.price_per_night,
            property.max_guests,
        )
    }

    pub fn nights(&self) -> u32 {
        nights_between(self.check_in, self.check_out)
    }

    pub fn breakdown(&self) -> PriceBreakdown {
        price_breakdown(self.nightly_rate, self.nights())
    }

    /// Every validation failure of the quote, in field order.
    ///
    /// The guest count is checked independently of the dates so that a bad guest count
    /// is always reported.
    pub fn violations(&self, today: NaiveDate) -> Vec<QuoteError> {
        let mut errors = Vec::new();

        if self.check_in < today {
            errors.push(QuoteError::DateInPast(self.check_in));
        }
        if self.check_out <= self.check_in {
            errors.push(QuoteError::InvalidRange);
        }
        if self.guest_count < 1 || self.guest_count > self.max_guests {
            errors.push(QuoteError::GuestCountOutOfRange {
                guests: self.guest_count,
                max_guests: self.max_guests,
            });
        }
        if !self.nightly_rate.is_finite() || self.nightly_rate < 0.0 {
            errors.push(QuoteError::InvalidRate(self.nightly_rate));
        }

        errors
    }

    pub fn validate(&self, today: NaiveDate) -> Result<PriceBreakdown, QuoteError> {
        match self.violations(today).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.breakdown()),
        }
    }

    pub fn validate_now(&self) -> Result<PriceBreakdown, QuoteError> {
        self.validate(Local::now().date_naive())
    }

    pub fn is_valid(&self, today: NaiveDate) -> bool {
        self.violations(today).is_empty()
    }
}
