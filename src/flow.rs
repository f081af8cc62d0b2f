// Booking flow state machine
// EnteringDates -> Validating -> ReadyToSubmit -> Submitting -> Confirmed, with Failed returning
// to ReadyToSubmit. A booking is created first and paid second; the flow only confirms once both
// calls have succeeded.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, RentalApi};
use crate::error::{AppError, Locale, Operation, Route};
use crate::forms::{PaymentForm, ValidationError};
use crate::models::{Booking, NewBooking, Property};
use crate::pricing::{BookingQuote, PriceBreakdown};
use crate::session::AuthSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    EnteringDates,
    Validating,
    ReadyToSubmit,
    Submitting,
    Confirmed,
    Failed,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("Booking cannot be submitted while {0:?}")]
    NotReady(FlowState),

    #[error("Booking is already confirmed")]
    AlreadyConfirmed,

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<ValidationError> for FlowError {
    fn from(err: ValidationError) -> Self {
        FlowError::App(AppError::Validation(err))
    }
}

impl FlowError {
    pub fn user_message(&self, locale: Locale) -> String {
        match (self, locale) {
            (FlowError::App(err), locale) => err.user_message(locale),
            (FlowError::AlreadyConfirmed, Locale::Es) => "La reserva ya está confirmada".to_string(),
            (FlowError::AlreadyConfirmed, Locale::En) => {
                "The booking is already confirmed".to_string()
            }
            (FlowError::NotReady(_), Locale::Es) => {
                "Revisa las fechas y los huéspedes antes de reservar".to_string()
            }
            (FlowError::NotReady(_), Locale::En) => {
                "Check the dates and guests before booking".to_string()
            }
        }
    }

    pub fn redirect(&self) -> Option<Route> {
        match self {
            FlowError::App(err) => err.redirect(),
            _ => None,
        }
    }
}

/// Checkout for one property.
///
/// Holds the guest's date and guest-count inputs, the derived price breakdown and the outcome
/// of the create/pay calls. Dropping the flow abandons it.
#[derive(Debug)]
pub struct BookingFlow {
    property: Property,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    guest_count: u32,
    state: FlowState,
    errors: Vec<ValidationError>,
    breakdown: Option<PriceBreakdown>,
    last_error: Option<AppError>,
    // Created but not yet paid
    pending_booking: Option<Booking>,
    confirmed: Option<Booking>,
}

impl BookingFlow {
    pub fn new(property: Property) -> Self {
        Self {
            property,
            check_in: None,
            check_out: None,
            guest_count: 1,
            state: FlowState::EnteringDates,
            errors: Vec::new(),
            breakdown: None,
            last_error: None,
            pending_booking: None,
            confirmed: None,
        }
    }

    pub fn property(&self) -> &Property {
        &self.property
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn check_in(&self) -> Option<NaiveDate> {
        self.check_in
    }

    pub fn check_out(&self) -> Option<NaiveDate> {
        self.check_out
    }

    pub fn guest_count(&self) -> u32 {
        self.guest_count
    }

    // Field errors from the last review
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn breakdown(&self) -> Option<PriceBreakdown> {
        self.breakdown
    }

    pub fn last_error(&self) -> Option<&AppError> {
        self.last_error.as_ref()
    }

    pub fn confirmed_booking(&self) -> Option<&Booking> {
        self.confirmed.as_ref()
    }

    pub fn set_check_in(&mut self, date: NaiveDate) -> Result<(), FlowError> {
        self.edit()?;
        self.check_in = Some(date);
        Ok(())
    }

    pub fn set_check_out(&mut self, date: NaiveDate) -> Result<(), FlowError> {
        self.edit()?;
        self.check_out = Some(date);
        Ok(())
    }

    pub fn set_guests(&mut self, guest_count: u32) -> Result<(), FlowError> {
        self.edit()?;
        self.guest_count = guest_count;
        Ok(())
    }

    /// Quote for the current inputs, once both dates are chosen.
    pub fn quote(&self) -> Option<BookingQuote> {
        match (self.check_in, self.check_out) {
            (Some(check_in), Some(check_out)) => Some(BookingQuote::for_property(
                &self.property,
                check_in,
                check_out,
                self.guest_count,
            )),
            _ => None,
        }
    }

    // Live price shown while the guest is still choosing; may belong to an invalid quote
    pub fn preview(&self) -> Option<PriceBreakdown> {
        self.quote().map(|quote| quote.breakdown())
    }

    /// Validates the inputs against `today`.
    ///
    /// On success the flow is ready to submit and the breakdown is kept. On failure every
    /// field error is kept for display and the flow goes back to entering dates.
    pub fn review(&mut self, today: NaiveDate) -> Result<PriceBreakdown, FlowError> {
        if self.state == FlowState::Confirmed {
            return Err(FlowError::AlreadyConfirmed);
        }
        self.state = FlowState::Validating;

        let mut errors = Vec::new();
        if self.check_in.is_none() {
            errors.push(ValidationError::MissingField("checkInDate"));
        }
        if self.check_out.is_none() {
            errors.push(ValidationError::MissingField("checkOutDate"));
        }
        let quote = self.quote();
        if let Some(quote) = &quote {
            errors.extend(quote.violations(today).into_iter().map(ValidationError::from));
        }

        match (quote, errors.first().cloned()) {
            (Some(quote), None) => {
                let breakdown = quote.breakdown();
                self.errors.clear();
                self.last_error = None;
                self.breakdown = Some(breakdown);
                self.state = FlowState::ReadyToSubmit;
                debug!(property = %self.property.id, total = breakdown.total, "quote ready");
                Ok(breakdown)
            }
            (_, first) => {
                self.errors = errors;
                self.breakdown = None;
                self.state = FlowState::EnteringDates;
                debug!(property = %self.property.id, errors = self.errors.len(), "quote rejected");
                let first = first.unwrap_or(ValidationError::MissingField("checkInDate"));
                Err(first.into())
            }
        }
    }

    /// Submits the reviewed quote: creates the booking, then pays it.
    ///
    /// Nothing is sent unless the flow is ready, the payment form is complete and a user is
    /// logged in. Returns the confirmation route on success.
    pub async fn submit(
        &mut self,
        api: &dyn RentalApi,
        session: &AuthSession,
        payment: &PaymentForm,
    ) -> Result<Route, FlowError> {
        match self.state {
            FlowState::ReadyToSubmit => {}
            FlowState::Failed => self.dismiss_error(),
            FlowState::Confirmed => return Err(FlowError::AlreadyConfirmed),
            other => return Err(FlowError::NotReady(other)),
        }

        let (quote, breakdown) = match (self.quote(), self.breakdown) {
            (Some(quote), Some(breakdown)) => (quote, breakdown),
            _ => return Err(FlowError::NotReady(self.state)),
        };
        payment.validate()?;
        session.require_user()?;

        self.state = FlowState::Submitting;
        info!(property = %self.property.id, total = breakdown.total, "submitting booking");

        let booking = match self.pending_booking.clone() {
            Some(booking) => {
                debug!(booking = %booking.id, "paying previously created booking");
                booking
            }
            None => {
                let request = NewBooking {
                    property_id: self.property.id.clone(),
                    check_in_date: quote.check_in,
                    check_out_date: quote.check_out,
                    total_price: breakdown.total,
                    guest_count: quote.guest_count,
                };
                let created = match api.create_booking(&request).await {
                    Ok(created) => created,
                    Err(e) => return Err(self.fail(e)),
                };
                if created.id.is_empty() {
                    return Err(self.fail(ApiError::DecodeError(
                        "created booking has no id".to_string(),
                    )));
                }
                info!(booking = %created.id, "booking created");
                self.pending_booking = Some(created.clone());
                created
            }
        };

        let paid = match api.pay_booking(&booking.id).await {
            Ok(paid) => paid,
            Err(e) => return Err(self.fail(e)),
        };

        info!(booking = %booking.id, "booking paid and confirmed");
        self.pending_booking = None;
        self.confirmed = Some(paid);
        self.state = FlowState::Confirmed;
        Ok(Route::BookingConfirmation(booking.id))
    }

    // Back to ReadyToSubmit after a failed submission
    pub fn dismiss_error(&mut self) {
        if self.state == FlowState::Failed {
            self.last_error = None;
            self.state = FlowState::ReadyToSubmit;
        }
    }

    fn fail(&mut self, source: ApiError) -> FlowError {
        let err = AppError::api(Operation::SubmitBooking, source);
        warn!(property = %self.property.id, error = %err, "booking submission failed");
        self.last_error = Some(err.clone());
        self.state = FlowState::Failed;
        err.into()
    }

    // Any edit invalidates the reviewed quote
    fn edit(&mut self) -> Result<(), FlowError> {
        match self.state {
            FlowState::Confirmed => return Err(FlowError::AlreadyConfirmed),
            FlowState::Submitting => return Err(FlowError::NotReady(FlowState::Submitting)),
            _ => {}
        }
        if let Some(booking) = self.pending_booking.take() {
            warn!(booking = %booking.id, "inputs changed, leaving unpaid booking behind");
        }
        self.state = FlowState::EnteringDates;
        self.breakdown = None;
        self.last_error = None;
        self.errors.clear();
        Ok(())
    }
}
