//! View-models for the marketplace pages.
//!
//! Each view owns its loading/ready/failed state and a [`ViewScope`]. A request that completes
//! after the scope was unmounted is dropped without touching the view.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::api::RentalApi;
use crate::error::{AppError, Locale, Operation, Route};
use crate::flow::BookingFlow;
use crate::forms::ReviewDraft;
use crate::models::{
    average_rating, Booking, BookingStatus, Property, PropertyPage, Review, SearchParams,
};
use crate::session::AuthSession;

/// Mount token shared between a view and whoever owns its lifetime.
#[derive(Debug, Clone)]
pub struct ViewScope {
    mounted: Arc<AtomicBool>,
}

impl ViewScope {
    pub fn mount() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Awaits `request` to completion and hands back its output only if still mounted.
    pub async fn settle<F>(&self, request: F) -> Option<F::Output>
    where
        F: Future,
    {
        let output = request.await;
        if self.is_mounted() {
            Some(output)
        } else {
            debug!("view unmounted, discarding late result");
            None
        }
    }
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::mount()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> Loadable<T> {
    pub fn from_result(result: Result<T, AppError>, locale: Locale) -> Self {
        match result {
            Ok(value) => Loadable::Ready(value),
            Err(err) => Loadable::Failed(err.user_message(locale)),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Loadable::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Loadable::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut T> {
        match self {
            Loadable::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Loadable::Failed(message) => Some(message),
            _ => None,
        }
    }
}

// Listing page, filtered by keyword or by search parameters
pub struct PropertyListView {
    scope: ViewScope,
    locale: Locale,
    pub page: u32,
    pub keyword: String,
    pub properties: Loadable<PropertyPage>,
}

impl PropertyListView {
    pub fn new(locale: Locale) -> Self {
        Self {
            scope: ViewScope::mount(),
            locale,
            page: 1,
            keyword: String::new(),
            properties: Loadable::Loading,
        }
    }

    pub fn scope(&self) -> ViewScope {
        self.scope.clone()
    }

    pub async fn load(&mut self, api: &dyn RentalApi, page: u32, keyword: &str) {
        self.page = page.max(1);
        self.keyword = keyword.trim().to_string();
        self.properties = Loadable::Loading;

        let scope = self.scope.clone();
        if let Some(result) = scope
            .settle(api.list_properties(self.page, &self.keyword))
            .await
        {
            let result = result.map_err(|e| AppError::api(Operation::LoadProperties, e));
            self.properties = Loadable::from_result(result, self.locale);
        }
    }

    pub async fn search(&mut self, api: &dyn RentalApi, params: &SearchParams) {
        self.properties = Loadable::Loading;

        let scope = self.scope.clone();
        if let Some(result) = scope.settle(api.search_properties(params)).await {
            let result = result.map_err(|e| AppError::api(Operation::SearchProperties, e));
            self.properties = Loadable::from_result(result, self.locale);
        }
    }
}

/// Property page: details, reviews and the booking form.
pub struct PropertyDetailView {
    scope: ViewScope,
    locale: Locale,
    pub property: Loadable<Property>,
    pub reviews: Loadable<Vec<Review>>,
    flow: Option<BookingFlow>,
}

impl PropertyDetailView {
    pub fn new(locale: Locale) -> Self {
        Self {
            scope: ViewScope::mount(),
            locale,
            property: Loadable::Loading,
            reviews: Loadable::Loading,
            flow: None,
        }
    }

    pub fn scope(&self) -> ViewScope {
        self.scope.clone()
    }

    // The property and its reviews are requested together; reviews failing leaves the property usable
    pub async fn load(&mut self, api: &dyn RentalApi, id: &str) {
        self.property = Loadable::Loading;
        self.reviews = Loadable::Loading;
        self.flow = None;

        let scope = self.scope.clone();
        let requests = async { futures::join!(api.get_property(id), api.property_reviews(id)) };
        let Some((property, reviews)) = scope.settle(requests).await else {
            return;
        };

        let property = property.map_err(|e| AppError::api(Operation::LoadProperty, e));
        let reviews = reviews.map_err(|e| AppError::api(Operation::LoadReviews, e));

        if let Ok(property) = &property {
            self.flow = Some(BookingFlow::new(property.clone()));
        }
        self.property = Loadable::from_result(property, self.locale);
        self.reviews = Loadable::from_result(reviews, self.locale);
    }

    pub fn average_rating(&self) -> Option<f64> {
        self.reviews.ready().and_then(|reviews| average_rating(reviews))
    }

    pub fn flow(&self) -> Option<&BookingFlow> {
        self.flow.as_ref()
    }

    pub fn flow_mut(&mut self) -> Option<&mut BookingFlow> {
        self.flow.as_mut()
    }
}

// The logged-in guest's booking history
pub struct BookingsView {
    scope: ViewScope,
    locale: Locale,
    pub bookings: Loadable<Vec<Booking>>,
    pub action_error: Option<String>,
}

impl BookingsView {
    pub fn new(locale: Locale) -> Self {
        Self {
            scope: ViewScope::mount(),
            locale,
            bookings: Loadable::Loading,
            action_error: None,
        }
    }

    pub fn scope(&self) -> ViewScope {
        self.scope.clone()
    }

    pub async fn load(&mut self, api: &dyn RentalApi, session: &AuthSession) -> Result<(), AppError> {
        session.require_user()?;
        self.bookings = Loadable::Loading;

        let scope = self.scope.clone();
        let Some(result) = scope.settle(api.my_bookings()).await else {
            return Ok(());
        };
        match result {
            Ok(bookings) => {
                self.bookings = Loadable::Ready(bookings);
                Ok(())
            }
            Err(e) => {
                let err = AppError::api(Operation::LoadBookings, e);
                self.bookings = Loadable::Failed(err.user_message(self.locale));
                Err(err)
            }
        }
    }

    /// Cancels a booking and marks the local row cancelled.
    ///
    /// Returns `false` without calling the API when the booking is not listed or can no
    /// longer be cancelled.
    pub async fn cancel(
        &mut self,
        api: &dyn RentalApi,
        session: &AuthSession,
        id: &str,
    ) -> Result<bool, AppError> {
        session.require_user()?;
        let cancellable = self
            .bookings
            .ready()
            .and_then(|bookings| bookings.iter().find(|b| b.id == id))
            .map_or(false, |b| b.status.is_cancellable());
        if !cancellable {
            debug!(booking = id, "booking not cancellable");
            return Ok(false);
        }
        self.action_error = None;

        let scope = self.scope.clone();
        let Some(result) = scope
            .settle(api.update_booking_status(id, BookingStatus::Cancelled))
            .await
        else {
            return Ok(false);
        };
        if let Err(e) = result {
            let err = AppError::api(Operation::CancelBooking, e);
            self.action_error = Some(err.user_message(self.locale));
            return Err(err);
        }

        if let Some(booking) = self
            .bookings
            .ready_mut()
            .and_then(|bookings| bookings.iter_mut().find(|b| b.id == id))
        {
            booking.status = BookingStatus::Cancelled;
        }
        info!(booking = id, "booking cancelled");
        Ok(true)
    }
}

pub struct ConfirmationView {
    scope: ViewScope,
    locale: Locale,
    pub booking: Loadable<Booking>,
}

impl ConfirmationView {
    pub fn new(locale: Locale) -> Self {
        Self {
            scope: ViewScope::mount(),
            locale,
            booking: Loadable::Loading,
        }
    }

    pub fn scope(&self) -> ViewScope {
        self.scope.clone()
    }

    pub async fn load(
        &mut self,
        api: &dyn RentalApi,
        session: &AuthSession,
        id: &str,
    ) -> Result<(), AppError> {
        session.require_user()?;
        self.booking = Loadable::Loading;

        let scope = self.scope.clone();
        let Some(result) = scope.settle(api.get_booking(id)).await else {
            return Ok(());
        };
        match result {
            Ok(booking) => {
                self.booking = Loadable::Ready(booking);
                Ok(())
            }
            Err(e) => {
                let err = AppError::api(Operation::LoadBooking, e);
                self.booking = Loadable::Failed(err.user_message(self.locale));
                Err(err)
            }
        }
    }
}

// Review form for one property
pub struct ReviewView {
    scope: ViewScope,
    locale: Locale,
    property_id: String,
    pub draft: ReviewDraft,
    pub error: Option<String>,
    pub submitting: bool,
}

impl ReviewView {
    pub fn new(locale: Locale, property_id: &str) -> Self {
        Self {
            scope: ViewScope::mount(),
            locale,
            property_id: property_id.to_string(),
            draft: ReviewDraft::default(),
            error: None,
            submitting: false,
        }
    }

    pub fn scope(&self) -> ViewScope {
        self.scope.clone()
    }

    /// Posts the draft; on success the caller navigates back to the property.
    pub async fn submit(
        &mut self,
        api: &dyn RentalApi,
        session: &AuthSession,
    ) -> Result<Option<Route>, AppError> {
        session.require_user()?;
        let review = match self.draft.validate() {
            Ok(review) => review,
            Err(e) => {
                self.error = Some(e.message(self.locale));
                return Err(e.into());
            }
        };

        self.error = None;
        self.submitting = true;
        let scope = self.scope.clone();
        let outcome = scope
            .settle(api.create_review(&self.property_id, &review))
            .await;
        self.submitting = false;

        match outcome {
            None => Ok(None),
            Some(Ok(created)) => {
                info!(review = %created.id, property = %self.property_id, "review posted");
                Ok(Some(Route::Property(self.property_id.clone())))
            }
            Some(Err(e)) => {
                let err = AppError::api(Operation::SubmitReview, e);
                self.error = Some(err.user_message(self.locale));
                Err(err)
            }
        }
    }
}
