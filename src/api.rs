// REST client for the rental marketplace API
// Every persistent record lives behind this API; the client only moves JSON back and forth.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::models::{
    AuthUser, Booking, BookingStatus, Credentials, ListingResponse, NewBooking, NewReview,
    ProfileUpdate, Property, PropertyInput, PropertyPage, Registration, Review, SearchParams,
    StatusUpdate,
};
use crate::session::{stored_user, SessionStore};

// Error types for API calls
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("API error: {status_code} - {message}")]
    ApiResponseError { status_code: u16, message: String },

    #[error("Decode error: {0}")]
    DecodeError(String),
}

impl ApiError {
    // Message supplied by the backend, if the failure came from it
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized(message) | ApiError::ApiResponseError { message, .. }
                if !message.is_empty() =>
            {
                Some(message.as_str())
            }
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::ApiResponseError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

// Per-client request statistics
#[derive(Debug, Default, Clone)]
pub struct ClientStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub requests_timeout: usize,
    pub average_response_time_ms: f64,
    pub max_response_time_ms: f64,
}

impl ClientStats {
    fn record(&mut self, elapsed: Duration, outcome: &Result<String, ApiError>) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        self.requests_sent += 1;
        match outcome {
            Ok(_) => self.requests_succeeded += 1,
            Err(ApiError::Timeout(_)) => {
                self.requests_failed += 1;
                self.requests_timeout += 1;
            }
            Err(_) => self.requests_failed += 1,
        }

        let count = self.requests_sent as f64;
        self.average_response_time_ms += (elapsed_ms - self.average_response_time_ms) / count;
        if elapsed_ms > self.max_response_time_ms {
            self.max_response_time_ms = elapsed_ms;
        }
    }
}

/// The marketplace API as seen by the client.
///
/// Implemented over HTTP by [`HttpRentalApi`], and wrapped by [`crate::cache::CachedApi`]
/// for catalogue reads.
#[async_trait]
pub trait RentalApi: Send + Sync {
    // Users
    async fn register(&self, registration: &Registration) -> Result<AuthUser, ApiError>;
    async fn login(&self, credentials: &Credentials) -> Result<AuthUser, ApiError>;
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<AuthUser, ApiError>;

    // Properties
    async fn list_properties(&self, page: u32, keyword: &str) -> Result<PropertyPage, ApiError>;
    async fn get_property(&self, id: &str) -> Result<Property, ApiError>;
    async fn search_properties(&self, params: &SearchParams) -> Result<PropertyPage, ApiError>;
    async fn create_property(&self, input: &PropertyInput) -> Result<Property, ApiError>;
    async fn update_property(&self, id: &str, input: &PropertyInput)
        -> Result<Property, ApiError>;
    async fn delete_property(&self, id: &str) -> Result<(), ApiError>;

    // Bookings
    async fn create_booking(&self, booking: &NewBooking) -> Result<Booking, ApiError>;
    async fn my_bookings(&self) -> Result<Vec<Booking>, ApiError>;
    async fn get_booking(&self, id: &str) -> Result<Booking, ApiError>;
    async fn update_booking_status(
        &self,
        id: &str,
        status: BookingStatus,
    ) -> Result<Booking, ApiError>;
    async fn pay_booking(&self, id: &str) -> Result<Booking, ApiError>;

    // Reviews
    async fn create_review(&self, property_id: &str, review: &NewReview)
        -> Result<Review, ApiError>;
    async fn property_reviews(&self, property_id: &str) -> Result<Vec<Review>, ApiError>;
    async fn delete_review(&self, id: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

pub struct HttpRentalApi {
    http: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
    store: Arc<dyn SessionStore>,
    stats: Mutex<ClientStats>,
}

impl HttpRentalApi {
    pub fn new(config: &ClientConfig, store: Arc<dyn SessionStore>) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "http client",
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_ms: config.timeout_ms,
            store,
            stats: Mutex::new(ClientStats::default()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, "application/json");

        // The token is read from the persisted record on every request
        match stored_user(self.store.as_ref()).map(|user| user.token) {
            Some(token) if !token.is_empty() => builder.bearer_auth(token),
            _ => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let started = Instant::now();
        let outcome = self.execute_inner(builder).await;
        self.stats.lock().record(started.elapsed(), &outcome);
        outcome
    }

    async fn execute_inner(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let request = builder
            .build()
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;
        let label = format!("{} {}", request.method(), request.url().path());
        debug!(request = %label, "sending request");

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        // The deadline also covers reading the body
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if status.is_success() {
            debug!(request = %label, status = status.as_u16(), "request succeeded");
            return Ok(body);
        }

        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or_default();
        warn!(request = %label, status = status.as_u16(), %message, "request failed");

        if status == StatusCode::UNAUTHORIZED {
            Err(ApiError::Unauthorized(message))
        } else {
            Err(ApiError::ApiResponseError {
                status_code: status.as_u16(),
                message,
            })
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(self.timeout_ms)
        } else {
            ApiError::NetworkError(e.to_string())
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(builder).await?;
        decode(&body)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::DecodeError(e.to_string()))
}

#[async_trait]
impl RentalApi for HttpRentalApi {
    async fn register(&self, registration: &Registration) -> Result<AuthUser, ApiError> {
        self.fetch(self.request(Method::POST, "/users").json(registration))
            .await
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthUser, ApiError> {
        self.fetch(self.request(Method::POST, "/users/login").json(credentials))
            .await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<AuthUser, ApiError> {
        self.fetch(self.request(Method::PUT, "/users/profile").json(update))
            .await
    }

    async fn list_properties(&self, page: u32, keyword: &str) -> Result<PropertyPage, ApiError> {
        let builder = self
            .request(Method::GET, "/properties")
            .query(&[("pageNumber", page.to_string()), ("keyword", keyword.to_string())]);
        let listing: ListingResponse = self.fetch(builder).await?;
        Ok(listing.into())
    }

    async fn get_property(&self, id: &str) -> Result<Property, ApiError> {
        self.fetch(self.request(Method::GET, &format!("/properties/{}", id)))
            .await
    }

    async fn search_properties(&self, params: &SearchParams) -> Result<PropertyPage, ApiError> {
        let listing: ListingResponse = self
            .fetch(self.request(Method::GET, "/search").query(params))
            .await?;
        Ok(listing.into())
    }

    async fn create_property(&self, input: &PropertyInput) -> Result<Property, ApiError> {
        self.fetch(self.request(Method::POST, "/properties").json(input))
            .await
    }

    async fn update_property(
        &self,
        id: &str,
        input: &PropertyInput,
    ) -> Result<Property, ApiError> {
        self.fetch(
            self.request(Method::PUT, &format!("/properties/{}", id))
                .json(input),
        )
        .await
    }

    async fn delete_property(&self, id: &str) -> Result<(), ApiError> {
        self.execute(self.request(Method::DELETE, &format!("/properties/{}", id)))
            .await
            .map(|_| ())
    }

    async fn create_booking(&self, booking: &NewBooking) -> Result<Booking, ApiError> {
        self.fetch(self.request(Method::POST, "/bookings").json(booking))
            .await
    }

    async fn my_bookings(&self) -> Result<Vec<Booking>, ApiError> {
        self.fetch(self.request(Method::GET, "/bookings")).await
    }

    async fn get_booking(&self, id: &str) -> Result<Booking, ApiError> {
        self.fetch(self.request(Method::GET, &format!("/bookings/{}", id)))
            .await
    }

    async fn update_booking_status(
        &self,
        id: &str,
        status: BookingStatus,
    ) -> Result<Booking, ApiError> {
        self.fetch(
            self.request(Method::PUT, &format!("/bookings/{}", id))
                .json(&StatusUpdate { status }),
        )
        .await
    }

    async fn pay_booking(&self, id: &str) -> Result<Booking, ApiError> {
        self.fetch(self.request(Method::PUT, &format!("/bookings/{}/pay", id)))
            .await
    }

    async fn create_review(
        &self,
        property_id: &str,
        review: &NewReview,
    ) -> Result<Review, ApiError> {
        self.fetch(
            self.request(Method::POST, &format!("/properties/{}/reviews", property_id))
                .json(review),
        )
        .await
    }

    async fn property_reviews(&self, property_id: &str) -> Result<Vec<Review>, ApiError> {
        self.fetch(self.request(Method::GET, &format!("/properties/{}/reviews", property_id)))
            .await
    }

    async fn delete_review(&self, id: &str) -> Result<(), ApiError> {
        self.execute(self.request(Method::DELETE, &format!("/reviews/{}", id)))
            .await
            .map(|_| ())
    }
}
