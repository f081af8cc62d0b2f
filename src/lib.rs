// Client library for the rental marketplace

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod flow;
pub mod forms;
pub mod models;
pub mod pricing;
pub mod session;
pub mod views;

// Re-export key types for convenience
pub use api::{ApiError, ClientStats, HttpRentalApi, RentalApi};
pub use cache::{CacheConfig, CacheStatsReport, CachedApi, QueryCache};
pub use config::{ClientConfig, ConfigError};
pub use error::{AppError, Locale, Operation, Route};
pub use flow::{BookingFlow, FlowError, FlowState};
pub use forms::{LoginForm, PaymentForm, RegistrationForm, ReviewDraft, ValidationError};
pub use models::{Booking, BookingStatus, Property, PropertyPage, Review, SearchParams};
pub use pricing::{BookingQuote, PriceBreakdown, QuoteError};
pub use session::{AuthSession, FileStore, MemoryStore, SessionStore};
pub use views::{
    BookingsView, ConfirmationView, Loadable, PropertyDetailView, PropertyListView, ReviewView,
    ViewScope,
};
