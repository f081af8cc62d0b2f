// User-facing error taxonomy
// Validation errors are shown inline, API errors become a generic localized message for the
// failed operation, and missing authentication redirects to the login route.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::api::ApiError;
use crate::forms::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    Es,
    En,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lang = value.trim().to_ascii_lowercase();
        match lang.split(['-', '_']).next().unwrap_or_default() {
            "es" => Ok(Locale::Es),
            "en" => Ok(Locale::En),
            _ => Err(format!("unsupported locale '{}'", value)),
        }
    }
}

// Where the caller should navigate next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    Property(String),
    Bookings,
    BookingConfirmation(String),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Login => "/login".to_string(),
            Route::Property(id) => format!("/properties/{}", id),
            Route::Bookings => "/bookings".to_string(),
            Route::BookingConfirmation(id) => format!("/bookings/{}/confirmation", id),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    LoadProperties,
    SearchProperties,
    LoadProperty,
    LoadReviews,
    ManageProperty,
    LoadBookings,
    LoadBooking,
    SubmitBooking,
    CancelBooking,
    SubmitReview,
    DeleteReview,
    Login,
    Register,
    UpdateProfile,
}

impl Operation {
    pub fn failure_message(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::Es => match self {
                Operation::LoadProperties => "Error al cargar las propiedades",
                Operation::SearchProperties => "Error al buscar propiedades",
                Operation::LoadProperty => "Error al cargar la propiedad",
                Operation::LoadReviews => "Error al cargar las reseñas",
                Operation::ManageProperty => "Error al guardar la propiedad",
                Operation::LoadBookings => "Error al cargar tus reservas",
                Operation::LoadBooking => "Error al cargar los detalles de la reserva",
                Operation::SubmitBooking => {
                    "Error al procesar la reserva. Por favor, inténtalo de nuevo."
                }
                Operation::CancelBooking => "Error al cancelar la reserva",
                Operation::SubmitReview => {
                    "Error al publicar la reseña. Por favor, inténtalo de nuevo."
                }
                Operation::DeleteReview => "Error al eliminar la reseña",
                Operation::Login => "Error al iniciar sesión",
                Operation::Register => "Error al registrarse",
                Operation::UpdateProfile => "Error al actualizar perfil",
            },
            Locale::En => match self {
                Operation::LoadProperties => "Could not load properties",
                Operation::SearchProperties => "Could not search properties",
                Operation::LoadProperty => "Could not load the property",
                Operation::LoadReviews => "Could not load reviews",
                Operation::ManageProperty => "Could not save the property",
                Operation::LoadBookings => "Could not load your bookings",
                Operation::LoadBooking => "Could not load the booking details",
                Operation::SubmitBooking => "Could not process the booking. Please try again.",
                Operation::CancelBooking => "Could not cancel the booking",
                Operation::SubmitReview => "Could not post the review. Please try again.",
                Operation::DeleteReview => "Could not delete the review",
                Operation::Login => "Could not log in",
                Operation::Register => "Could not register",
                Operation::UpdateProfile => "Could not update the profile",
            },
        }
    }

    // Auth forms show the backend's own explanation when it sends one
    fn shows_server_message(&self) -> bool {
        matches!(
            self,
            Operation::Login | Operation::Register | Operation::UpdateProfile
        )
    }

    fn is_credential_check(&self) -> bool {
        matches!(self, Operation::Login | Operation::Register)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{operation:?} failed: {source}")]
    Api {
        operation: Operation,
        source: ApiError,
    },

    #[error("Authentication required")]
    AuthRequired,
}

impl AppError {
    /// Wraps an API failure for `operation`.
    ///
    /// A 401 on anything other than a credential check means the session is gone, which is
    /// reported as `AuthRequired` so the caller redirects to login.
    pub fn api(operation: Operation, source: ApiError) -> Self {
        match source {
            ApiError::Unauthorized(_) if !operation.is_credential_check() => AppError::AuthRequired,
            source => AppError::Api { operation, source },
        }
    }

    pub fn user_message(&self, locale: Locale) -> String {
        match self {
            AppError::Validation(err) => err.message(locale),
            AppError::Api { operation, source } => match source.server_message() {
                Some(message) if operation.shows_server_message() => message.to_string(),
                _ => operation.failure_message(locale).to_string(),
            },
            AppError::AuthRequired => match locale {
                Locale::Es => "Necesitas iniciar sesión".to_string(),
                Locale::En => "You need to log in".to_string(),
            },
        }
    }

    pub fn redirect(&self) -> Option<Route> {
        match self {
            AppError::AuthRequired => Some(Route::Login),
            _ => None,
        }
    }

    // Validation errors are fixed by editing the form; API errors by trying again
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Api { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::QuoteError;

    #[test]
    fn test_locale_parsing() {
        assert_eq!("es".parse::<Locale>(), Ok(Locale::Es));
        assert_eq!("es-ES".parse::<Locale>(), Ok(Locale::Es));
        assert_eq!("EN_us".parse::<Locale>(), Ok(Locale::En));
        assert!("de".parse::<Locale>().is_err());
    }

    #[test]
    fn test_routes() {
        assert_eq!(Route::Login.path(), "/login");
        assert_eq!(Route::Property("p1".into()).path(), "/properties/p1");
        assert_eq!(
            Route::BookingConfirmation("b7".into()).to_string(),
            "/bookings/b7/confirmation"
        );
    }

    #[test]
    fn test_network_errors_become_generic_messages() {
        let err = AppError::api(
            Operation::SubmitBooking,
            ApiError::ApiResponseError {
                status_code: 500,
                message: "MongoError: duplicate key".to_string(),
            },
        );

        assert_eq!(
            err.user_message(Locale::Es),
            "Error al procesar la reserva. Por favor, inténtalo de nuevo."
        );
        assert_eq!(
            err.user_message(Locale::En),
            "Could not process the booking. Please try again."
        );
        assert!(err.is_retryable());
        assert_eq!(err.redirect(), None);
    }

    #[test]
    fn test_login_failures_show_server_message() {
        let err = AppError::api(
            Operation::Login,
            ApiError::Unauthorized("Email o contraseña incorrectos".to_string()),
        );
        assert_eq!(err.user_message(Locale::En), "Email o contraseña incorrectos");

        let silent = AppError::api(Operation::Login, ApiError::Timeout(10_000));
        assert_eq!(silent.user_message(Locale::Es), "Error al iniciar sesión");
    }

    #[test]
    fn test_expired_session_redirects_to_login() {
        let err = AppError::api(
            Operation::LoadBookings,
            ApiError::Unauthorized("Token expired".to_string()),
        );

        assert_eq!(err, AppError::AuthRequired);
        assert_eq!(err.redirect(), Some(Route::Login));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_messages_are_localized() {
        let err = AppError::from(ValidationError::from(QuoteError::InvalidRange));

        assert_eq!(
            err.user_message(Locale::Es),
            "La fecha de salida debe ser posterior a la de entrada"
        );
        assert_eq!(
            err.user_message(Locale::En),
            "Check-out must be after check-in"
        );
    }
}
