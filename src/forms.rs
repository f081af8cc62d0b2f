// Form capture and validation
// Every check here runs before any network call; a failing form never reaches the API.

use thiserror::Error;

use crate::error::Locale;
use crate::models::{Credentials, NewReview, Registration};
use crate::pricing::QuoteError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(u8),

    #[error(transparent)]
    Quote(#[from] QuoteError),
}

impl ValidationError {
    // Form field the message is shown next to
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField(field) => *field,
            ValidationError::PasswordMismatch => "confirmPassword",
            ValidationError::RatingOutOfRange(_) => "rating",
            ValidationError::Quote(err) => err.field(),
        }
    }

    pub fn message(&self, locale: Locale) -> String {
        match (self, locale) {
            (ValidationError::MissingField(_), Locale::Es) => "Requerido".to_string(),
            (ValidationError::MissingField(_), Locale::En) => "Required".to_string(),
            (ValidationError::PasswordMismatch, Locale::Es) => {
                "Las contraseñas no coinciden".to_string()
            }
            (ValidationError::PasswordMismatch, Locale::En) => "Passwords do not match".to_string(),
            (ValidationError::RatingOutOfRange(_), Locale::Es) => {
                "La calificación debe estar entre 1 y 5".to_string()
            }
            (ValidationError::RatingOutOfRange(_), Locale::En) => {
                "The rating must be between 1 and 5".to_string()
            }
            (ValidationError::Quote(err), locale) => quote_message(err, locale),
        }
    }
}

fn quote_message(err: &QuoteError, locale: Locale) -> String {
    match (err, locale) {
        (QuoteError::DateInPast(_), Locale::Es) => {
            "La fecha de entrada no puede ser en el pasado".to_string()
        }
        (QuoteError::DateInPast(_), Locale::En) => "Check-in cannot be in the past".to_string(),
        (QuoteError::InvalidRange, Locale::Es) => {
            "La fecha de salida debe ser posterior a la de entrada".to_string()
        }
        (QuoteError::InvalidRange, Locale::En) => "Check-out must be after check-in".to_string(),
        (QuoteError::GuestCountOutOfRange { max_guests, .. }, Locale::Es) => {
            format!("El número de huéspedes debe estar entre 1 y {}", max_guests)
        }
        (QuoteError::GuestCountOutOfRange { max_guests, .. }, Locale::En) => {
            format!("Guests must be between 1 and {}", max_guests)
        }
        (QuoteError::InvalidRate(_), Locale::Es) => "Precio por noche no válido".to_string(),
        (QuoteError::InvalidRate(_), Locale::En) => "Invalid nightly rate".to_string(),
        (QuoteError::InvalidDate(raw), Locale::Es) => format!("Fecha no válida: {}", raw),
        (QuoteError::InvalidDate(raw), Locale::En) => format!("Invalid date: {}", raw),
    }
}

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Card details captured at checkout.
///
/// Only presence is checked; the details are never sent, the backend just marks the
/// booking as paid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentForm {
    pub card_number: String,
    pub expiry: String,
    pub cvc: String,
    pub card_name: String,
}

impl PaymentForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("cardNumber", &self.card_number)?;
        required("expiry", &self.expiry)?;
        required("cvc", &self.cvc)?;
        required("cardName", &self.card_name)
    }

    // Last four digits, for display on the confirmation
    pub fn masked_number(&self) -> String {
        let digits: Vec<char> = self.card_number.chars().filter(|c| c.is_ascii_digit()).collect();
        let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
        format!("•••• {}", tail)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<Credentials, ValidationError> {
        required("email", &self.email)?;
        required("password", &self.password)?;
        Ok(Credentials {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<Registration, ValidationError> {
        required("name", &self.name)?;
        required("email", &self.email)?;
        required("password", &self.password)?;
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(Registration {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDraft {
    pub rating: u8,
    pub comment: String,
}

impl Default for ReviewDraft {
    fn default() -> Self {
        Self {
            rating: 5,
            comment: String::new(),
        }
    }
}

impl ReviewDraft {
    pub fn validate(&self) -> Result<NewReview, ValidationError> {
        if !(1..=5).contains(&self.rating) {
            return Err(ValidationError::RatingOutOfRange(self.rating));
        }
        required("comment", &self.comment)?;
        Ok(NewReview {
            rating: self.rating,
            comment: self.comment.trim().to_string(),
        })
    }
}
