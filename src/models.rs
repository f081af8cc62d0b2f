// Data structures for the marketplace REST API
// The backend owns the schema; unknown fields are ignored and most fields default.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Calendar dates are sent as YYYY-MM-DD and may come back as full RFC 3339 timestamps
pub mod calendar_date {
    use chrono::{DateTime, NaiveDate};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::pricing::DATE_FORMAT;

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<NaiveDate, String> {
        if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            return Ok(date);
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|timestamp| timestamp.date_naive())
            .map_err(|_| format!("unrecognized date: {}", raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PropertyType {
    #[default]
    Apartment,
    House,
    #[serde(rename = "Unique space")]
    UniqueSpace,
    #[serde(rename = "Boutique hotel")]
    BoutiqueHotel,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Owner {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub price_per_night: f64,
    #[serde(default)]
    pub property_type: PropertyType,
    #[serde(default)]
    pub bedrooms: u32,
    #[serde(default)]
    pub bathrooms: u32,
    #[serde(default = "default_max_guests")]
    pub max_guests: u32,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub num_reviews: u32,
    #[serde(default = "default_available")]
    pub is_available: bool,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub owner: Option<Owner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn default_max_guests() -> u32 {
    1
}

fn default_available() -> bool {
    true
}

impl Property {
    pub fn location(&self) -> String {
        match (self.address.city.is_empty(), self.address.country.is_empty()) {
            (false, false) => format!("{}, {}", self.address.city, self.address.country),
            (false, true) => self.address.city.clone(),
            (true, false) => self.address.country.clone(),
            (true, true) => String::new(),
        }
    }
}

// Body for creating or updating a property (owner/admin)
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInput {
    pub title: String,
    pub description: String,
    pub images: Vec<String>,
    pub price_per_night: f64,
    pub property_type: PropertyType,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub max_guests: u32,
    pub amenities: Vec<String>,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPage {
    pub properties: Vec<Property>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub pages: Option<u32>,
}

// Listing responses come either wrapped in a page envelope or as a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListingResponse {
    Paged(PropertyPage),
    Bare(Vec<Property>),
}

impl From<ListingResponse> for PropertyPage {
    fn from(item: ListingResponse) -> Self {
        match item {
            ListingResponse::Paged(page) => page,
            ListingResponse::Bare(properties) => PropertyPage {
                properties,
                page: None,
                pages: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "optional_date")]
    pub check_in: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none", with = "optional_date")]
    pub check_out: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guests: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<PropertyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

mod optional_date {
    use chrono::NaiveDate;
    use serde::Serializer;

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => super::calendar_date::serialize(date, serializer),
            None => serializer.serialize_none(),
        }
    }
}

impl SearchParams {
    // Stable textual form, used as a cache key
    pub fn cache_fragment(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewAuthor {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub user: ReviewAuthor,
    #[serde(default)]
    pub property: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub rating: u8,
    pub comment: String,
}

// Mean rating of a set of reviews, None when there are no reviews
pub fn average_rating(reviews: &[Review]) -> Option<f64> {
    if reviews.is_empty() {
        return None;
    }
    let sum: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
    Some(f64::from(sum) / reviews.len() as f64)
}

/// The authenticated-user record returned by the auth endpoints and persisted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    // Pending and confirmed bookings can still be cancelled by the guest
    pub fn is_cancellable(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    // Only completed stays can be reviewed
    pub fn is_reviewable(&self) -> bool {
        matches!(self, BookingStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PropertySummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub images: Vec<String>,
    pub address: Address,
}

// A booking's property is either an id or a populated summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BookingProperty {
    Id(String),
    Summary(PropertySummary),
}

impl BookingProperty {
    pub fn id(&self) -> &str {
        match self {
            BookingProperty::Id(id) => id,
            BookingProperty::Summary(summary) => &summary.id,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            BookingProperty::Id(_) => None,
            BookingProperty::Summary(summary) => Some(&summary.title),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(rename = "_id")]
    pub id: String,
    pub property: BookingProperty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
    #[serde(with = "calendar_date")]
    pub check_in_date: NaiveDate,
    #[serde(with = "calendar_date")]
    pub check_out_date: NaiveDate,
    pub guest_count: u32,
    pub total_price: f64,
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub property_id: String,
    #[serde(with = "calendar_date")]
    pub check_in_date: NaiveDate,
    #[serde(with = "calendar_date")]
    pub check_out_date: NaiveDate,
    pub total_price: f64,
    pub guest_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct StatusUpdate {
    pub status: BookingStatus,
}
