// Request and response models for the two Amadeus hotel endpoints.
//
// Request structs double as cache-key material: field order is fixed, so
// their canonical JSON is deterministic for a given normalized request.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HotelsApiError;

pub const RADIUS_UNITS: [&str; 2] = ["KM", "MILE"];
pub const HOTEL_SOURCES: [&str; 3] = ["BEDBANK", "DIRECTCHAIN", "ALL"];
pub const PAYMENT_POLICIES: [&str; 3] = ["GUARANTEE", "DEPOSIT", "NONE"];
pub const BOARD_TYPES: [&str; 5] = [
    "ROOM_ONLY",
    "BREAKFAST",
    "HALF_BOARD",
    "FULL_BOARD",
    "ALL_INCLUSIVE",
];

fn default_radius() -> u32 {
    5
}

fn default_radius_unit() -> String {
    "KM".to_string()
}

fn default_hotel_source() -> String {
    "ALL".to_string()
}

/// Parameters for the geo-radius hotels list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelsListRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_radius")]
    pub radius: u32,
    #[serde(default = "default_radius_unit")]
    pub radius_unit: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub ratings: Vec<String>,
    #[serde(default)]
    pub chain_codes: Vec<String>,
    #[serde(default = "default_hotel_source")]
    pub hotel_source: String,
}

impl HotelsListRequest {
    /// Normalize enum-like fields and check ranges. Runs before any cache or
    /// pool interaction.
    pub fn validate(&mut self) -> Result<(), HotelsApiError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(HotelsApiError::Validation(
                "latitude must be between -90 and 90 degrees".into(),
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(HotelsApiError::Validation(
                "longitude must be between -180 and 180 degrees".into(),
            ));
        }
        if self.radius == 0 {
            return Err(HotelsApiError::Validation("radius must be positive".into()));
        }

        self.radius_unit = self.radius_unit.to_uppercase();
        if !RADIUS_UNITS.contains(&self.radius_unit.as_str()) {
            return Err(HotelsApiError::Validation(
                "radius_unit must be KM or MILE".into(),
            ));
        }

        self.hotel_source = self.hotel_source.to_uppercase();
        if !HOTEL_SOURCES.contains(&self.hotel_source.as_str()) {
            return Err(HotelsApiError::Validation(
                "hotel_source must be BEDBANK, DIRECTCHAIN, or ALL".into(),
            ));
        }

        for rating in &self.ratings {
            if !matches!(rating.as_str(), "1" | "2" | "3" | "4" | "5") {
                return Err(HotelsApiError::Validation(format!(
                    "rating must be 1-5, got {rating:?}"
                )));
            }
        }

        for code in &mut self.chain_codes {
            *code = code.to_uppercase();
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(HotelsApiError::Validation(format!(
                    "chain code must be a 2-letter code, got {code:?}"
                )));
            }
        }

        for amenity in &mut self.amenities {
            *amenity = amenity.to_uppercase();
            if amenity.is_empty() {
                return Err(HotelsApiError::Validation("empty amenity value".into()));
            }
        }

        Ok(())
    }
}

fn default_adults() -> u32 {
    1
}

fn default_room_quantity() -> u32 {
    1
}

fn default_payment_policy() -> String {
    "NONE".to_string()
}

fn default_best_rate_only() -> bool {
    true
}

/// Parameters for the multi-hotel offer shopping endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelOffersRequest {
    pub hotel_ids: Vec<String>,
    /// Defaults to today when omitted.
    #[serde(default)]
    pub check_in_date: Option<NaiveDate>,
    /// Defaults to the day after check-in when omitted.
    #[serde(default)]
    pub check_out_date: Option<NaiveDate>,
    #[serde(default = "default_adults")]
    pub adults: u32,
    #[serde(default = "default_room_quantity")]
    pub room_quantity: u32,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub price_range: Option<String>,
    #[serde(default = "default_payment_policy")]
    pub payment_policy: String,
    #[serde(default)]
    pub board_type: Option<String>,
    #[serde(default)]
    pub include_closed: bool,
    #[serde(default = "default_best_rate_only")]
    pub best_rate_only: bool,
    #[serde(default)]
    pub lang: Option<String>,
}

impl HotelOffersRequest {
    /// Fill date defaults, normalize enum fields, and check ranges.
    pub fn validate(&mut self) -> Result<(), HotelsApiError> {
        if self.hotel_ids.is_empty() {
            return Err(HotelsApiError::Validation(
                "at least one hotel ID is required".into(),
            ));
        }
        for id in &mut self.hotel_ids {
            *id = id.to_uppercase();
            if id.len() != 8 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(HotelsApiError::Validation(format!(
                    "hotel ID must be an 8-character code, got {id:?}"
                )));
            }
        }

        let check_in = self
            .check_in_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let check_out = self
            .check_out_date
            .unwrap_or_else(|| check_in + ChronoDuration::days(1));
        if check_out <= check_in {
            return Err(HotelsApiError::Validation(
                "check_out_date must be after check_in_date".into(),
            ));
        }
        self.check_in_date = Some(check_in);
        self.check_out_date = Some(check_out);

        if !(1..=9).contains(&self.adults) {
            return Err(HotelsApiError::Validation(
                "number of adults must be between 1 and 9".into(),
            ));
        }
        if !(1..=9).contains(&self.room_quantity) {
            return Err(HotelsApiError::Validation(
                "number of rooms must be between 1 and 9".into(),
            ));
        }

        self.payment_policy = self.payment_policy.to_uppercase();
        if !PAYMENT_POLICIES.contains(&self.payment_policy.as_str()) {
            return Err(HotelsApiError::Validation(
                "payment_policy must be GUARANTEE, DEPOSIT, or NONE".into(),
            ));
        }

        if let Some(board) = &mut self.board_type {
            *board = board.to_uppercase();
            if !BOARD_TYPES.contains(&board.as_str()) {
                return Err(HotelsApiError::Validation(format!(
                    "board_type must be one of {BOARD_TYPES:?}"
                )));
            }
        }

        if let Some(currency) = &mut self.currency {
            *currency = currency.to_uppercase();
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(HotelsApiError::Validation(format!(
                    "currency must be a 3-letter code, got {currency:?}"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hotels list response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoCode {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "countryCode")]
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distance {
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotel {
    #[serde(rename = "hotelId")]
    pub hotel_id: String,
    pub name: String,
    #[serde(rename = "chainCode")]
    pub chain_code: Option<String>,
    #[serde(rename = "iataCode")]
    pub iata_code: Option<String>,
    #[serde(rename = "geoCode")]
    pub geo_code: GeoCode,
    pub address: Option<Address>,
    pub distance: Option<Distance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelsListResponse {
    pub data: Vec<Hotel>,
}

// ---------------------------------------------------------------------------
// Hotel offers response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomTypeEstimated {
    pub category: Option<String>,
    pub beds: Option<u32>,
    #[serde(rename = "bedType")]
    pub bed_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDescription {
    pub text: String,
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "type")]
    pub room_type: Option<String>,
    #[serde(rename = "typeEstimated")]
    pub type_estimated: Option<RoomTypeEstimated>,
    pub description: Option<RoomDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guests {
    pub adults: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub currency: Option<String>,
    pub base: Option<String>,
    pub total: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationPolicy {
    #[serde(rename = "type")]
    pub policy_type: Option<String>,
    pub description: Option<RoomDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policies {
    #[serde(rename = "paymentType")]
    pub payment_type: Option<String>,
    pub cancellation: Option<CancellationPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelOffer {
    pub id: String,
    #[serde(rename = "checkInDate")]
    pub check_in_date: Option<NaiveDate>,
    #[serde(rename = "checkOutDate")]
    pub check_out_date: Option<NaiveDate>,
    #[serde(rename = "rateCode")]
    pub rate_code: Option<String>,
    pub room: Option<Room>,
    pub guests: Option<Guests>,
    pub price: Option<Price>,
    pub policies: Option<Policies>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferHotel {
    #[serde(rename = "hotelId")]
    pub hotel_id: String,
    pub name: Option<String>,
    #[serde(rename = "chainCode")]
    pub chain_code: Option<String>,
    #[serde(rename = "cityCode")]
    pub city_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelOfferItem {
    pub hotel: OfferHotel,
    pub available: bool,
    #[serde(default)]
    pub offers: Vec<HotelOffer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelOffersResponse {
    pub data: Vec<HotelOfferItem>,
}

// ---------------------------------------------------------------------------
// Upstream error envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AmadeusError {
    pub status: Option<u16>,
    pub code: Option<i64>,
    pub title: Option<String>,
    pub detail: Option<String>,
    #[serde(default)]
    pub source: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmadeusErrorResponse {
    pub errors: Vec<AmadeusError>,
}
