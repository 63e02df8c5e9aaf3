// Amadeus API client with OAuth2 client-credentials auth and bounded retry.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::HotelsApiError;
use crate::models::{
    AmadeusErrorResponse, HotelOffersRequest, HotelOffersResponse, HotelsListRequest,
    HotelsListResponse,
};

const TOKEN_PATH: &str = "/v1/security/oauth2/token";
const HOTELS_BY_GEOCODE_PATH: &str = "/v1/reference-data/locations/hotels/by-geocode";
const HOTEL_OFFERS_PATH: &str = "/v3/shopping/hotel-offers";

/// Refresh the access token this long before it actually expires.
const TOKEN_REFRESH_SLACK: Duration = Duration::from_secs(30);

/// Upstream hotel-search operations, abstracted for testability.
#[async_trait]
pub trait HotelSearchApi: Send + Sync {
    async fn search_hotels_by_location(
        &self,
        request: &HotelsListRequest,
    ) -> Result<HotelsListResponse, HotelsApiError>;

    async fn search_hotel_offers(
        &self,
        request: &HotelOffersRequest,
    ) -> Result<HotelOffersResponse, HotelsApiError>;

    /// Cheap reachability and credential probe.
    async fn ping(&self) -> Result<(), HotelsApiError>;
}

// Lets pools hold shared handles when a single client is lent out through
// several slots (tests do this to count calls in one place).
#[async_trait]
impl<T: HotelSearchApi + ?Sized> HotelSearchApi for std::sync::Arc<T> {
    async fn search_hotels_by_location(
        &self,
        request: &HotelsListRequest,
    ) -> Result<HotelsListResponse, HotelsApiError> {
        (**self).search_hotels_by_location(request).await
    }

    async fn search_hotel_offers(
        &self,
        request: &HotelOffersRequest,
    ) -> Result<HotelOffersResponse, HotelsApiError> {
        (**self).search_hotel_offers(request).await
    }

    async fn ping(&self) -> Result<(), HotelsApiError> {
        (**self).ping().await
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// One handle against the Amadeus REST API. Each handle owns its token
/// state, so pooled handles refresh independently.
pub struct AmadeusClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    max_retries: u32,
    token: RwLock<Option<CachedToken>>,
}

impl AmadeusClient {
    pub fn new(settings: &Settings) -> Result<Self, HotelsApiError> {
        let http = reqwest::Client::builder()
            .timeout(settings.api_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: settings.amadeus_base_url.trim_end_matches('/').to_string(),
            api_key: settings.amadeus_api_key.clone(),
            api_secret: settings.amadeus_api_secret.clone(),
            max_retries: settings.max_retries,
            token: RwLock::new(None),
        })
    }

    /// Return a bearer token, fetching a fresh one when the cached token is
    /// missing or close to expiry.
    async fn bearer_token(&self) -> Result<String, HotelsApiError> {
        {
            let token = self.token.read().await;
            if let Some(cached) = token.as_ref() {
                if cached.expires_at > Instant::now() + TOKEN_REFRESH_SLACK {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut token = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = token.as_ref() {
            if cached.expires_at > Instant::now() + TOKEN_REFRESH_SLACK {
                return Ok(cached.access_token.clone());
            }
        }

        debug!("requesting new amadeus access token");
        let response = self
            .http
            .post(format!("{}{}", self.base_url, TOKEN_PATH))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.api_key.as_str()),
                ("client_secret", self.api_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(HotelsApiError::Authentication(format!(
                "token request failed with status {status}: {detail}"
            )));
        }

        let parsed: TokenResponse = response.json().await?;
        let access_token = parsed.access_token.clone();
        *token = Some(CachedToken {
            access_token: parsed.access_token,
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        });
        Ok(access_token)
    }

    /// GET with retries on transient failures. Client errors surface
    /// immediately; 5xx and network errors are retried with backoff.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, HotelsApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        loop {
            let result = self.try_get(&url, query).await;
            match result {
                Ok(body) => return Ok(serde_json::from_str(&body)?),
                Err(err) if is_transient(&err) && attempt < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying upstream request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_get(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<String, HotelsApiError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }
        if status == StatusCode::UNAUTHORIZED {
            // Force a fresh token on the next call.
            *self.token.write().await = None;
        }
        Err(map_error_response(status, &body))
    }
}

/// Only server faults and transport failures are worth an immediate retry.
/// Rate limiting backs off to the caller instead of hammering the quota.
fn is_transient(err: &HotelsApiError) -> bool {
    match err {
        HotelsApiError::Http(_) => true,
        HotelsApiError::Upstream { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Map a non-2xx Amadeus response to the error taxonomy.
fn map_error_response(status: StatusCode, body: &str) -> HotelsApiError {
    let parsed: Option<AmadeusErrorResponse> = serde_json::from_str(body).ok();
    let first = parsed.as_ref().and_then(|e| e.errors.first());
    let title = first
        .and_then(|e| e.title.clone())
        .unwrap_or_else(|| status.to_string());
    let detail = first.and_then(|e| e.detail.clone()).unwrap_or_default();
    let code = first.and_then(|e| e.code).unwrap_or(0);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            HotelsApiError::Authentication(format!("{title}: {detail}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            HotelsApiError::RateLimited(format!("{title}: {detail}"))
        }
        _ => HotelsApiError::Upstream {
            status: status.as_u16(),
            code,
            title,
            detail,
        },
    }
}

/// Exponential backoff with jitter, capped at 5 seconds.
fn backoff_delay(attempt: u32) -> Duration {
    let base = 100u64.saturating_mul(1u64 << attempt.min(16));
    let capped = base.min(5_000);
    let jitter = rand::thread_rng().gen_range(0..=capped / 4);
    Duration::from_millis(capped + jitter)
}

fn push_param(query: &mut Vec<(String, String)>, name: &str, value: impl ToString) {
    query.push((name.to_string(), value.to_string()));
}

fn push_list(query: &mut Vec<(String, String)>, name: &str, values: &[String]) {
    if !values.is_empty() {
        query.push((name.to_string(), values.join(",")));
    }
}

fn list_query(request: &HotelsListRequest) -> Vec<(String, String)> {
    let mut query = Vec::new();
    push_param(&mut query, "latitude", request.latitude);
    push_param(&mut query, "longitude", request.longitude);
    push_param(&mut query, "radius", request.radius);
    push_param(&mut query, "radiusUnit", &request.radius_unit);
    push_list(&mut query, "amenities", &request.amenities);
    push_list(&mut query, "ratings", &request.ratings);
    push_list(&mut query, "chainCodes", &request.chain_codes);
    push_param(&mut query, "hotelSource", &request.hotel_source);
    query
}

fn offers_query(request: &HotelOffersRequest) -> Vec<(String, String)> {
    let mut query = Vec::new();
    push_list(&mut query, "hotelIds", &request.hotel_ids);
    if let Some(date) = request.check_in_date {
        push_param(&mut query, "checkInDate", date);
    }
    if let Some(date) = request.check_out_date {
        push_param(&mut query, "checkOutDate", date);
    }
    push_param(&mut query, "adults", request.adults);
    push_param(&mut query, "roomQuantity", request.room_quantity);
    if let Some(currency) = &request.currency {
        push_param(&mut query, "currency", currency);
    }
    if let Some(range) = &request.price_range {
        push_param(&mut query, "priceRange", range);
    }
    push_param(&mut query, "paymentPolicy", &request.payment_policy);
    if let Some(board) = &request.board_type {
        push_param(&mut query, "boardType", board);
    }
    push_param(&mut query, "includeClosed", request.include_closed);
    push_param(&mut query, "bestRateOnly", request.best_rate_only);
    if let Some(lang) = &request.lang {
        push_param(&mut query, "lang", lang);
    }
    query
}

#[async_trait]
impl HotelSearchApi for AmadeusClient {
    async fn search_hotels_by_location(
        &self,
        request: &HotelsListRequest,
    ) -> Result<HotelsListResponse, HotelsApiError> {
        self.get_json(HOTELS_BY_GEOCODE_PATH, &list_query(request))
            .await
    }

    async fn search_hotel_offers(
        &self,
        request: &HotelOffersRequest,
    ) -> Result<HotelOffersResponse, HotelsApiError> {
        self.get_json(HOTEL_OFFERS_PATH, &offers_query(request))
            .await
    }

    /// Minimal authenticated request against the geocode endpoint. Proves
    /// both that the API is reachable and that the credentials work.
    async fn ping(&self) -> Result<(), HotelsApiError> {
        let probe = HotelsListRequest {
            latitude: 48.8566,
            longitude: 2.3522,
            radius: 1,
            radius_unit: "KM".into(),
            amenities: vec![],
            ratings: vec![],
            chain_codes: vec![],
            hotel_source: "ALL".into(),
        };
        self.get_json::<HotelsListResponse>(HOTELS_BY_GEOCODE_PATH, &list_query(&probe))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn list_request() -> HotelsListRequest {
        HotelsListRequest {
            latitude: 41.397158,
            longitude: 2.160873,
            radius: 5,
            radius_unit: "KM".into(),
            amenities: vec!["SPA".into(), "WIFI".into()],
            ratings: vec!["4".into(), "5".into()],
            chain_codes: vec![],
            hotel_source: "ALL".into(),
        }
    }

    #[test]
    fn list_query_uses_camel_case_and_joined_lists() {
        let query = list_query(&list_request());
        let lookup = |name: &str| {
            query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(lookup("latitude").unwrap(), "41.397158");
        assert_eq!(lookup("radiusUnit").unwrap(), "KM");
        assert_eq!(lookup("amenities").unwrap(), "SPA,WIFI");
        assert_eq!(lookup("ratings").unwrap(), "4,5");
        // Empty lists are omitted entirely.
        assert_eq!(lookup("chainCodes"), None);
    }

    #[test]
    fn offers_query_formats_dates_iso() {
        let request = HotelOffersRequest {
            hotel_ids: vec!["MCLONGHM".into(), "HLLONDON".into()],
            check_in_date: NaiveDate::from_ymd_opt(2026, 9, 10),
            check_out_date: NaiveDate::from_ymd_opt(2026, 9, 12),
            adults: 2,
            room_quantity: 1,
            currency: Some("EUR".into()),
            price_range: None,
            payment_policy: "NONE".into(),
            board_type: None,
            include_closed: false,
            best_rate_only: true,
            lang: None,
        };
        let query = offers_query(&request);
        let lookup = |name: &str| {
            query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(lookup("hotelIds").unwrap(), "MCLONGHM,HLLONDON");
        assert_eq!(lookup("checkInDate").unwrap(), "2026-09-10");
        assert_eq!(lookup("checkOutDate").unwrap(), "2026-09-12");
        assert_eq!(lookup("bestRateOnly").unwrap(), "true");
        assert_eq!(lookup("boardType"), None);
    }

    #[test]
    fn backoff_grows_and_stays_bounded() {
        for attempt in 0..10 {
            let delay = backoff_delay(attempt);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(6_250));
        }
        // First attempt stays within base plus jitter.
        assert!(backoff_delay(0) <= Duration::from_millis(125));
    }

    #[test]
    fn error_mapping_by_status() {
        let body = r#"{"errors":[{"status":429,"code":38194,"title":"Too many requests","detail":"quota exceeded"}]}"#;
        let err = map_error_response(StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(err.kind(), "rate_limited");

        let err = map_error_response(StatusCode::UNAUTHORIZED, "{}");
        assert_eq!(err.kind(), "authentication");

        let body = r#"{"errors":[{"status":400,"code":477,"title":"INVALID FORMAT","detail":"bad radius"}]}"#;
        let err = map_error_response(StatusCode::BAD_REQUEST, body);
        match err {
            HotelsApiError::Upstream { status, code, .. } => {
                assert_eq!(status, 400);
                assert_eq!(code, 477);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!map_error_response(StatusCode::BAD_REQUEST, body).is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        let err = map_error_response(StatusCode::INTERNAL_SERVER_ERROR, "{}");
        assert!(err.is_retryable());
        let err = map_error_response(StatusCode::BAD_GATEWAY, "oops");
        assert!(err.is_retryable());
    }
}
