// Tool layer: the eight operations exposed over the MCP transport.
//
// Every invocation runs the same pipeline: monitor bracket, argument
// validation, cache lookup, pooled upstream call on a miss, cache fill on
// success. Failures are never cached. A per-invocation deadline covers the
// whole pipeline including time spent waiting for a pool slot; dropping the
// timed-out future releases any held pool guard.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cache::{cache_key, ResponseCache};
use crate::client::HotelSearchApi;
use crate::config::Settings;
use crate::error::HotelsApiError;
use crate::models::{
    HotelOffersRequest, HotelOffersResponse, HotelsListRequest, HotelsListResponse,
};
use crate::monitor::PerformanceMonitor;
use crate::pool::ClientPool;

pub struct HotelTools<C> {
    pool: Arc<ClientPool<C>>,
    cache: Option<ResponseCache>,
    monitor: Arc<PerformanceMonitor>,
    request_timeout: Duration,
    settings: Settings,
}

impl<C: HotelSearchApi> HotelTools<C> {
    pub fn new(
        pool: Arc<ClientPool<C>>,
        monitor: Arc<PerformanceMonitor>,
        settings: Settings,
    ) -> Self {
        let cache = settings
            .enable_caching
            .then(|| ResponseCache::new(settings.cache_max_size, settings.cache_ttl));
        Self {
            pool,
            cache,
            monitor,
            request_timeout: settings.request_timeout,
            settings,
        }
    }

    /// Monitor-bracket and deadline-bound one tool invocation.
    async fn run<F>(&self, operation: &'static str, work: F) -> Result<Value, HotelsApiError>
    where
        F: Future<Output = Result<Value, HotelsApiError>>,
    {
        let token = self.monitor.start(operation);
        let result = match tokio::time::timeout(self.request_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(HotelsApiError::Timeout {
                elapsed: self.request_timeout,
            }),
        };
        let error_kind = result.as_ref().err().map(|e| e.kind());
        let duration = self.monitor.finish(token, error_kind);
        match &result {
            Ok(_) => debug!(operation, duration_ms = duration.as_millis() as u64, "tool call ok"),
            Err(err) => info!(
                operation,
                duration_ms = duration.as_millis() as u64,
                error = %err,
                "tool call failed"
            ),
        }
        result
    }

    fn cached(&self, key: &str) -> Option<Value> {
        self.cache.as_ref().and_then(|cache| cache.get(key))
    }

    fn fill_cache(&self, key: String, value: &Value) {
        if let Some(cache) = &self.cache {
            cache.put(key, value.clone());
        }
    }

    /// Geo-radius search without the monitor bracket; shared by the single
    /// and fan-out entry points.
    async fn list_core(&self, mut request: HotelsListRequest) -> Result<Value, HotelsApiError> {
        request.validate()?;
        let key = cache_key("search_hotels_by_location", &request);
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let client = self.pool.acquire().await?;
        let response = client.search_hotels_by_location(&request).await?;
        drop(client);

        let formatted = format_hotels_list(&request, &response)?;
        self.fill_cache(key, &formatted);
        Ok(formatted)
    }

    async fn offers_core(&self, mut request: HotelOffersRequest) -> Result<Value, HotelsApiError> {
        request.validate()?;
        let key = cache_key("search_hotel_offers", &request);
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let client = self.pool.acquire().await?;
        let response = client.search_hotel_offers(&request).await?;
        drop(client);

        let formatted = format_hotel_offers(&request, &response)?;
        self.fill_cache(key, &formatted);
        Ok(formatted)
    }

    /// Find hotels around a single set of coordinates.
    pub async fn search_hotels_by_location(&self, args: Value) -> Result<Value, HotelsApiError> {
        self.run("search_hotels_by_location", async {
            self.list_core(parse_args(args)?).await
        })
        .await
    }

    /// Fetch bookable offers for one or more hotel IDs.
    pub async fn search_hotel_offers(&self, args: Value) -> Result<Value, HotelsApiError> {
        self.run("search_hotel_offers", async {
            self.offers_core(parse_args(args)?).await
        })
        .await
    }

    /// Concurrent geo searches: one `{latitude, longitude}` per slot, the
    /// remaining search parameters applied uniformly. Results preserve input
    /// order; each element succeeds or fails on its own.
    pub async fn search_hotels_by_multiple_locations(
        &self,
        args: Value,
    ) -> Result<Value, HotelsApiError> {
        self.run("search_hotels_by_multiple_locations", async {
            let requests = expand_locations(args)?;
            let futures = requests.into_iter().map(|request| self.list_core(request));
            Ok(aggregate_batch(join_all(futures).await))
        })
        .await
    }

    /// Concurrent offer searches, same aggregation contract as the
    /// multi-location search.
    pub async fn search_hotel_offers_batch(&self, args: Value) -> Result<Value, HotelsApiError> {
        self.run("search_hotel_offers_batch", async {
            let batch: OffersBatch = parse_args(args)?;
            if batch.requests.is_empty() {
                return Err(HotelsApiError::Validation(
                    "at least one offer request is required".into(),
                ));
            }
            let futures = batch
                .requests
                .into_iter()
                .map(|request| self.offers_core(request));
            Ok(aggregate_batch(join_all(futures).await))
        })
        .await
    }

    pub async fn get_cache_stats(&self) -> Result<Value, HotelsApiError> {
        self.run("get_cache_stats", async {
            Ok(match &self.cache {
                Some(cache) => {
                    let stats = cache.stats();
                    json!({
                        "cache_enabled": true,
                        "size": stats.size,
                        "capacity": stats.capacity,
                        "hit_count": stats.hits,
                        "miss_count": stats.misses,
                        "hit_rate": stats.hit_rate(),
                    })
                }
                None => json!({ "cache_enabled": false }),
            })
        })
        .await
    }

    pub async fn clear_cache(&self) -> Result<Value, HotelsApiError> {
        self.run("clear_cache", async {
            let cleared = self.cache.as_ref().map(|cache| cache.clear());
            if let Some(count) = cleared {
                info!(entries = count, "cache cleared");
            }
            Ok(json!({
                "cache_enabled": self.cache.is_some(),
                "cleared_entries": cleared.unwrap_or(0),
            }))
        })
        .await
    }

    pub async fn get_performance_stats(&self) -> Result<Value, HotelsApiError> {
        self.run("get_performance_stats", async {
            let summary = self.monitor.summary();
            Ok(json!({
                "performance": summary,
                "pool": {
                    "active": self.pool.active(),
                    "capacity": self.pool.capacity(),
                },
                "config": {
                    "pool_size": self.settings.client_pool_size,
                    "cache_enabled": self.settings.enable_caching,
                    "cache_ttl_secs": self.settings.cache_ttl.as_secs(),
                    "request_timeout_secs": self.settings.request_timeout.as_secs(),
                },
            }))
        })
        .await
    }

    /// Probe the upstream API through a pooled client. Always answers with
    /// a status document; only infrastructure failures (pool exhaustion,
    /// deadline) surface as errors.
    pub async fn health_check(&self) -> Result<Value, HotelsApiError> {
        self.run("health_check", async {
            let client = self.pool.acquire().await?;
            let probe = client.ping().await;
            drop(client);
            Ok(match probe {
                Ok(()) => json!({
                    "status": "healthy",
                    "upstream_reachable": true,
                    "authenticated": true,
                }),
                Err(err @ HotelsApiError::Authentication(_)) => json!({
                    "status": "unhealthy",
                    "upstream_reachable": true,
                    "authenticated": false,
                    "error": err.to_string(),
                }),
                Err(err) => json!({
                    "status": "unhealthy",
                    "upstream_reachable": false,
                    "authenticated": Value::Null,
                    "error": err.to_string(),
                }),
            })
        })
        .await
    }
}

#[derive(serde::Deserialize)]
struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(serde::Deserialize)]
struct OffersBatch {
    requests: Vec<HotelOffersRequest>,
}

/// Turn `{locations: [{latitude, longitude}, ...], ...shared params}` into
/// one full search request per location.
fn expand_locations(args: Value) -> Result<Vec<HotelsListRequest>, HotelsApiError> {
    let Value::Object(mut template) = args else {
        return Err(HotelsApiError::Validation(
            "invalid arguments: expected an object".into(),
        ));
    };
    let locations = template
        .remove("locations")
        .ok_or_else(|| HotelsApiError::Validation("locations is required".into()))?;
    let points: Vec<GeoPoint> = serde_json::from_value(locations)
        .map_err(|e| HotelsApiError::Validation(format!("invalid locations: {e}")))?;
    if points.is_empty() {
        return Err(HotelsApiError::Validation(
            "at least one location is required".into(),
        ));
    }

    points
        .into_iter()
        .map(|point| {
            let mut item = template.clone();
            item.insert("latitude".into(), point.latitude.into());
            item.insert("longitude".into(), point.longitude.into());
            parse_args(Value::Object(item))
        })
        .collect()
}

/// Malformed tool arguments are the caller's fault, not an internal error.
fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, HotelsApiError> {
    serde_json::from_value(args)
        .map_err(|e| HotelsApiError::Validation(format!("invalid arguments: {e}")))
}

/// Collapse fan-out outcomes into an input-ordered aggregate where each slot
/// carries either its result or its own error.
fn aggregate_batch(outcomes: Vec<Result<Value, HotelsApiError>>) -> Value {
    let total = outcomes.len();
    let mut succeeded = 0usize;
    let results: Vec<Value> = outcomes
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| match outcome {
            Ok(result) => {
                succeeded += 1;
                json!({ "index": index, "result": result })
            }
            Err(err) => json!({ "index": index, "error": err.to_wire()["error"] }),
        })
        .collect();
    json!({
        "results": results,
        "total": total,
        "succeeded": succeeded,
        "failed": total - succeeded,
    })
}

fn format_hotels_list(
    request: &HotelsListRequest,
    response: &HotelsListResponse,
) -> Result<Value, HotelsApiError> {
    let hotels: Vec<Value> = response
        .data
        .iter()
        .map(|hotel| {
            json!({
                "hotel_id": hotel.hotel_id,
                "name": hotel.name,
                "chain_code": hotel.chain_code,
                "geo_code": {
                    "latitude": hotel.geo_code.latitude,
                    "longitude": hotel.geo_code.longitude,
                },
                "country_code": hotel
                    .address
                    .as_ref()
                    .and_then(|a| a.country_code.clone()),
                "distance": hotel.distance.as_ref().map(|d| json!({
                    "value": d.value,
                    "unit": d.unit,
                })),
            })
        })
        .collect();
    Ok(json!({
        "hotels": hotels,
        "total_count": response.data.len(),
        "search_params": serde_json::to_value(request)?,
    }))
}

fn format_hotel_offers(
    request: &HotelOffersRequest,
    response: &HotelOffersResponse,
) -> Result<Value, HotelsApiError> {
    let hotels: Vec<Value> = response
        .data
        .iter()
        .map(|item| {
            let offers: Vec<Value> = item
                .offers
                .iter()
                .map(|offer| {
                    json!({
                        "id": offer.id,
                        "check_in_date": offer.check_in_date,
                        "check_out_date": offer.check_out_date,
                        "rate_code": offer.rate_code,
                        "room": offer.room.as_ref().map(|room| json!({
                            "type": room.room_type,
                            "category": room
                                .type_estimated
                                .as_ref()
                                .and_then(|t| t.category.clone()),
                            "beds": room.type_estimated.as_ref().and_then(|t| t.beds),
                            "bed_type": room
                                .type_estimated
                                .as_ref()
                                .and_then(|t| t.bed_type.clone()),
                            "description": room
                                .description
                                .as_ref()
                                .map(|d| d.text.clone()),
                        })),
                        "guests": offer.guests.as_ref().and_then(|g| g.adults),
                        "price": offer.price.as_ref().map(|price| json!({
                            "currency": price.currency,
                            "base": price.base,
                            "total": price.total,
                        })),
                        "policies": offer.policies.as_ref().map(|policies| json!({
                            "payment_type": policies.payment_type,
                            "cancellation": policies.cancellation.as_ref().map(|c| json!({
                                "type": c.policy_type,
                                "description": c
                                    .description
                                    .as_ref()
                                    .map(|d| d.text.clone()),
                            })),
                        })),
                    })
                })
                .collect();
            json!({
                "hotel": {
                    "hotel_id": item.hotel.hotel_id,
                    "name": item.hotel.name,
                    "chain_code": item.hotel.chain_code,
                    "city_code": item.hotel.city_code,
                },
                "available": item.available,
                "offers": offers,
            })
        })
        .collect();
    Ok(json!({
        "hotels": hotels,
        "total_hotels": response.data.len(),
        "search_params": serde_json::to_value(request)?,
    }))
}
