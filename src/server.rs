// MCP server: stdio NDJSON transport over the JSON-RPC types.
//
// One request line in, one response line out. Notifications (no id) are
// processed but never answered. The auth gate runs after parsing and before
// any dispatch, so unauthorized calls never touch the tool layer.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use crate::auth::BearerAuth;
use crate::client::HotelSearchApi;
use crate::error::HotelsApiError;
use crate::protocol::{
    error_codes, JsonRpcRequest, JsonRpcResponse, ToolDefinition, MCP_PROTOCOL_VERSION,
};
use crate::tools::HotelTools;

pub const SERVER_NAME: &str = "amadeus-hotels-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct McpServer<C> {
    tools: HotelTools<C>,
    auth: BearerAuth,
}

impl<C: HotelSearchApi> McpServer<C> {
    pub fn new(tools: HotelTools<C>, auth: BearerAuth) -> Self {
        Self { tools, auth }
    }

    /// Serve NDJSON frames from stdin until EOF.
    pub async fn run(&self) -> std::io::Result<()> {
        info!(
            auth_enabled = self.auth.enabled(),
            "server listening on stdio"
        );
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(line).await {
                writer.write_all(response.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    /// Process one frame. Returns `None` when no response is owed
    /// (notifications).
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "unparseable frame");
                let response = JsonRpcResponse::error(
                    Value::Null,
                    error_codes::PARSE_ERROR,
                    format!("parse error: {e}"),
                );
                return serialize_response(response);
            }
        };

        let response = self.handle_request(request).await?;
        serialize_response(response)
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.is_notification();
        let id = request.id.clone().unwrap_or(Value::Null);

        if let Err(err) = self
            .auth
            .authorize(&request.method, request.params.as_ref())
        {
            if is_notification {
                return None;
            }
            return Some(JsonRpcResponse::error_with_data(
                id,
                error_codes::UNAUTHORIZED,
                err.to_string(),
                Some(err.to_wire()["error"].clone()),
            ));
        }

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": SERVER_VERSION,
                    },
                }),
            ),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(
                id,
                json!({ "tools": tool_definitions() }),
            ),
            "tools/call" => self.handle_tool_call(id, request.params).await,
            method if method.starts_with("notifications/") => return None,
            method => JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("method not found: {method}"),
            ),
        };

        if is_notification {
            None
        } else {
            Some(response)
        }
    }

    async fn handle_tool_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                "tools/call requires params",
            );
        };
        let Some(name) = params.get("name").and_then(|n| n.as_str()) else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                "tools/call requires a tool name",
            );
        };
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let outcome = match self.dispatch(name, arguments).await {
            Some(outcome) => outcome,
            None => {
                return JsonRpcResponse::error(
                    id,
                    error_codes::TOOL_NOT_FOUND,
                    format!("unknown tool: {name}"),
                )
            }
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, tool_result(&result, false)),
            Err(err) => {
                if matches!(err, HotelsApiError::Internal(_)) {
                    error!(tool = name, error = %err, "internal tool failure");
                }
                JsonRpcResponse::success(id, tool_result(&err.to_wire(), true))
            }
        }
    }

    async fn dispatch(
        &self,
        name: &str,
        args: Value,
    ) -> Option<Result<Value, HotelsApiError>> {
        Some(match name {
            "search_hotels_by_location" => self.tools.search_hotels_by_location(args).await,
            "search_hotel_offers" => self.tools.search_hotel_offers(args).await,
            "search_hotels_by_multiple_locations" => {
                self.tools.search_hotels_by_multiple_locations(args).await
            }
            "search_hotel_offers_batch" => self.tools.search_hotel_offers_batch(args).await,
            "get_cache_stats" => self.tools.get_cache_stats().await,
            "clear_cache" => self.tools.clear_cache().await,
            "get_performance_stats" => self.tools.get_performance_stats().await,
            "health_check" => self.tools.health_check().await,
            _ => return None,
        })
    }
}

fn serialize_response(response: JsonRpcResponse) -> Option<String> {
    match serde_json::to_string(&response) {
        Ok(raw) => Some(raw),
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            None
        }
    }
}

/// Tool results are carried as a single text content block, errors flagged
/// with `isError` so clients surface them as tool failures rather than
/// protocol failures.
fn tool_result(payload: &Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    let location_properties = json!({
        "latitude": { "type": "number", "minimum": -90, "maximum": 90 },
        "longitude": { "type": "number", "minimum": -180, "maximum": 180 },
        "radius": { "type": "integer", "minimum": 1, "default": 5 },
        "radius_unit": { "type": "string", "enum": ["KM", "MILE"], "default": "KM" },
        "amenities": { "type": "array", "items": { "type": "string" } },
        "ratings": {
            "type": "array",
            "items": { "type": "string", "enum": ["1", "2", "3", "4", "5"] }
        },
        "chain_codes": { "type": "array", "items": { "type": "string" } },
        "hotel_source": {
            "type": "string",
            "enum": ["BEDBANK", "DIRECTCHAIN", "ALL"],
            "default": "ALL"
        },
    });
    let offers_properties = json!({
        "hotel_ids": {
            "type": "array",
            "items": { "type": "string" },
            "minItems": 1
        },
        "check_in_date": { "type": "string", "format": "date" },
        "check_out_date": { "type": "string", "format": "date" },
        "adults": { "type": "integer", "minimum": 1, "maximum": 9, "default": 1 },
        "room_quantity": { "type": "integer", "minimum": 1, "maximum": 9, "default": 1 },
        "currency": { "type": "string" },
        "price_range": { "type": "string" },
        "payment_policy": {
            "type": "string",
            "enum": ["GUARANTEE", "DEPOSIT", "NONE"],
            "default": "NONE"
        },
        "board_type": {
            "type": "string",
            "enum": ["ROOM_ONLY", "BREAKFAST", "HALF_BOARD", "FULL_BOARD", "ALL_INCLUSIVE"]
        },
        "include_closed": { "type": "boolean", "default": false },
        "best_rate_only": { "type": "boolean", "default": true },
        "lang": { "type": "string" },
    });
    let empty_schema = json!({ "type": "object", "properties": {} });

    vec![
        ToolDefinition {
            name: "search_hotels_by_location",
            description: "Find hotels around a set of coordinates",
            input_schema: json!({
                "type": "object",
                "properties": location_properties,
                "required": ["latitude", "longitude"],
            }),
        },
        ToolDefinition {
            name: "search_hotel_offers",
            description: "Fetch bookable offers for one or more hotels",
            input_schema: json!({
                "type": "object",
                "properties": offers_properties,
                "required": ["hotel_ids"],
            }),
        },
        ToolDefinition {
            name: "search_hotels_by_multiple_locations",
            description: "Run several location searches concurrently; search parameters other than coordinates apply to every location",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "locations": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "latitude": { "type": "number", "minimum": -90, "maximum": 90 },
                                "longitude": { "type": "number", "minimum": -180, "maximum": 180 },
                            },
                            "required": ["latitude", "longitude"],
                        }
                    },
                    "radius": { "type": "integer", "minimum": 1, "default": 5 },
                    "radius_unit": { "type": "string", "enum": ["KM", "MILE"], "default": "KM" },
                    "amenities": { "type": "array", "items": { "type": "string" } },
                    "ratings": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["1", "2", "3", "4", "5"] }
                    },
                    "chain_codes": { "type": "array", "items": { "type": "string" } },
                    "hotel_source": {
                        "type": "string",
                        "enum": ["BEDBANK", "DIRECTCHAIN", "ALL"],
                        "default": "ALL"
                    },
                },
                "required": ["locations"],
            }),
        },
        ToolDefinition {
            name: "search_hotel_offers_batch",
            description: "Run several offer searches concurrently",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "requests": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": offers_properties,
                            "required": ["hotel_ids"],
                        }
                    }
                },
                "required": ["requests"],
            }),
        },
        ToolDefinition {
            name: "get_cache_stats",
            description: "Report response cache size and hit rate",
            input_schema: empty_schema.clone(),
        },
        ToolDefinition {
            name: "clear_cache",
            description: "Drop all cached responses",
            input_schema: empty_schema.clone(),
        },
        ToolDefinition {
            name: "get_performance_stats",
            description: "Report operation timings, pool usage and config",
            input_schema: empty_schema.clone(),
        },
        ToolDefinition {
            name: "health_check",
            description: "Probe upstream API reachability and credentials",
            input_schema: empty_schema,
        },
    ]
}
