use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{Notifier, PaymentProcessor, RandomnessSource};
use crate::use_cases::{DrawUseCase, EntryUseCase, ResultsUseCase};

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, serde::Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    pub id: Option<Value>,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

#[derive(Debug, serde::Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

#[derive(Debug, serde::Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, serde::Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id: Some(id.unwrap_or(json!(1))),
        }
    }

    fn failure(id: Option<Value>, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data,
            }),
            id,
        }
    }
}

pub struct MCPHandler<R, P, N> {
    draw_use_case: Arc<DrawUseCase<R, P, N>>,
    results_use_case: Arc<ResultsUseCase>,
    entry_use_case: Arc<EntryUseCase>,
}

impl<R, P, N> MCPHandler<R, P, N>
where
    R: RandomnessSource,
    P: PaymentProcessor,
    N: Notifier,
{
    pub fn new(
        draw_use_case: Arc<DrawUseCase<R, P, N>>,
        results_use_case: Arc<ResultsUseCase>,
        entry_use_case: Arc<EntryUseCase>,
    ) -> Self {
        Self {
            draw_use_case,
            results_use_case,
            entry_use_case,
        }
    }

    pub async fn serve<I, O>(self, reader: I, mut writer: O) -> Result<()>
    where
        I: BufRead,
        O: Write,
    {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(req) => req,
                Err(e) => {
                    warn!("Failed to parse request: {} - Line: {}", e, line);
                    let error_response = JsonRpcResponse::failure(
                        None,
                        PARSE_ERROR,
                        "Parse error".to_string(),
                        Some(json!(e.to_string())),
                    );
                    writeln!(writer, "{}", serde_json::to_string(&error_response)?)?;
                    writer.flush()?;
                    continue;
                }
            };

            // Notifications get no response
            if request.id.is_none() || request.method.starts_with("notifications/") {
                if request.method == "notifications/initialized" {
                    info!("🎟️ Client initialized");
                }
                continue;
            }

            let response = self.handle_request(request).await;
            writeln!(writer, "{}", serde_json::to_string(&response)?)?;
            writer.flush()?;
        }

        Ok(())
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => {
                info!("🎟️ Initializing club lotto server");
                JsonRpcResponse::success(
                    request.id,
                    json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": {
                            "tools": {}
                        },
                        "serverInfo": {
                            "name": "club-lotto-server",
                            "version": env!("CARGO_PKG_VERSION")
                        }
                    }),
                )
            }
            "tools/list" => JsonRpcResponse::success(request.id, json!({ "tools": tools() })),
            "tools/call" => self.handle_call_tool(request.params, request.id).await,
            _ => JsonRpcResponse::failure(
                Some(request.id.unwrap_or(json!(1))),
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
                None,
            ),
        }
    }

    async fn handle_call_tool(&self, params: Option<Value>, id: Option<Value>) -> JsonRpcResponse {
        let id = Some(id.unwrap_or(json!(1)));
        let Some(params) = params else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing params".to_string(), None);
        };
        let Some(tool_name) = params.get("name").and_then(|n| n.as_str()) else {
            return JsonRpcResponse::failure(
                id,
                INVALID_PARAMS,
                "Missing tool name".to_string(),
                None,
            );
        };

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let arguments_map: HashMap<String, Value> =
            serde_json::from_value(arguments).unwrap_or_default();

        match self.execute_tool(tool_name, &arguments_map).await {
            Ok(content) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [
                        {
                            "type": "text",
                            "text": content
                        }
                    ]
                }),
            ),
            Err(e) => {
                warn!("Tool {} failed: {}", tool_name, e);
                JsonRpcResponse::failure(
                    id,
                    INTERNAL_ERROR,
                    format!("Tool execution error: {}", e),
                    None,
                )
            }
        }
    }

    async fn execute_tool(
        &self,
        tool_name: &str,
        arguments: &HashMap<String, Value>,
    ) -> Result<String> {
        match tool_name {
            "settle_draw" => self.draw_use_case.settle_draw(arguments).await,
            "verify_draw" => self.draw_use_case.verify_draw(arguments).await,
            "get_draw_by_date" => self.results_use_case.get_draw_by_date(arguments).await,
            "get_results_for_draw" => self.results_use_case.get_results_for_draw(arguments).await,
            "get_latest_draws" => self.results_use_case.get_latest_draws(arguments).await,
            "get_next_draw_date" => self.results_use_case.get_next_draw_date(arguments).await,
            "init_next_draw_date" => self.results_use_case.init_next_draw_date(arguments).await,
            "create_entry" => self.entry_use_case.create_entry(arguments).await,
            "purchase_one_off" => self.entry_use_case.purchase_one_off(arguments).await,
            "start_subscription" => self.entry_use_case.start_subscription(arguments).await,
            "cancel_subscription" => self.entry_use_case.cancel_subscription(arguments).await,
            "get_entries_for_user" => self.entry_use_case.get_entries_for_user(arguments).await,
            _ => Err(anyhow::anyhow!("Unknown tool: {}", tool_name)),
        }
    }
}

fn string_param_schema(name: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            name: {
                "type": "string",
                "description": description
            }
        },
        "required": [name]
    })
}

fn lines_schema() -> Value {
    json!({
        "type": "array",
        "description": "Ticket lines, each four distinct numbers from 1 to 32",
        "items": {
            "type": "array",
            "items": {"type": "integer", "minimum": 1, "maximum": 32},
            "minItems": 4,
            "maxItems": 4
        }
    })
}

fn tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "settle_draw",
            description: "Draw the winning numbers for a date, record winners, notify them and renew subscriptions",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "draw_date": {
                        "type": "string",
                        "description": "Draw date in YYYY-MM-DD format"
                    },
                    "jackpot_pence": {
                        "type": "integer",
                        "description": "Jackpot amount in pence"
                    },
                    "is_test": {
                        "type": "boolean",
                        "description": "Test draws skip the next-date update and renewals (default: false)"
                    }
                },
                "required": ["draw_date", "jackpot_pence"]
            }),
        },
        Tool {
            name: "verify_draw",
            description: "Check a draw's randomness signature with the randomness service",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "draw_id": {"type": "integer", "description": "Draw id"}
                },
                "required": ["draw_id"]
            }),
        },
        Tool {
            name: "get_draw_by_date",
            description: "Get the draw held on a specific date",
            input_schema: string_param_schema("date", "Date in YYYY-MM-DD format"),
        },
        Tool {
            name: "get_results_for_draw",
            description: "List the winning results of a draw",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "draw_id": {"type": "integer", "description": "Draw id"}
                },
                "required": ["draw_id"]
            }),
        },
        Tool {
            name: "get_latest_draws",
            description: "Get the most recent draws",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "description": "Number of draws to return (default: 10)"
                    }
                }
            }),
        },
        Tool {
            name: "get_next_draw_date",
            description: "Get the date of the next draw",
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        Tool {
            name: "init_next_draw_date",
            description: "Set the first draw date on a new database",
            input_schema: string_param_schema("date", "Date in YYYY-MM-DD format"),
        },
        Tool {
            name: "create_entry",
            description: "Create a single entry for a draw",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "numbers": {
                        "type": "array",
                        "items": {"type": "integer", "minimum": 1, "maximum": 32},
                        "minItems": 4,
                        "maxItems": 4
                    },
                    "draw_date": {"type": "string", "description": "Date in YYYY-MM-DD format"},
                    "line_number": {"type": "integer", "description": "Line number (default: 1)"},
                    "subscription_id": {"type": "string"},
                    "payment_ref": {"type": "string", "description": "Payment reference, used to ignore retries"}
                },
                "required": ["user_id", "numbers", "draw_date"]
            }),
        },
        Tool {
            name: "purchase_one_off",
            description: "Enter paid one-off lines in the next draw",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "payment_ref": {"type": "string"},
                    "lines": lines_schema()
                },
                "required": ["user_id", "payment_ref", "lines"]
            }),
        },
        Tool {
            name: "start_subscription",
            description: "Record a new recurring subscription and enter its lines in the next draw",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "subscription_id": {"type": "string", "description": "Payment processor subscription id"},
                    "customer_id": {"type": "string"},
                    "lines": lines_schema()
                },
                "required": ["user_id", "subscription_id", "customer_id", "lines"]
            }),
        },
        Tool {
            name: "cancel_subscription",
            description: "Cancel a subscription and withdraw its lines from undrawn draws",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "subscription_id": {"type": "string"},
                    "reason": {"type": "string", "description": "Who canceled: user or processor"}
                },
                "required": ["subscription_id"]
            }),
        },
        Tool {
            name: "get_entries_for_user",
            description: "List a user's entries",
            input_schema: string_param_schema("user_id", "User id"),
        },
    ]
}

pub fn stdio() -> (BufReader<io::Stdin>, io::Stdout) {
    (BufReader::new(io::stdin()), io::stdout())
}
