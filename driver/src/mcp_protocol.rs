//! JSON-RPC-over-stdio tool server exposing the single `interactive_shell`
//! driver tool (spec.md §4.4, §6) plus a `interactive_shell_backend_info`
//! capability query (SPEC_FULL.md supplemented feature).
//!
//! Framing and dispatch are grounded in the teacher's
//! `maestro-mcp-server::mcp_protocol` (line-delimited JSON-RPC 2.0 over
//! stdin/stdout, notifications silently dropped, `tools/call` routed by
//! tool name).

use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use interactive_shell_engine::driver_api::DriverApi;
use interactive_shell_engine::types::{QueryRequest, ReadOptions, SessionMode, SettingsUpdate, StartRequest};

#[derive(Debug, Error)]
pub enum McpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Request shape accepted by the single `interactive_shell` tool: the
/// union of every field in spec.md §4.4's `start` and `query` requests
/// (spec.md §6, "Driver tool surface").
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ToolArgs {
    // start fields
    command: Option<String>,
    cwd: Option<std::path::PathBuf>,
    name: Option<String>,
    reason: Option<String>,
    mode: Option<SessionMode>,
    hands_free: Option<bool>,
    timeout_ms: Option<u64>,
    handoff_preview: Option<bool>,
    handoff_snapshot: Option<bool>,
    auto_exit_on_quiet: bool,

    // query fields
    session_id: Option<String>,
    output_lines: Option<u32>,
    output_max_chars: Option<u32>,
    output_offset: Option<u64>,
    incremental: bool,
    drain: bool,
    input: Option<String>,
    input_keys: Vec<String>,
    input_hex: Vec<String>,
    input_paste: Option<String>,
    settings: Option<SettingsUpdate>,
    kill: bool,
}

/// The JSON-RPC/MCP tool server itself. Owns the `DriverApi`, which in
/// turn owns the `SessionRegistry` (spec.md §4.4).
pub struct McpServer {
    driver: DriverApi,
}

impl McpServer {
    pub fn new(driver: DriverApi) -> Self {
        Self { driver }
    }

    /// Run the server, reading JSON-RPC requests from stdin and writing
    /// responses to stdout, one line each (teacher: `McpServer::run`).
    pub async fn run(&self) -> Result<(), McpError> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(req) => req,
                Err(e) => {
                    log::warn!("failed to parse request: {e}");
                    continue;
                }
            };
            if let Some(response) = self.handle_request(&request).await {
                let output = serde_json::to_string(&response)?;
                writeln!(stdout, "{output}")?;
                stdout.flush()?;
            }
        }
        Ok(())
    }

    async fn handle_request(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone()?;

        let (result, error) = match request.method.as_str() {
            "initialize" => (Some(self.handle_initialize()), None),
            "tools/list" => (Some(self.handle_tools_list()), None),
            "tools/call" => match self.handle_tools_call(&request.params).await {
                Ok(result) => (Some(result), None),
                Err(message) => (None, Some(JsonRpcError { code: -32000, message })),
            },
            "ping" => (Some(json!({})), None),
            _ => (
                None,
                Some(JsonRpcError {
                    code: -32601,
                    message: format!("Method not found: {}", request.method),
                }),
            ),
        };

        Some(JsonRpcResponse { jsonrpc: "2.0".to_string(), id, result, error })
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": "interactive-shell-driver",
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    fn handle_tools_list(&self) -> Value {
        json!({
            "tools": [
                {
                    "name": "interactive_shell",
                    "description": "Supervise an interactive child process attached to a PTY: start it, read its output, send it input, or kill it.",
                    "inputSchema": interactive_shell_schema(),
                },
                {
                    "name": "interactive_shell_backend_info",
                    "description": "Report the terminal backend and engine version interactive_shell is running.",
                    "inputSchema": { "type": "object", "properties": {} },
                },
            ]
        })
    }

    async fn handle_tools_call(&self, params: &Value) -> Result<Value, String> {
        let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        match name {
            "interactive_shell" => self.call_interactive_shell(arguments).await,
            "interactive_shell_backend_info" => Ok(json!({
                "content": [{
                    "type": "text",
                    "text": format!("backend=vt100 engine={}", env!("CARGO_PKG_VERSION")),
                }],
                "details": { "backend": "vt100", "engineVersion": env!("CARGO_PKG_VERSION") },
            })),
            _ => Ok(json!({
                "content": [{ "type": "text", "text": format!("Unknown tool: {name}") }],
                "isError": true,
            })),
        }
    }

    async fn call_interactive_shell(&self, arguments: Value) -> Result<Value, String> {
        let args: ToolArgs = serde_json::from_value(arguments).map_err(|e| e.to_string())?;

        let has_command = args.command.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        if has_command {
            return self.run_start(args).await;
        }
        if args.session_id.is_some() {
            return self.run_query(args).await;
        }
        Ok(tool_error("invalid_arguments", "start requires a command, or query requires a sessionId"))
    }

    async fn run_start(&self, args: ToolArgs) -> Result<Value, String> {
        let mode = if args.hands_free == Some(true) { SessionMode::HandsFree } else { args.mode.unwrap_or(SessionMode::Interactive) };
        let req = StartRequest {
            command: args.command.unwrap_or_default(),
            cwd: args.cwd,
            name: args.name,
            reason: args.reason,
            mode,
            timeout_ms: args.timeout_ms,
            handoff_preview: args.handoff_preview,
            handoff_snapshot: args.handoff_snapshot,
            auto_exit_on_quiet: args.auto_exit_on_quiet,
        };
        match self.driver.start(req).await {
            Ok(result) => Ok(json!({
                "content": [{ "type": "text", "text": format!("session {} status={}", result.session_id, result.status) }],
                "details": result,
            })),
            Err(e) => Ok(tool_error(e.as_code_str(), &e.message)),
        }
    }

    async fn run_query(&self, args: ToolArgs) -> Result<Value, String> {
        let session_id = args.session_id.unwrap_or_default();
        let req = QueryRequest {
            session_id,
            read: ReadOptions {
                lines: args.output_lines,
                max_chars: args.output_max_chars,
                offset: args.output_offset,
                incremental: args.incremental,
                drain: args.drain,
            },
            input: args.input,
            input_keys: args.input_keys,
            input_hex: args.input_hex,
            input_paste: args.input_paste,
            settings: args.settings,
            kill: args.kill,
        };
        match self.driver.query(req).await {
            Ok(result) => Ok(json!({
                "content": [{ "type": "text", "text": format!("session {} state={:?}", result.session_id, result.state) }],
                "details": result,
            })),
            Err(e) => Ok(tool_error(e.as_code_str(), &e.message)),
        }
    }
}

fn tool_error(code: &str, message: &str) -> Value {
    json!({
        "content": [{ "type": "text", "text": message }],
        "isError": true,
        "error": code,
    })
}

/// JSON Schema for the `interactive_shell` tool's arguments: the union of
/// every field in spec.md §4.4 (start request fields + query request
/// fields), so a single tool call can do either depending on which are
/// present.
fn interactive_shell_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "command": { "type": "string", "description": "Shell-compatible command string to launch (start only)" },
            "cwd": { "type": "string", "description": "Working directory for the new session (start only)" },
            "name": { "type": "string" },
            "reason": { "type": "string" },
            "mode": { "type": "string", "enum": ["interactive", "hands_free"] },
            "handsFree": { "type": "boolean" },
            "timeoutMs": { "type": "integer" },
            "handoffPreview": { "type": "boolean" },
            "handoffSnapshot": { "type": "boolean" },
            "autoExitOnQuiet": { "type": "boolean" },

            "sessionId": { "type": "string", "description": "Existing session to query/control" },
            "outputLines": { "type": "integer", "minimum": 1, "maximum": 200 },
            "outputMaxChars": { "type": "integer", "minimum": 1, "maximum": 51200 },
            "outputOffset": { "type": "integer" },
            "incremental": { "type": "boolean" },
            "drain": { "type": "boolean" },
            "input": { "type": "string" },
            "inputKeys": { "type": "array", "items": { "type": "string" } },
            "inputHex": { "type": "array", "items": { "type": "string" } },
            "inputPaste": { "type": "string" },
            "settings": {
                "type": "object",
                "properties": {
                    "updateIntervalMs": { "type": "integer" },
                    "quietThresholdMs": { "type": "integer" },
                },
            },
            "kill": { "type": "boolean" },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use interactive_shell_engine::{Config, SessionRegistry};

    fn test_server() -> McpServer {
        McpServer::new(DriverApi::new(SessionRegistry::new(), Config::default()))
    }

    fn make_request(json: Value) -> JsonRpcRequest {
        serde_json::from_value(json).expect("invalid test request JSON")
    }

    #[tokio::test]
    async fn notification_without_id_returns_none() {
        let server = test_server();
        let request = make_request(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }));
        assert!(server.handle_request(&request).await.is_none());
    }

    #[tokio::test]
    async fn initialize_returns_capabilities() {
        let server = test_server();
        let request = make_request(json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" }));
        let response = server.handle_request(&request).await.unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "interactive-shell-driver");
    }

    #[tokio::test]
    async fn tools_list_includes_interactive_shell() {
        let server = test_server();
        let request = make_request(json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }));
        let response = server.handle_request(&request).await.unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        assert!(tools.iter().any(|t| t["name"] == "interactive_shell"));
        assert!(tools.iter().any(|t| t["name"] == "interactive_shell_backend_info"));
    }

    #[tokio::test]
    async fn unknown_method_returns_error() {
        let server = test_server();
        let request = make_request(json!({ "jsonrpc": "2.0", "id": 3, "method": "nope" }));
        let response = server.handle_request(&request).await.unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn start_then_query_round_trip() {
        let server = test_server();
        let start = make_request(json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": { "name": "interactive_shell", "arguments": { "command": "cat", "handsFree": true } }
        }));
        let response = server.handle_request(&start).await.unwrap();
        let details = response.result.unwrap()["details"].clone();
        assert_eq!(details["status"], "running");
        let session_id = details["sessionId"].as_str().unwrap().to_string();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let query = make_request(json!({
            "jsonrpc": "2.0", "id": 5, "method": "tools/call",
            "params": { "name": "interactive_shell", "arguments": { "sessionId": session_id } }
        }));
        let response = server.handle_request(&query).await.unwrap();
        let result = response.result.unwrap();
        assert!(result.get("isError").is_none(), "{result:?}");

        let kill = make_request(json!({
            "jsonrpc": "2.0", "id": 7, "method": "tools/call",
            "params": { "name": "interactive_shell", "arguments": { "sessionId": session_id, "kill": true } }
        }));
        server.handle_request(&kill).await.unwrap();
    }

    #[tokio::test]
    async fn missing_command_and_session_id_is_invalid_arguments() {
        let server = test_server();
        let request = make_request(json!({
            "jsonrpc": "2.0", "id": 6, "method": "tools/call",
            "params": { "name": "interactive_shell", "arguments": {} }
        }));
        let response = server.handle_request(&request).await.unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["error"], "invalid_arguments");
    }
}
