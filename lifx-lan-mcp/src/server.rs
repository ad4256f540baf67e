//! The MCP server: one [`ServerHandler`] serving the light tools, reachable
//! over stdio or over streamable HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use lifx_lan_lib::dispatch::CommandDispatcher;
use log::{info, warn};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam,
    ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::StreamableHttpService;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, ServiceExt};
use serde_json::Value;

use crate::tools::{handle_tool_call, tool_definitions};

/// Route the streamable HTTP transport is mounted on.
pub const MCP_PATH: &str = "/mcp";

#[derive(Clone)]
pub struct LightService {
    dispatcher: Arc<CommandDispatcher>,
}

impl LightService {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl ServerHandler for LightService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            instructions: Some(
                "Controls LIFX lights on the local network. Call lifx_lan_list_lights first \
                 to learn the labels, then address lights by label."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: tool_definitions(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        info!("Calling tool {}", request.name);
        let arguments = request.arguments.map(Value::Object).unwrap_or(Value::Null);
        let result = handle_tool_call(&request.name, &arguments, &self.dispatcher).await;
        if result.is_error {
            warn!("Tool {} failed: {}", request.name, result.text);
        }
        Ok(result.into())
    }
}

/// Serves one MCP session on stdin/stdout until the client disconnects.
pub async fn serve_stdio(dispatcher: Arc<CommandDispatcher>) -> anyhow::Result<()> {
    info!("LIFX LAN MCP server running on stdio");
    let service = LightService::new(dispatcher)
        .serve(stdio())
        .await
        .context("Failed to start the MCP session on stdio")?;
    let reason = service.waiting().await?;
    info!("MCP session ended: {:?}", reason);
    Ok(())
}

/// Builds the HTTP application: the streamable MCP transport at [`MCP_PATH`],
/// one session per client.
pub fn http_router(dispatcher: Arc<CommandDispatcher>) -> Router {
    let service = StreamableHttpService::new(
        move || Ok(LightService::new(Arc::clone(&dispatcher))),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    Router::new().nest_service(MCP_PATH, service)
}

/// Serves MCP over HTTP on `port` until the process is stopped.
pub async fn serve_http(dispatcher: Arc<CommandDispatcher>, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    eprintln!("===WARNING===");
    eprintln!(
        "Running an MCP server over HTTP without authentication is very dangerous. \
         Use at your own risk"
    );
    eprintln!("LIFX LAN MCP server running on http://{}{}", addr, MCP_PATH);

    axum::serve(listener, http_router(dispatcher)).await?;
    Ok(())
}
