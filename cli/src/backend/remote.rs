//! WebSocket backend: talks to a running `serve` process using the wire
//! protocol it exposes.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serve::{ClientRequest, PingRequest, RunRequest, ServerResponse, ToolShowRequest, ToolsListRequest};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::{tool_cmd, RunError, RunOptions, ToolShowFormat};

use super::{RunBackend, RunOutput, StreamOut};

const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Max time to wait for each server message; a run can take a long time
/// while the LLM streams its reply.
const READ_TIMEOUT_SECS: u64 = 300;

pub struct RemoteBackend {
    url: String,
}

impl RemoteBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    async fn connect(&self) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, RunError> {
        let (ws, _) = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            connect_async(&self.url),
        )
        .await
        .map_err(|_| RunError::Remote("connect timeout".to_string()))?
        .map_err(|e| RunError::Remote(e.to_string()))?;
        Ok(ws)
    }
}

fn next_id() -> String {
    format!(
        "req-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis()
    )
}

#[async_trait]
impl RunBackend for RemoteBackend {
    async fn run(&self, opts: &RunOptions, stream_out: StreamOut) -> Result<RunOutput, RunError> {
        let ws = self.connect().await?;
        let (mut write, mut read) = ws.split();

        let id = next_id();
        let req = ClientRequest::Run(RunRequest {
            id: id.clone(),
            agent_id: opts.agent_id.clone(),
            session_id: opts.session_id.clone(),
            message: opts.message.clone(),
            thread_id: opts.thread_id.clone(),
        });
        let json = serde_json::to_string(&req).map_err(|e| RunError::Remote(e.to_string()))?;
        write.send(Message::Text(json)).await.map_err(|e| RunError::Remote(e.to_string()))?;

        let mut reply = None;
        let mut events: Vec<serde_json::Value> = Vec::new();
        let read_timeout = Duration::from_secs(READ_TIMEOUT_SECS);
        loop {
            let next = tokio::time::timeout(read_timeout, read.next()).await;
            let res = match next {
                Ok(Some(r)) => r,
                Ok(None) => break,
                Err(_) => return Err(RunError::Remote("read timeout (no response from server)".to_string())),
            };
            let msg = res.map_err(|e| RunError::Remote(e.to_string()))?;
            if !msg.is_text() {
                continue;
            }
            let text = msg.to_text().unwrap_or("");
            let resp: ServerResponse =
                serde_json::from_str(text).map_err(|e| RunError::Remote(e.to_string()))?;
            match resp {
                ServerResponse::RunStreamEvent(r) if r.id == id => {
                    if let Some(ref out) = stream_out {
                        if let Ok(mut f) = out.lock() {
                            f(r.event);
                        }
                    } else {
                        events.push(r.event);
                    }
                }
                ServerResponse::RunEnd(r) if r.id == id => {
                    reply = Some(r.content);
                    break;
                }
                ServerResponse::Error(e) if e.id.as_deref() == Some(&id) => {
                    return Err(RunError::Remote(e.error));
                }
                _ => {}
            }
        }
        let reply = reply.ok_or_else(|| RunError::Remote("no run_end received".to_string()))?;
        Ok(if stream_out.is_some() {
            RunOutput::Reply(reply)
        } else if opts.output_json {
            RunOutput::Json { events, reply }
        } else {
            RunOutput::Reply(reply)
        })
    }

    async fn list_tools(&self, output_json: bool) -> Result<(), RunError> {
        let ws = self.connect().await?;
        let (mut write, mut read) = ws.split();

        let id = next_id();
        let req = ClientRequest::ToolsList(ToolsListRequest { id: id.clone() });
        let json = serde_json::to_string(&req).map_err(|e| RunError::Remote(e.to_string()))?;
        write.send(Message::Text(json)).await.map_err(|e| RunError::Remote(e.to_string()))?;

        while let Some(res) = read.next().await {
            let msg = res.map_err(|e| RunError::Remote(e.to_string()))?;
            if !msg.is_text() {
                continue;
            }
            let text = msg.to_text().unwrap_or("");
            let resp: ServerResponse =
                serde_json::from_str(text).map_err(|e| RunError::Remote(e.to_string()))?;
            match resp {
                ServerResponse::ToolsList(r) if r.id == id => {
                    return tool_cmd::print_tools_list(&r.tools, output_json);
                }
                ServerResponse::Error(e) if e.id.as_deref() == Some(&id) => {
                    return Err(RunError::Remote(e.error));
                }
                _ => {}
            }
        }
        Err(RunError::Remote("no tools_list received".to_string()))
    }

    async fn show_tool(&self, name: &str, format: ToolShowFormat) -> Result<(), RunError> {
        let ws = self.connect().await?;
        let (mut write, mut read) = ws.split();

        let id = next_id();
        let req = ClientRequest::ToolShow(ToolShowRequest { id: id.clone(), name: name.to_string() });
        let json = serde_json::to_string(&req).map_err(|e| RunError::Remote(e.to_string()))?;
        write.send(Message::Text(json)).await.map_err(|e| RunError::Remote(e.to_string()))?;

        while let Some(res) = read.next().await {
            let msg = res.map_err(|e| RunError::Remote(e.to_string()))?;
            if !msg.is_text() {
                continue;
            }
            let text = msg.to_text().unwrap_or("");
            let resp: ServerResponse =
                serde_json::from_str(text).map_err(|e| RunError::Remote(e.to_string()))?;
            match resp {
                ServerResponse::ToolShow(r) if r.id == id => {
                    let tool = r.tool.ok_or_else(|| RunError::ToolNotFound(name.to_string()))?;
                    return tool_cmd::print_tool_show(&tool, format);
                }
                ServerResponse::Error(e) if e.id.as_deref() == Some(&id) => {
                    return Err(RunError::Remote(e.error));
                }
                _ => {}
            }
        }
        Err(RunError::Remote("no tool_show received".to_string()))
    }
}

/// Pings a running server and waits for `Pong`; used by `ensure_server_or_spawn`'s caller to confirm readiness.
#[allow(dead_code)]
pub(crate) async fn ping(url: &str) -> Result<(), RunError> {
    let (ws, _) = connect_async(url).await.map_err(|e| RunError::Remote(e.to_string()))?;
    let (mut write, mut read) = ws.split();
    let id = next_id();
    let req = ClientRequest::Ping(PingRequest { id: id.clone() });
    let json = serde_json::to_string(&req).map_err(|e| RunError::Remote(e.to_string()))?;
    write.send(Message::Text(json)).await.map_err(|e| RunError::Remote(e.to_string()))?;
    while let Some(res) = read.next().await {
        let msg = res.map_err(|e| RunError::Remote(e.to_string()))?;
        if !msg.is_text() {
            continue;
        }
        if let Ok(ServerResponse::Pong(p)) = serde_json::from_str(msg.to_text().unwrap_or("")) {
            if p.id == id {
                return Ok(());
            }
        }
    }
    Err(RunError::Remote("no pong received".to_string()))
}

