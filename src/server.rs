//! Dashboard HTTP server.
//!
//! Endpoints:
//!   GET  /            - HTML dashboard with refresh controls
//!   GET  /api/state   - Dashboard state as JSON
//!   GET  /api/health  - Health check
//!   POST /refresh     - Run a cycle now, then redirect to /
//!   POST /auto        - Flip auto-refresh, then redirect to /

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::logging::{log, obj, v_str, Domain, Level};
use crate::refresh::{lock, refresh_cycle, Pipeline, SharedController};
use crate::render::html::render_page;

/// Upper bound on a drained request body; the forms post nothing.
const MAX_BODY: usize = 64 * 1024;
/// Longest accepted request line or header line, newline included.
const MAX_LINE: usize = 8 * 1024;
const MAX_HEADERS: usize = 100;

pub struct ServerContext {
    pub controller: SharedController,
    pub pipeline: Arc<Pipeline>,
    pub refresh_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Page,
    State,
    Health,
    Refresh,
    ToggleAuto,
    NotFound,
}

pub fn route(method: &str, target: &str) -> Route {
    let path = target.split('?').next().unwrap_or("");
    match (method, path) {
        ("GET", "/") | ("GET", "/index.html") => Route::Page,
        ("GET", "/api/state") => Route::State,
        ("GET", "/api/health") => Route::Health,
        ("POST", "/refresh") => Route::Refresh,
        ("POST", "/auto") => Route::ToggleAuto,
        _ => Route::NotFound,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: &'static str,
    pub content_type: &'static str,
    pub location: Option<&'static str>,
    pub body: String,
}

impl Response {
    fn ok(content_type: &'static str, body: String) -> Self {
        Self {
            status: "200 OK",
            content_type,
            location: None,
            body,
        }
    }

    fn redirect_home() -> Self {
        Self {
            status: "303 See Other",
            content_type: "text/plain",
            location: Some("/"),
            body: String::new(),
        }
    }

    fn bad_request() -> Self {
        Self {
            status: "400 Bad Request",
            content_type: "text/plain",
            location: None,
            body: "Request head too large".to_string(),
        }
    }

    fn not_found() -> Self {
        Self {
            status: "404 Not Found",
            content_type: "text/plain",
            location: None,
            body: "Not Found".to_string(),
        }
    }

    pub fn to_http(&self) -> String {
        let location = self
            .location
            .map(|l| format!("Location: {}\r\n", l))
            .unwrap_or_default();
        format!(
            "HTTP/1.1 {}\r\n\
             Content-Type: {}\r\n\
             Cache-Control: no-store\r\n\
             {}\
             Connection: close\r\n\
             Content-Length: {}\r\n\r\n{}",
            self.status,
            self.content_type,
            location,
            self.body.len(),
            self.body
        )
    }
}

pub async fn respond(ctx: &ServerContext, route: Route) -> Response {
    match route {
        Route::Page => {
            let page = {
                let controller = lock(&ctx.controller);
                let meta = controller.page_meta(ctx.refresh_secs, true);
                render_page(controller.current_view(), &meta)
            };
            Response::ok("text/html; charset=utf-8", page)
        }
        Route::State => {
            let body = {
                let controller = lock(&ctx.controller);
                serde_json::to_string(controller.state())
                    .unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string())
            };
            Response::ok("application/json", body)
        }
        Route::Health => Response::ok("application/json", r#"{"status":"ok"}"#.to_string()),
        Route::Refresh => {
            refresh_cycle(&ctx.controller, &ctx.pipeline).await;
            Response::redirect_home()
        }
        Route::ToggleAuto => {
            lock(&ctx.controller).toggle_auto_refresh();
            Response::redirect_home()
        }
        Route::NotFound => Response::not_found(),
    }
}

/// Accept loop. Each connection is served on its own task.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>) -> Result<()> {
    let addr = listener.local_addr()?;
    log(
        Level::Info,
        Domain::Server,
        "listening",
        obj(&[("addr", v_str(&addr.to_string()))]),
    );
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                log(
                    Level::Warn,
                    Domain::Server,
                    "accept_failed",
                    obj(&[("error", v_str(&e.to_string()))]),
                );
                continue;
            }
        };
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &ctx).await {
                log(
                    Level::Debug,
                    Domain::Server,
                    "connection_error",
                    obj(&[
                        ("peer", v_str(&peer.to_string())),
                        ("error", v_str(&e.to_string())),
                    ]),
                );
            }
        });
    }
}

/// Parsed request line plus the one header the server cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestHead {
    Request {
        method: String,
        target: String,
        content_length: usize,
    },
    /// Peer closed before sending a request line.
    Closed,
    /// A line exceeded `MAX_LINE` or there were more than `MAX_HEADERS` headers.
    TooLarge,
}

/// Read one line of at most `MAX_LINE` bytes. `None` means the cap was hit.
async fn read_capped_line<R>(reader: &mut R, buf: &mut String) -> std::io::Result<Option<usize>>
where
    R: AsyncBufRead + Unpin,
{
    let n = (&mut *reader).take(MAX_LINE as u64).read_line(buf).await?;
    if n == MAX_LINE && !buf.ends_with('\n') {
        return Ok(None);
    }
    Ok(Some(n))
}

pub async fn read_head<R>(reader: &mut R) -> std::io::Result<RequestHead>
where
    R: AsyncBufRead + Unpin,
{
    let mut request_line = String::new();
    match read_capped_line(reader, &mut request_line).await? {
        None => return Ok(RequestHead::TooLarge),
        Some(0) => return Ok(RequestHead::Closed),
        Some(_) => {}
    }

    let mut content_length = 0usize;
    let mut seen = 0usize;
    loop {
        let mut header = String::new();
        match read_capped_line(reader, &mut header).await? {
            None => return Ok(RequestHead::TooLarge),
            Some(0) => break,
            Some(_) => {}
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        seen += 1;
        if seen > MAX_HEADERS {
            return Ok(RequestHead::TooLarge);
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut parts = request_line.split_whitespace();
    Ok(RequestHead::Request {
        method: parts.next().unwrap_or("").to_string(),
        target: parts.next().unwrap_or("").to_string(),
        content_length,
    })
}

async fn handle_connection(stream: TcpStream, ctx: &ServerContext) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let (method, target, content_length) = match read_head(&mut reader).await? {
        RequestHead::Closed => return Ok(()),
        RequestHead::TooLarge => {
            log(Level::Warn, Domain::Server, "request_too_large", obj(&[]));
            writer.write_all(Response::bad_request().to_http().as_bytes()).await?;
            writer.shutdown().await?;
            return Ok(());
        }
        RequestHead::Request {
            method,
            target,
            content_length,
        } => (method, target, content_length),
    };
    if content_length > 0 {
        let mut body = vec![0u8; content_length.min(MAX_BODY)];
        reader.read_exact(&mut body).await?;
    }

    let response = respond(ctx, route(&method, &target)).await;
    log(
        Level::Debug,
        Domain::Server,
        "request",
        obj(&[
            ("method", v_str(&method)),
            ("path", v_str(&target)),
            ("status", v_str(response.status)),
        ]),
    );

    writer.write_all(response.to_http().as_bytes()).await?;
    writer.shutdown().await?;
    Ok(())
}
