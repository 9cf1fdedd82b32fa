//! Development server.
//!
//! Built on `tiny_http`, one request at a time:
//!
//! - `/api/articles` reads and writes block-format articles on disk
//! - `/collections/<name>.json` serves the latest completed build from memory
//! - file watching and auto-rebuild (via `watch` module)
//! - graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Watcher Thread  │
//! │  (HTTP Server)  │     │  (File Monitor)  │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!          ▼                       ▼
//!   builder.latest()  ◄──── build_site(builder)
//! ```

use crate::{
    articles::{ArticleError, ArticleStore},
    build::{BuildState, Builder, INDEX_FILE, error_chain, index_json},
    config::LoamConfig,
    content::Record,
    log,
    watch::watch_for_changes_blocking,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use tiny_http::{Header, Method, Request, Response, Server};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

const ARTICLES_ROUTE: &str = "/api/articles";
const COLLECTIONS_PREFIX: &str = "/collections/";

/// Status code and JSON body of a handled request.
type Reply = (u16, Value);

// ============================================================================
// Server Entry Point
// ============================================================================

/// Start the development server with optional file watching.
///
/// Blocks until Ctrl+C is received.
pub fn serve_site(config: &'static LoamConfig, builder: Arc<Builder>) -> Result<()> {
    let interface: std::net::IpAddr = config.serve.interface.parse()?;
    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    // Set up Ctrl+C handler for graceful shutdown; a running pass is discarded
    let server_for_signal = Arc::clone(&server);
    let builder_for_signal = Arc::clone(&builder);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        builder_for_signal.cancel();
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    let store = ArticleStore::new(config.articles_dir());
    log!("serve"; "http://{}", addr);
    log!("serve"; "articles: http://{}{}", addr, ARTICLES_ROUTE);

    if config.serve.watch {
        let builder = Arc::clone(&builder);
        std::thread::spawn(move || {
            if let Err(err) = watch_for_changes_blocking(config, &builder) {
                log!("watch"; "{err}");
            }
        });
    }

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, &store, &builder) {
            log!("serve"; "request error: {e}");
        }
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: std::net::IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(anyhow::anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Request Handling
// ============================================================================

fn handle_request(mut request: Request, store: &ArticleStore, builder: &Builder) -> Result<()> {
    let mut body = Vec::new();
    request
        .as_reader()
        .read_to_end(&mut body)
        .context("Failed to read request body")?;

    let method = request.method().clone();
    let url = request.url().to_owned();
    let (status, reply) = route(&method, &url, &body, store, builder);

    if status >= 400 || method != Method::Get {
        log!("api"; "{} {} -> {}", method, url, status);
    }
    respond_json(request, status, &reply)
}

/// Dispatch by path. Every outcome is a JSON reply.
fn route(method: &Method, url: &str, body: &[u8], store: &ArticleStore, builder: &Builder) -> Reply {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let path = urlencoding::decode(path)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| path.to_owned());
    let path = path.trim_end_matches('/');

    if path == ARTICLES_ROUTE {
        return route_articles(method, query, body, store);
    }
    if let Some(file) = path.strip_prefix(COLLECTIONS_PREFIX) {
        if *method != Method::Get {
            return method_not_allowed();
        }
        return route_collection(file, builder);
    }
    error(404, "Not found")
}

fn route_collection(file: &str, builder: &Builder) -> Reply {
    let Some(site) = builder.latest() else {
        let message = match builder.state() {
            BuildState::Failed(message) => format!("No successful build yet: {message}"),
            _ => "No build has completed yet".to_owned(),
        };
        return (503, json!({ "error": message }));
    };

    if file == INDEX_FILE {
        return (200, index_json(&site));
    }

    let collection = file
        .strip_suffix(".json")
        .and_then(|name| site.get(name));
    match collection {
        Some(collection) => (200, json!(collection)),
        None => error(404, "Collection not found"),
    }
}

// ============================================================================
// Article API
// ============================================================================

#[derive(Debug, Deserialize)]
struct SaveRequest {
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    meta: Option<Value>,
}

/// `/api/articles`: list, read, save and delete block-format articles.
fn route_articles(method: &Method, query: &str, body: &[u8], store: &ArticleStore) -> Reply {
    match method {
        Method::Get => match query_param(query, "slug").filter(|slug| !slug.is_empty()) {
            Some(slug) => match store.get(&slug) {
                Ok(Some(article)) => (200, json!(article)),
                Ok(None) => error(404, "Article not found"),
                Err(err) => store_failure(&err, "Failed to read article"),
            },
            None => match store.list() {
                Ok(articles) => (200, json!({ "articles": articles })),
                Err(err) => store_failure(&err, "Failed to list articles"),
            },
        },
        Method::Post => save_article(body, store),
        Method::Delete => match query_param(query, "slug").filter(|slug| !slug.is_empty()) {
            Some(slug) => match store.delete(&slug) {
                Ok(()) => (200, json!({ "success": true })),
                Err(err) => store_failure(&err, "Failed to delete article"),
            },
            None => error(400, "Slug is required"),
        },
        _ => method_not_allowed(),
    }
}

fn save_article(body: &[u8], store: &ArticleStore) -> Reply {
    let Ok(request) = serde_json::from_slice::<SaveRequest>(body) else {
        return error(400, "Invalid JSON body");
    };
    let Some(slug) = request.slug.filter(|slug| !slug.is_empty()) else {
        return error(400, "Slug is required");
    };
    let Some(content) = request.content.filter(|content| !content.is_null()) else {
        return error(400, "Content is required");
    };
    let meta: Option<Record> = match request.meta {
        None | Some(Value::Null) => None,
        Some(Value::Object(meta)) => Some(meta),
        Some(_) => return error(400, "Meta must be an object"),
    };

    match store.save(&slug, &content, meta.as_ref()) {
        Ok(()) => (200, json!({ "success": true, "slug": slug })),
        Err(err) => store_failure(&err, "Failed to save article"),
    }
}

/// Invalid slugs are the caller's fault; everything else is logged and hidden.
fn store_failure(err: &ArticleError, message: &str) -> Reply {
    match err {
        ArticleError::InvalidSlug(_) => error(400, "Invalid slug"),
        _ => {
            log!("api"; "{}", error_chain(err));
            error(500, message)
        }
    }
}

/// First value of `name` in a query string, percent-decoded.
fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key) == name).then(|| decode_component(value))
        })
        .next()
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or(raw)
}

// ============================================================================
// Response Helpers
// ============================================================================

fn error(status: u16, message: &str) -> Reply {
    (status, json!({ "error": message }))
}

fn method_not_allowed() -> Reply {
    error(405, "Method not allowed")
}

fn respond_json(request: Request, status: u16, body: &Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(body)?;
    let mut response = Response::from_data(bytes).with_status_code(status);
    if let Ok(header) = Header::from_bytes("Content-Type", "application/json; charset=utf-8") {
        response.add_header(header);
    }
    request.respond(response)?;
    Ok(())
}
