use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use multipart::server::Multipart;
use serde::Deserialize;
use serde_json::{Value, json};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::transfer::client::{Client, Outcome};
use crate::transfer::core::{FileStore, TransferError, is_plain_name};

const INDEX_HTML: &str = include_str!("index.html");
const GET_FILE_PREFIX: &str = "/api/get-file/";
const DELETE_PREFIX: &str = "/api/delete/";
const STATUS_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything a request handler may touch.
pub(super) struct State {
    pub client: Client,
    pub store_dir: PathBuf,
    pub staging_dir: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Index,
    Files,
    Download,
    GetFile(String),
    ServerStatus,
    Upload,
    Delete(String),
    Preflight,
    MethodNotAllowed,
    Unknown,
}

impl Route {
    fn parse(method: &Method, url: &str) -> Route {
        let path = url.split('?').next().unwrap_or("");
        if *method == Method::Options {
            return Route::Preflight;
        }

        match (method, path) {
            (Method::Get, "/") | (Method::Get, "/index.html") => Route::Index,
            (Method::Get, "/api/files") => Route::Files,
            (Method::Post, "/api/download") => Route::Download,
            (Method::Get, "/api/server-status") => Route::ServerStatus,
            (Method::Post, "/api/upload") => Route::Upload,
            (Method::Get, p) if p.starts_with(GET_FILE_PREFIX) => {
                decode_segment(&p[GET_FILE_PREFIX.len()..]).map_or(Route::Unknown, Route::GetFile)
            }
            (Method::Delete, p) if p.starts_with(DELETE_PREFIX) => {
                decode_segment(&p[DELETE_PREFIX.len()..]).map_or(Route::Unknown, Route::Delete)
            }
            (_, "/" | "/api/files" | "/api/download" | "/api/server-status" | "/api/upload") => {
                Route::MethodNotAllowed
            }
            (_, p) if p.starts_with(GET_FILE_PREFIX) || p.starts_with(DELETE_PREFIX) => {
                Route::MethodNotAllowed
            }
            _ => Route::Unknown,
        }
    }
}

fn decode_segment(raw: &str) -> Option<String> {
    urlencoding::decode(raw).ok().map(|s| s.into_owned())
}

fn query_param(url: &str, key: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| decode_segment(&v.replace('+', " ")))
}

fn header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name, value).map_err(|_| anyhow!("Invalid header {}: {}", name, value))
}

fn with_cors<R: Read>(response: Response<R>) -> Result<Response<R>> {
    Ok(response.with_header(header("Access-Control-Allow-Origin", "*")?))
}

fn respond_json(request: Request, status: u16, body: Value) -> Result<()> {
    let response = Response::from_data(body.to_string())
        .with_status_code(StatusCode(status))
        .with_header(header("Content-Type", "application/json")?);
    request.respond(with_cors(response)?)?;
    Ok(())
}

fn error_body(message: impl Into<String>) -> Value {
    json!({ "status": "error", "message": message.into() })
}

/// Answer a single HTTP request.
pub(super) fn handle(mut request: Request, state: &State) -> Result<()> {
    let route = Route::parse(request.method(), request.url());
    debug!("{} {} -> {:?}", request.method(), request.url(), route);

    let body = match route {
        Route::Index => {
            let response = Response::from_string(INDEX_HTML)
                .with_header(header("Content-Type", "text/html; charset=utf-8")?);
            request.respond(response)?;
            return Ok(());
        }
        Route::Preflight => {
            let response = Response::empty(StatusCode(204))
                .with_header(header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")?)
                .with_header(header(
                    "Access-Control-Allow-Headers",
                    "Content-Type, X-Filename",
                )?);
            request.respond(with_cors(response)?)?;
            return Ok(());
        }
        Route::GetFile(name) => return serve_staged(request, state, &name),
        Route::Unknown => return respond_json(request, 404, error_body("Not found")),
        Route::MethodNotAllowed => {
            return respond_json(request, 405, error_body("Method not allowed"));
        }
        Route::Files => list_files(&state.store_dir),
        Route::Download => download(&mut request, state),
        Route::ServerStatus => server_status(&state.client),
        Route::Upload => upload(&mut request, &state.store_dir),
        Route::Delete(name) => delete(&state.store_dir, &name),
    };

    respond_json(request, 200, body)
}

fn list_files(store_dir: &Path) -> Value {
    if !store_dir.is_dir() {
        return json!({
            "status": "error",
            "message": "Server files directory not found",
            "files": [],
        });
    }

    let listed = FileStore::open(store_dir).and_then(|store| store.list());
    match listed {
        Ok(files) => {
            let files: Vec<Value> = files
                .iter()
                .map(|f| {
                    json!({
                        "name": f.name,
                        "size": f.size,
                        "size_formatted": format_size(f.size),
                    })
                })
                .collect();
            json!({ "status": "success", "count": files.len(), "files": files })
        }
        Err(e) => json!({ "status": "error", "message": e.to_string(), "files": [] }),
    }
}

#[derive(Deserialize)]
struct DownloadBody {
    #[serde(default)]
    filename: Option<String>,
}

fn download(request: &mut Request, state: &State) -> Value {
    let mut raw = String::new();
    if let Err(e) = request.as_reader().read_to_string(&mut raw) {
        return error_body(format!("Failed to read request: {}", e));
    }

    let filename = serde_json::from_str::<DownloadBody>(&raw)
        .ok()
        .and_then(|body| body.filename)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    let Some(filename) = filename else {
        return error_body("Filename is required");
    };

    let Some(staged_name) = Path::new(&filename)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
    else {
        return error_body(TransferError::InvalidName(filename).to_string());
    };

    let destination = state.staging_dir.join(&staged_name);
    info!("Web download of {} into {}", filename, destination.display());

    match state.client.download(&filename, Some(&destination)) {
        Outcome::Success {
            bytes_transferred, ..
        } => json!({
            "status": "success",
            "message": "File ready for download",
            "filename": staged_name,
            "download_url": format!("{}{}", GET_FILE_PREFIX, urlencoding::encode(&staged_name)),
            "size": bytes_transferred,
        }),
        Outcome::Failure { reason } => json!({
            "status": "error",
            "kind": reason.kind().as_str(),
            "message": reason.to_string(),
            "filename": filename,
        }),
    }
}

fn serve_staged(request: Request, state: &State, name: &str) -> Result<()> {
    let path = state.staging_dir.join(name);
    if !is_plain_name(name) || !path.is_file() {
        return respond_json(request, 404, error_body("File not found"));
    }

    let file = std::fs::File::open(&path)?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let disposition = format!("attachment; filename=\"{}\"", name.replace('"', ""));
    let response = Response::from_file(file)
        .with_header(header("Content-Type", mime.as_ref())?)
        .with_header(header("Content-Disposition", &disposition)?);
    request.respond(with_cors(response)?)?;
    Ok(())
}

fn server_status(client: &Client) -> Value {
    let online = (client.host(), client.port())
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .is_some_and(|addr| TcpStream::connect_timeout(&addr, STATUS_CHECK_TIMEOUT).is_ok());

    json!({
        "status": if online { "online" } else { "offline" },
        "host": client.host(),
        "port": client.port(),
    })
}

fn request_header(request: &Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().trim().to_string())
}

/// Boundary of a `multipart/form-data` content type, if that is what it is.
fn multipart_boundary(content_type: &str) -> Option<String> {
    let mut parts = content_type.split(';');
    let essence = parts.next()?.trim();
    if !essence.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }

    parts
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
}

/// Accepts a browser form (`file` field) or a raw body named by the
/// `X-Filename` header or the `filename` query parameter.
fn upload(request: &mut Request, store_dir: &Path) -> Value {
    let boundary = request_header(request, "Content-Type")
        .as_deref()
        .and_then(multipart_boundary);
    if let Some(boundary) = boundary {
        return upload_form(request, boundary, store_dir);
    }

    let filename = request_header(request, "X-Filename")
        .or_else(|| query_param(request.url(), "filename"))
        .filter(|name| !name.is_empty());
    let Some(filename) = filename else {
        return error_body("Filename is required");
    };

    save_upload(store_dir, &filename, request.as_reader())
}

fn upload_form(request: &mut Request, boundary: String, store_dir: &Path) -> Value {
    let mut form = Multipart::with_body(request.as_reader(), boundary);
    loop {
        let mut field = match form.read_entry() {
            Ok(Some(field)) => field,
            Ok(None) => return error_body("No file provided"),
            Err(e) => return error_body(format!("Malformed upload: {}", e)),
        };
        if &*field.headers.name != "file" {
            continue;
        }

        let filename = field.headers.filename.clone().unwrap_or_default();
        if filename.is_empty() {
            return error_body("No file selected");
        }
        return save_upload(store_dir, &filename, &mut field.data);
    }
}

fn save_upload(store_dir: &Path, filename: &str, data: impl Read) -> Value {
    let saved = FileStore::open(store_dir)
        .map_err(TransferError::from)
        .and_then(|store| store.save(filename, data));
    match saved {
        Ok(size) => json!({
            "status": "success",
            "message": "File uploaded successfully",
            "filename": filename,
            "size": size,
        }),
        Err(e) => {
            warn!("Upload of {} failed: {}", filename, e);
            error_body(e.to_string())
        }
    }
}

fn delete(store_dir: &Path, name: &str) -> Value {
    if !store_dir.is_dir() {
        return error_body("File not found");
    }

    let removed = FileStore::open(store_dir)
        .map_err(TransferError::from)
        .and_then(|store| store.remove(name));
    match removed {
        Ok(()) => json!({
            "status": "success",
            "message": format!("File {} deleted successfully", name),
        }),
        Err(TransferError::NotFound(_)) => error_body("File not found"),
        Err(e) => error_body(e.to_string()),
    }
}

/// Human readable size, two decimals over a 1024 base.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{:.2} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2} TB", size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1023), "1023.00 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
        assert_eq!(format_size(2 * 1024u64.pow(4)), "2.00 TB");
    }

    #[test]
    fn test_routes() {
        assert_eq!(Route::parse(&Method::Get, "/"), Route::Index);
        assert_eq!(Route::parse(&Method::Get, "/api/files?x=1"), Route::Files);
        assert_eq!(Route::parse(&Method::Post, "/api/download"), Route::Download);
        assert_eq!(
            Route::parse(&Method::Get, "/api/get-file/my%20file.txt"),
            Route::GetFile("my file.txt".to_string())
        );
        assert_eq!(
            Route::parse(&Method::Delete, "/api/delete/a.bin"),
            Route::Delete("a.bin".to_string())
        );
        assert_eq!(Route::parse(&Method::Options, "/api/upload"), Route::Preflight);
        assert_eq!(Route::parse(&Method::Get, "/api/upload"), Route::MethodNotAllowed);
        assert_eq!(Route::parse(&Method::Get, "/nope"), Route::Unknown);
    }

    #[test]
    fn test_multipart_boundary() {
        assert_eq!(
            multipart_boundary("multipart/form-data; boundary=----abc123"),
            Some("----abc123".to_string())
        );
        assert_eq!(
            multipart_boundary("Multipart/Form-Data; charset=utf-8; boundary=\"q x\""),
            Some("q x".to_string())
        );
        assert_eq!(multipart_boundary("application/octet-stream"), None);
        assert_eq!(multipart_boundary("multipart/form-data"), None);
    }

    #[test]
    fn test_query_param() {
        assert_eq!(
            query_param("/api/upload?filename=a%20b.txt&x=1", "filename"),
            Some("a b.txt".to_string())
        );
        assert_eq!(query_param("/api/upload?x=1", "filename"), None);
        assert_eq!(query_param("/api/upload", "filename"), None);
    }
}
