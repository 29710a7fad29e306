use serde_json::{Value, json};
use std::fs;
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use xfer::transfer::client::ClientConfig;
use xfer::transfer::server::{Config, Server};
use xfer::web::{WebConfig, WebServer};

struct TestEnv {
    _temp: TempDir,
    store_dir: PathBuf,
    base: String,
    http: reqwest::blocking::Client,
}

impl TestEnv {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn get_json(&self, path: &str) -> Value {
        self.http.get(self.url(path)).send().unwrap().json().unwrap()
    }
}

fn start_transfer_server(store_dir: &Path) -> SocketAddr {
    let config = Config::with_defaults()
        .with_port(0)
        .with_directory(store_dir)
        .with_pacing(Duration::ZERO);
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let mut server = Server::bind(&config).await.unwrap();
            tx.send(server.local_addr().unwrap()).unwrap();
            server.listen().await;
        });
    });
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

fn start_web(temp: &TempDir, store_dir: PathBuf, transfer_port: u16) -> String {
    let web = WebConfig::with_defaults()
        .merge_cli(None, Some(0))
        .with_staging_dir(temp.path().join("staging"));
    let client = ClientConfig::new("127.0.0.1", transfer_port).with_timeout(Duration::from_secs(10));
    let server = WebServer::bind(&web, client, store_dir).unwrap();
    let base = format!("http://{}", server.addr());
    thread::spawn(move || server.serve());
    base
}

fn setup() -> TestEnv {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp = TempDir::new().unwrap();
    let store_dir = temp.path().join("server_files");
    fs::create_dir_all(&store_dir).unwrap();
    fs::write(store_dir.join("b.bin"), vec![1u8; 2048]).unwrap();
    fs::write(store_dir.join("a.txt"), b"hello").unwrap();
    fs::create_dir_all(store_dir.join("nested")).unwrap();

    let transfer = start_transfer_server(&store_dir);
    let base = start_web(&temp, store_dir.clone(), transfer.port());

    TestEnv {
        _temp: temp,
        store_dir,
        base,
        http: reqwest::blocking::Client::new(),
    }
}

#[test]
fn test_index_page() {
    let env = setup();
    let response = env.http.get(env.url("/")).send().unwrap();
    assert!(response.status().is_success());
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    assert!(response.text().unwrap().contains("/api/files"));
}

#[test]
fn test_list_files() {
    let env = setup();
    let response = env.http.get(env.url("/api/files")).send().unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let body: Value = response.json().unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["count"], 2);
    assert_eq!(
        body["files"],
        json!([
            { "name": "a.txt", "size": 5, "size_formatted": "5.00 B" },
            { "name": "b.bin", "size": 2048, "size_formatted": "2.00 KB" },
        ])
    );
}

#[test]
fn test_list_files_without_store() {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp = TempDir::new().unwrap();
    let base = start_web(&temp, temp.path().join("absent"), 9);

    let body: Value = reqwest::blocking::get(format!("{}/api/files", base))
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Server files directory not found");
    assert_eq!(body["files"], json!([]));
}

#[test]
fn test_download_and_fetch_staged_file() {
    let env = setup();
    let body: Value = env
        .http
        .post(env.url("/api/download"))
        .json(&json!({ "filename": "b.bin" }))
        .send()
        .unwrap()
        .json()
        .unwrap();

    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "File ready for download");
    assert_eq!(body["filename"], "b.bin");
    assert_eq!(body["size"], 2048);
    assert_eq!(body["download_url"], "/api/get-file/b.bin");

    let response = env.http.get(env.url("/api/get-file/b.bin")).send().unwrap();
    assert!(response.status().is_success());
    let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment"));
    assert_eq!(response.bytes().unwrap().to_vec(), vec![1u8; 2048]);
}

#[test]
fn test_download_failures() {
    let env = setup();
    let body: Value = env
        .http
        .post(env.url("/api/download"))
        .json(&json!({ "filename": "missing.bin" }))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["kind"], "server_rejected");
    assert_eq!(body["message"], "File 'missing.bin' not found on server");

    let body: Value = env
        .http
        .post(env.url("/api/download"))
        .json(&json!({}))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Filename is required");
}

#[test]
fn test_download_with_server_offline() {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp = TempDir::new().unwrap();
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let base = start_web(&temp, temp.path().to_path_buf(), port);
    let http = reqwest::blocking::Client::new();

    let status: Value = http
        .get(format!("{}/api/server-status", base))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(status["status"], "offline");
    assert_eq!(status["port"], port);

    let body: Value = http
        .post(format!("{}/api/download", base))
        .json(&json!({ "filename": "a.txt" }))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["kind"], "connection_failure");
}

#[test]
fn test_server_status_online() {
    let env = setup();
    let body = env.get_json("/api/server-status");
    assert_eq!(body["status"], "online");
    assert_eq!(body["host"], "127.0.0.1");
}

#[test]
fn test_get_file_not_staged() {
    let env = setup();
    let response = env.http.get(env.url("/api/get-file/a.txt")).send().unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().unwrap();
    assert_eq!(body["message"], "File not found");
}

#[test]
fn test_upload() {
    let env = setup();
    let body: Value = env
        .http
        .post(env.url("/api/upload"))
        .header("X-Filename", "up.txt")
        .body("uploaded content")
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "File uploaded successfully");
    assert_eq!(body["size"], 16);
    assert_eq!(fs::read(env.store_dir.join("up.txt")).unwrap(), b"uploaded content");

    let body: Value = env
        .http
        .post(env.url("/api/upload?filename=via%20query.txt"))
        .body("q")
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "success");
    assert!(env.store_dir.join("via query.txt").is_file());

    let listed = env.get_json("/api/files");
    assert_eq!(listed["count"], 4);
}

#[test]
fn test_upload_rejects_paths() {
    let env = setup();
    let body: Value = env
        .http
        .post(env.url("/api/upload"))
        .header("X-Filename", "../evil.txt")
        .body("x")
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "error");
    assert!(!env.store_dir.parent().unwrap().join("evil.txt").exists());

    let body: Value = env
        .http
        .post(env.url("/api/upload"))
        .body("x")
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["message"], "Filename is required");
}

#[test]
fn test_delete() {
    let env = setup();
    let body: Value = env
        .http
        .delete(env.url("/api/delete/a.txt"))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "success");
    assert!(!env.store_dir.join("a.txt").exists());

    let body: Value = env
        .http
        .delete(env.url("/api/delete/a.txt"))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "File not found");
}

#[test]
fn test_upload_form() {
    use reqwest::blocking::multipart::{Form, Part};

    let env = setup();
    let form = Form::new()
        .text("note", "ignored")
        .part("file", Part::bytes(b"from a form".to_vec()).file_name("form.txt"));
    let body: Value = env
        .http
        .post(env.url("/api/upload"))
        .multipart(form)
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["filename"], "form.txt");
    assert_eq!(body["size"], 11);
    assert_eq!(fs::read(env.store_dir.join("form.txt")).unwrap(), b"from a form");

    let body: Value = env
        .http
        .post(env.url("/api/upload"))
        .multipart(Form::new().text("note", "no file here"))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["message"], "No file provided");

    let body: Value = env
        .http
        .post(env.url("/api/upload"))
        .multipart(Form::new().part("file", Part::bytes(Vec::new()).file_name("")))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["message"], "No file selected");
}
