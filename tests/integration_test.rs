use image::{ImageFormat, Rgb, RgbImage};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::fs;
use std::io::Cursor;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

// Use atomic counter to give each test a unique port
static PORT_COUNTER: AtomicU16 = AtomicU16::new(9400);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
struct ConvertResponse {
    success: bool,
    filename: String,
    filepath: String,
    file_size: u64,
    word_count: usize,
    character_count: usize,
    format: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct EngineInfo {
    name: String,
    description: String,
    available: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
struct InfoResponse {
    version: String,
    engine: EngineInfo,
    output_formats: Vec<String>,
    formatting_modes: Vec<String>,
    max_file_size_bytes: usize,
    default_language: String,
    default_format: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct HealthResponse {
    status: String,
    version: String,
}

struct TestServer {
    child: Child,
    port: u16,
    root: tempfile::TempDir,
}

impl TestServer {
    fn start(engine_binary: &str) -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        Self::start_in(root, engine_binary)
    }

    fn start_in(root: tempfile::TempDir, engine_binary: &str) -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);

        let child = Command::new(env!("CARGO_BIN_EXE_ocr-document-server"))
            .args(["--host", "127.0.0.1", "--port", &port.to_string()])
            .arg("--upload-dir")
            .arg(root.path().join("uploads"))
            .arg("--output-dir")
            .arg(root.path().join("output"))
            .args(["--engine-binary", engine_binary])
            .args(["--ocr-timeout-secs", "10"])
            .spawn()
            .expect("Failed to start server");

        let server = Self { child, port, root };
        server.wait_until_ready();
        server
    }

    /// Start with a stand-in engine that writes `text` as its result
    #[cfg(unix)]
    fn with_scripted_engine(text: &str) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().expect("Failed to create temp dir");
        let script = root.path().join("tesseract");
        fs::write(
            &script,
            format!("#!/bin/sh\nprintf '%s' '{}' > \"$2.txt\"\n", text),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let engine_binary = script.to_str().unwrap().to_string();
        Self::start_in(root, &engine_binary)
    }

    fn wait_until_ready(&self) {
        for _ in 0..100 {
            if TcpStream::connect(("127.0.0.1", self.port)).is_ok() {
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        panic!("Server did not become ready on port {}", self.port);
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    fn upload_dir(&self) -> PathBuf {
        self.root.path().join("uploads")
    }

    fn output_dir(&self) -> PathBuf {
        self.root.path().join("output")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
}

fn image_part(data: Vec<u8>, filename: &str, mime_type: &str) -> Part {
    Part::bytes(data)
        .file_name(filename.to_string())
        .mime_str(mime_type)
        .unwrap()
}

fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start("tesseract-not-installed-here");
    let client = reqwest::Client::new();

    let response: HealthResponse = client
        .get(format!("{}/health", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(response.status, "ok");
    assert!(!response.version.is_empty());
}

#[tokio::test]
async fn test_info_reports_missing_engine() {
    let server = TestServer::start("tesseract-not-installed-here");
    let client = reqwest::Client::new();

    let info: InfoResponse = client
        .get(format!("{}/info", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(info.engine.name, "tesseract-not-installed-here");
    assert!(!info.engine.available);
    assert_eq!(info.output_formats, vec!["txt", "docx"]);
    assert_eq!(info.formatting_modes, vec!["preserve", "paragraph", "raw"]);
    assert_eq!(info.default_format, "docx");
}

#[tokio::test]
async fn test_preflight_returns_cors_headers() {
    let server = TestServer::start("tesseract-not-installed-here");
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, format!("{}/convert", server.base_url()))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_image_is_rejected() {
    let server = TestServer::start("tesseract-not-installed-here");
    let client = reqwest::Client::new();

    let form = Form::new().text("title", "No image here");
    let response = client
        .post(format!("{}/convert", server.base_url()))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
    let body: ErrorResponse = response.json().await.expect("Failed to parse response");
    assert!(!body.success);
    assert_eq!(body.error, "No image uploaded or upload error");
    assert!(dir_is_empty(&server.upload_dir()));
}

#[tokio::test]
async fn test_non_image_is_rejected() {
    let server = TestServer::start("tesseract-not-installed-here");
    let client = reqwest::Client::new();

    let part = image_part(b"%PDF-1.4 not an image".to_vec(), "doc.pdf", "image/png");
    let response = client
        .post(format!("{}/convert", server.base_url()))
        .multipart(Form::new().part("image", part))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
    let body: ErrorResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(body.code, "VALIDATION_ERROR");
    assert!(dir_is_empty(&server.output_dir()));
}

#[tokio::test]
async fn test_missing_engine_fails_cleanly() {
    let server = TestServer::start("tesseract-not-installed-here");
    let client = reqwest::Client::new();

    let part = image_part(png_bytes(200, 100), "scan.png", "image/png");
    let response = client
        .post(format!("{}/convert", server.base_url()))
        .multipart(Form::new().part("image", part).text("title", "Scan"))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 500);
    let body: ErrorResponse = response.json().await.expect("Failed to parse response");
    assert!(!body.success);
    assert!(body.error.starts_with("Conversion failed: "));
    assert!(body.error.contains("not installed"));
    assert!(dir_is_empty(&server.upload_dir()));
    assert!(dir_is_empty(&server.output_dir()));
}

#[cfg(unix)]
#[tokio::test]
async fn test_convert_to_text_and_download() {
    let server = TestServer::with_scripted_engine("Hello  World");
    let client = reqwest::Client::new();

    let part = image_part(png_bytes(200, 100), "scan.png", "image/png");
    let form = Form::new()
        .part("image", part)
        .text("title", "Meeting Notes")
        .text("formatting", "preserve")
        .text("outputFormat", "txt");

    let response = client
        .post(format!("{}/convert", server.base_url()))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 200);
    let body: ConvertResponse = response.json().await.expect("Failed to parse response");
    assert!(body.success);
    assert_eq!(body.format, "txt");
    assert_eq!(body.word_count, 2);
    assert_eq!(body.character_count, 11);
    assert!(body.filename.starts_with("Meeting_Notes_"));
    assert!(body.filename.ends_with(".txt"));
    assert_eq!(body.filepath, format!("output/{}", body.filename));

    let on_disk = fs::read_to_string(server.output_dir().join(&body.filename)).unwrap();
    assert_eq!(body.file_size, on_disk.len() as u64);
    assert!(on_disk.starts_with("Document: Meeting Notes\n"));
    assert!(on_disk.contains("Hello World"));
    assert!(dir_is_empty(&server.upload_dir()));

    let downloaded = client
        .get(format!("{}/{}", server.base_url(), body.filepath))
        .send()
        .await
        .expect("Failed to send request")
        .text()
        .await
        .unwrap();
    assert_eq!(downloaded, on_disk);
}

#[cfg(unix)]
#[tokio::test]
async fn test_convert_to_docx_with_image() {
    let server = TestServer::with_scripted_engine("Invoice 42");
    let client = reqwest::Client::new();

    let part = image_part(png_bytes(2000, 1500), "invoice.png", "image/png");
    let form = Form::new()
        .part("image", part)
        .text("fontSize", "14")
        .text("includeImage", "1")
        .text("addTimestamp", "0");

    let response = client
        .post(format!("{}/convert", server.base_url()))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 200);
    let body: ConvertResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(body.format, "docx");
    assert!(body.filename.starts_with("Extracted_Document_"));

    let bytes = fs::read(server.output_dir().join(&body.filename)).unwrap();
    assert!(bytes.starts_with(b"PK"));
    assert_eq!(body.file_size, bytes.len() as u64);
}
