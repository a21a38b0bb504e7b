use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use filedeck_api::{
    ClientConfig, EntryUpdate, FileServer, HttpServer, ProgressFn, UploadSource,
};
use filedeck_common::{EntryId, Error, SecretString};

const TOKEN: &str = "test-token";

/// (directory id, form field, file name, byte count)
type Uploads = Arc<Mutex<Vec<(String, String, String, usize)>>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Bearer test-token")
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "authorization failed" })),
    )
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["username"] == "admin" && body["password"] == "secret" {
        (
            StatusCode::OK,
            Json(json!({ "message": "login successful", "data": TOKEN })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "invalid username or password" })),
        )
    }
}

async fn check_token(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(json!({ "message": "token ok" })))
}

async fn root(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({
            "message": "directory retrieved",
            "data": { "id": "root", "name": "/", "dir": true, "files": null }
        })),
    )
}

async fn rename_dir(Path(id): Path<String>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let name = body["name"].as_str().unwrap_or_default();
    if name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "name is required" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "message": "directory updated",
            "data": { "id": id, "name": name, "dir": true, "parent": body["parent"] }
        })),
    )
}

async fn upload(
    State(uploads): State<Uploads>,
    Path(dir): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut created = Value::Null;
    while let Some(field) = multipart.next_field().await.unwrap() {
        let form_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.unwrap();
        created = json!({
            "id": "new-file", "name": file_name, "dir": false,
            "size": data.len(), "parent": dir
        });
        uploads
            .lock()
            .unwrap()
            .push((dir.clone(), form_name, file_name, data.len()));
    }
    (
        StatusCode::CREATED,
        Json(json!({ "message": "file created", "data": created })),
    )
}

async fn spawn_server() -> (String, Uploads) {
    let uploads = Uploads::default();
    let app = Router::new()
        .route(
            "/api/config",
            get(|| async {
                Json(json!({
                    "message": "config retrieved",
                    "data": { "login": true, "anonymous": false }
                }))
            }),
        )
        .route("/api/user/login", post(login))
        .route("/api/check_token", get(check_token))
        .route("/api/directories", get(root))
        .route("/api/directories/{id}", put(rename_dir))
        .route("/api/directories/{id}/files", post(upload))
        .with_state(uploads.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), uploads)
}

async fn logged_in_client(base: &str) -> HttpServer {
    let server = HttpServer::new(ClientConfig::new(base)).unwrap();
    let token = server
        .login("admin", &SecretString::new("secret"))
        .await
        .unwrap();
    server.set_token(Some(token)).await;
    server
}

#[tokio::test]
async fn test_config_is_decoded() {
    let (base, _) = spawn_server().await;
    let server = HttpServer::new(ClientConfig::new(base)).unwrap();
    let config = server.config().await.unwrap();
    assert!(config.login_required);
    assert!(!config.anonymous_allowed);
}

#[tokio::test]
async fn test_requests_without_token_are_unauthorized() {
    let (base, _) = spawn_server().await;
    let server = HttpServer::new(ClientConfig::new(base)).unwrap();
    assert!(server.check_token().await.unwrap_err().is_unauthorized());
    assert!(server.get_directory(None).await.unwrap_err().is_unauthorized());
}

#[tokio::test]
async fn test_bad_credentials_surface_server_message() {
    let (base, _) = spawn_server().await;
    let server = HttpServer::new(ClientConfig::new(base)).unwrap();
    let err = server
        .login("admin", &SecretString::new("wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authentication(m) if m == "invalid username or password"));
}

#[tokio::test]
async fn test_token_is_sent_as_bearer() {
    let (base, _) = spawn_server().await;
    let server = logged_in_client(&base).await;
    server.check_token().await.unwrap();

    let root = server.get_directory(None).await.unwrap();
    assert_eq!(root.entry.id.as_str(), "root");
    assert!(root.files.is_none());

    server.set_token(None).await;
    assert!(server.check_token().await.is_err());
}

#[tokio::test]
async fn test_rename_validation_message() {
    let (base, _) = spawn_server().await;
    let server = logged_in_client(&base).await;
    let id = EntryId::new("d1").unwrap();

    let update = EntryUpdate {
        name: String::new(),
        parent: None,
    };
    let err = server.update_directory(&id, &update).await.unwrap_err();
    assert!(matches!(err, Error::Validation(m) if m == "name is required"));

    let update = EntryUpdate {
        name: "photos".to_string(),
        parent: Some(EntryId::new("root").unwrap()),
    };
    let renamed = server.update_directory(&id, &update).await.unwrap();
    assert_eq!(renamed.name, "photos");
}

#[tokio::test]
async fn test_multipart_upload_with_progress() {
    let (base, uploads) = spawn_server().await;
    let server = logged_in_client(&base).await;
    let dir = EntryId::new("root").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress: ProgressFn = Arc::new(move |p| sink.lock().unwrap().push(p));

    let body = vec![42u8; 200 * 1024];
    let entry = server
        .upload_file(&dir, UploadSource::from_bytes("report.pdf", body), progress)
        .await
        .unwrap();
    assert_eq!(entry.name, "report.pdf");
    assert_eq!(entry.size, 200 * 1024);

    let uploads = uploads.lock().unwrap();
    assert_eq!(
        uploads.as_slice(),
        &[(
            "root".to_string(),
            "file".to_string(),
            "report.pdf".to_string(),
            200 * 1024
        )]
    );

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*seen.last().unwrap(), 100.0);
}
