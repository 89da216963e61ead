//! The Vault client against a fake Vault server.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use vaultpatch_resources_kv::{
    vault_client, DocumentStore, Location, StoreError, VaultClient, VaultConfig,
};

const TOKEN: &str = "s.test-token";

#[derive(Default)]
struct FakeVault {
    /// Response body for reads; `None` answers 404.
    read_body: Option<Value>,
    read_status: Option<StatusCode>,
    login_token: String,
    written: Vec<(String, Value)>,
    headers_ok: bool,
}

type Shared = Arc<Mutex<FakeVault>>;

fn token_ok(headers: &HeaderMap) -> bool {
    headers.get("X-Vault-Token").and_then(|v| v.to_str().ok()) == Some(TOKEN)
}

async fn login(State(vault): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    if body["role_id"] != "role" || body["secret_id"] != "secret" {
        return (StatusCode::BAD_REQUEST, Json(json!({ "errors": ["invalid role or secret ID"] })));
    }
    let token = vault.lock().unwrap().login_token.clone();
    (StatusCode::OK, Json(json!({ "auth": { "client_token": token } })))
}

async fn read(
    State(vault): State<Shared>,
    Path((_mount, _path)): Path<(String, String)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let mut vault = vault.lock().unwrap();
    vault.headers_ok = token_ok(&headers)
        && headers.get("X-Vault-Request").and_then(|v| v.to_str().ok()) == Some("true");
    if let Some(status) = vault.read_status {
        return (status, Json(json!({ "errors": ["boom"] })));
    }
    match &vault.read_body {
        Some(body) => (StatusCode::OK, Json(body.clone())),
        None => (StatusCode::NOT_FOUND, Json(json!({ "errors": [] }))),
    }
}

async fn write(
    State(vault): State<Shared>,
    Path((mount, path)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !token_ok(&headers) {
        return StatusCode::FORBIDDEN;
    }
    vault
        .lock()
        .unwrap()
        .written
        .push((format!("{}/{}", mount, path), body));
    StatusCode::NO_CONTENT
}

async fn serve(vault: Shared) -> String {
    let app = Router::new()
        .route("/v1/auth/approle/login", post(login))
        .route("/v1/{mount}/data/{*path}", get(read).post(write))
        .with_state(vault);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    address
}

fn client(address: &str) -> VaultClient {
    VaultClient::with_token(address, SecretString::from(TOKEN), Duration::from_secs(5)).unwrap()
}

fn config(address: &str, secret_id: &str) -> VaultConfig {
    VaultConfig {
        address: address.to_string(),
        role_id: SecretString::from("role"),
        secret_id: SecretString::from(secret_id),
        timeout: VaultConfig::DEFAULT_TIMEOUT,
    }
}

#[tokio::test]
async fn approle_login_returns_token() {
    let vault = Shared::default();
    vault.lock().unwrap().login_token = TOKEN.to_string();
    let address = serve(vault).await;

    let http = reqwest::Client::new();
    let token = vault_client::login(
        &http,
        &address,
        &SecretString::from("role"),
        &SecretString::from("secret"),
    )
    .await
    .unwrap();
    assert_eq!(token.expose_secret(), TOKEN);

    let client = VaultClient::login(&config(&address, "secret")).await.unwrap();
    assert_eq!(client.address(), address);
}

#[tokio::test]
async fn approle_login_with_empty_token_fails() {
    let vault = Shared::default();
    let address = serve(vault).await;
    let err = VaultClient::login(&config(&address, "secret"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::EmptyToken));
}

#[tokio::test]
async fn approle_login_rejected() {
    let vault = Shared::default();
    let address = serve(vault).await;
    let err = VaultClient::login(&config(&address, "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 400, .. }));
}

#[tokio::test]
async fn fetch_returns_document_and_sends_headers() {
    let vault = Shared::default();
    vault.lock().unwrap().read_body = Some(json!({
        "data": { "data": { "A": "1", "n": 2 }, "metadata": { "version": 3 } }
    }));
    let address = serve(vault.clone()).await;

    let document = client(&address)
        .fetch(&Location::new("app", "svc/test"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(document["A"], json!("1"));
    assert_eq!(document["n"], json!(2));
    assert!(vault.lock().unwrap().headers_ok);
}

#[tokio::test]
async fn fetch_of_missing_secret_is_none() {
    let address = serve(Shared::default()).await;
    let document = client(&address)
        .fetch(&Location::new("app", "missing"))
        .await
        .unwrap();
    assert_eq!(document, None);
}

#[tokio::test]
async fn fetch_of_deleted_version_is_empty() {
    let vault = Shared::default();
    vault.lock().unwrap().read_body = Some(json!({ "data": { "data": null, "metadata": {} } }));
    let address = serve(vault).await;
    let document = client(&address)
        .fetch(&Location::new("app", "svc"))
        .await
        .unwrap();
    assert_eq!(document, Some(Default::default()));
}

#[tokio::test]
async fn fetch_server_error_is_status_error() {
    let vault = Shared::default();
    vault.lock().unwrap().read_status = Some(StatusCode::INTERNAL_SERVER_ERROR);
    let address = serve(vault).await;
    let err = client(&address)
        .fetch(&Location::new("app", "svc"))
        .await
        .unwrap_err();
    match err {
        StoreError::Status { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("boom"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn fetch_with_garbage_body_is_decode_error() {
    let vault = Shared::default();
    vault.lock().unwrap().read_body = Some(json!({ "unexpected": true }));
    let address = serve(vault).await;
    let err = client(&address)
        .fetch(&Location::new("app", "svc"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Decode(_)));
}

#[tokio::test]
async fn store_wraps_document_in_data() {
    let vault = Shared::default();
    let address = serve(vault.clone()).await;
    let document = [
        ("A".to_string(), json!("1")),
        ("n".to_string(), json!(2)),
    ]
    .into();

    client(&format!("{}/", address))
        .store(&Location::new("app", "svc/test"), &document)
        .await
        .unwrap();

    let written = vault.lock().unwrap().written.clone();
    assert_eq!(
        written,
        vec![(
            "app/svc/test".to_string(),
            json!({ "data": { "A": "1", "n": 2 } })
        )]
    );
}

#[tokio::test]
async fn store_with_bad_token_fails() {
    let address = serve(Shared::default()).await;
    let client =
        VaultClient::with_token(&address, SecretString::from("nope"), Duration::from_secs(5))
            .unwrap();
    let err = client
        .store(&Location::new("app", "svc"), &Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 403, .. }));
}
