//! Integration tests for the auth endpoints and the persisted token store

use std::sync::Arc;

use authlink_core::{
    ApiClients, ApiError, ClientConfig, CookieJar, CookieOptions, RefreshError, TokenRefresher,
    TokenStore,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn clients_for(server: &MockServer, store: &TokenStore) -> ApiClients {
    let config = ClientConfig {
        base_url: format!("{}/api", server.uri()),
        ..ClientConfig::default()
    };
    ApiClients::new(config, store.clone()).expect("Failed to build clients")
}

#[tokio::test]
async fn test_login_stores_access_token() {
    //* Given
    let server = MockServer::start().await;
    let store = TokenStore::in_memory();

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"email": "ann@example.com", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "abc123",
            "user": {"id": 1, "email": "ann@example.com"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    //* When
    let auth = clients_for(&server, &store).auth_service();
    let response = auth.login("ann@example.com", "hunter2").await.unwrap();

    //* Then
    assert_eq!(response.access_token, "abc123");
    assert_eq!(response.user.unwrap()["id"], 1);
    assert_eq!(store.get().as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_register_uses_register_endpoint() {
    //* Given
    let server = MockServer::start().await;
    let store = TokenStore::in_memory();

    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;

    //* When
    let auth = clients_for(&server, &store).auth_service();
    auth.register("bob@example.com", "pw").await.unwrap();

    //* Then
    assert_eq!(store.get().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_failed_login_leaves_store_untouched() {
    //* Given
    let server = MockServer::start().await;
    let store = TokenStore::in_memory();

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": ["password is too weak"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    //* When
    let auth = clients_for(&server, &store).auth_service();
    let result = auth.login("ann@example.com", "x").await;

    //* Then
    match result {
        Err(ApiError::ClientError { message, .. }) => assert_eq!(message, "password is too weak"),
        other => panic!("expected client error, got {:?}", other.map(|_| ())),
    }
    assert_eq!(store.get(), None);
}

#[tokio::test]
async fn test_refresh_sends_server_cookie() {
    //* Given
    let server = MockServer::start().await;
    let store = TokenStore::in_memory();

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "refreshToken=r1; Path=/; HttpOnly")
                .set_body_json(json!({"accessToken": "abc123"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login/access-token"))
        .and(header("cookie", "refreshToken=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "xyz789"})))
        .expect(1)
        .mount(&server)
        .await;

    //* When
    let auth = clients_for(&server, &store).auth_service();
    auth.login("ann@example.com", "hunter2").await.unwrap();
    auth.get_new_tokens().await.unwrap();

    //* Then
    assert_eq!(store.get().as_deref(), Some("xyz789"));
}

#[tokio::test]
async fn test_refresh_with_expired_credential_maps_to_expired() {
    //* Given
    let server = MockServer::start().await;
    let store = TokenStore::in_memory();

    Mock::given(method("POST"))
        .and(path("/api/auth/login/access-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "jwt expired"})))
        .expect(1)
        .mount(&server)
        .await;

    //* When
    let auth = clients_for(&server, &store).auth_service();
    let result = auth.get_new_tokens().await;

    //* Then
    assert_eq!(result, Err(RefreshError::Expired));
}

#[tokio::test]
async fn test_refresh_rejects_empty_token() {
    //* Given
    let server = MockServer::start().await;
    let store = TokenStore::in_memory();
    store.set("abc123").unwrap();

    Mock::given(method("POST"))
        .and(path("/api/auth/login/access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": ""})))
        .expect(1)
        .mount(&server)
        .await;

    //* When
    let auth = clients_for(&server, &store).auth_service();
    let result = auth.get_new_tokens().await;

    //* Then
    assert!(matches!(result, Err(RefreshError::Failed(_))));
    assert_eq!(store.get().as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_logout_clears_token_even_on_server_error() {
    //* Given
    let server = MockServer::start().await;
    let store = TokenStore::in_memory();
    store.set("abc123").unwrap();

    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    //* When
    let auth = clients_for(&server, &store).auth_service();
    let result = auth.logout().await;

    //* Then
    assert!(matches!(result, Err(ApiError::ServerError { .. })));
    assert_eq!(store.get(), None);
}

#[tokio::test]
async fn test_persisted_token_survives_new_clients() {
    //* Given
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cookie_file = dir.path().join("cookies.json");

    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    {
        let jar = Arc::new(CookieJar::open(&cookie_file).unwrap());
        TokenStore::new(jar, CookieOptions::default()).set("abc123").unwrap();
    }

    //* When
    let jar = Arc::new(CookieJar::open(&cookie_file).unwrap());
    let store = TokenStore::new(jar, CookieOptions::default());
    let profile: serde_json::Value = clients_for(&server, &store)
        .with_auth
        .get("profile")
        .await
        .unwrap();

    //* Then
    assert_eq!(profile["id"], 1);
}

#[tokio::test]
async fn test_refresh_cookie_survives_new_clients() {
    //* Given
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cookie_file = dir.path().join("cookies.json");

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "refreshToken=r1; Path=/; HttpOnly")
                .set_body_json(json!({"accessToken": "abc123"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login/access-token"))
        .and(header("cookie", "refreshToken=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "xyz789"})))
        .expect(1)
        .mount(&server)
        .await;

    {
        let jar = Arc::new(CookieJar::open(&cookie_file).unwrap());
        let store = TokenStore::new(jar, CookieOptions::default());
        clients_for(&server, &store)
            .auth_service()
            .login("ann@example.com", "hunter2")
            .await
            .unwrap();
    }

    //* When
    let jar = Arc::new(CookieJar::open(&cookie_file).unwrap());
    let store = TokenStore::new(jar, CookieOptions::default());
    let response = clients_for(&server, &store).auth_service().refresh().await;

    //* Then
    assert_eq!(response.unwrap().access_token, "xyz789");
    assert_eq!(store.get().as_deref(), Some("xyz789"));
}
