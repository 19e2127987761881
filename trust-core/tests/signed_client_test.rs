mod common;

use common::{protected_app, signature_config, signer};
use std::time::Duration;
use trust_core::client::SignedHttpClient;

async fn spawn_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = protected_app(signature_config());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_signed_client_is_accepted_by_middleware() {
    let base_url = spawn_server().await;
    let client = SignedHttpClient::new(base_url, signer(), Duration::from_secs(5)).unwrap();

    let payload = serde_json::json!({ "status": "done", "job_id": "J-1" });
    let response = client.post_json("/v1/act", &payload, &[]).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let echoed: serde_json::Value = response.json().await.unwrap();
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn test_client_with_wrong_secret_is_rejected() {
    let base_url = spawn_server().await;
    let client = SignedHttpClient::new(
        base_url,
        trust_core::utils::RequestSigner::new(secrecy::SecretString::new("wrong".to_string())),
        Duration::from_secs(5),
    )
    .unwrap();

    let response = client
        .post_json("/v1/act", &serde_json::json!({}), &[])
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}
