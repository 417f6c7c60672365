use assert_matches::assert_matches;
use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};

fn client_for(server: &MockServer) -> SupabaseClient {
    let config = AppConfig {
        supabase_url: server.uri(),
        supabase_anon_key: "anon-key".to_string(),
        supabase_service_role_key: "service-key".to_string(),
        ..AppConfig::default()
    };
    SupabaseClient::new(&config)
}

#[tokio::test]
async fn test_request_sends_service_key_and_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", "eq.42"))
        .and(header("apikey", "service-key"))
        .and(header("authorization", "Bearer service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 42 }])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let rows: Vec<Value> = client
        .request(Method::GET, "/rest/v1/bookings?id=eq.42", Some(client.service_key()), None)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], 42);
}

#[tokio::test]
async fn test_unique_violation_is_recognised_by_postgres_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"bookings_active_slot_uidx\""
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result: Result<Vec<Value>, DbError> = client
        .request(Method::POST, "/rest/v1/bookings", None, Some(json!({})))
        .await;

    assert_matches!(result, Err(DbError::UniqueViolation(msg)) if msg.contains("bookings_active_slot_uidx"));
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_string("nope"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = client_for(&server);

    let forbidden: Result<Value, DbError> = client.request(Method::GET, "/rest/v1/forbidden", None, None).await;
    assert_matches!(forbidden, Err(DbError::Auth(_)));

    let broken: Result<Value, DbError> = client.request(Method::GET, "/rest/v1/broken", None, None).await;
    assert_matches!(broken, Err(DbError::Api { status: 500, .. }));
}

#[tokio::test]
async fn test_rpc_posts_arguments_to_function_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/increment_doctor_points"))
        .and(body_json(json!({ "p_doctor_id": "d-1", "p_delta": 25 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(125)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let points: i64 = client
        .rpc("increment_doctor_points", json!({ "p_doctor_id": "d-1", "p_delta": 25 }), None)
        .await
        .unwrap();

    assert_eq!(points, 125);
}
