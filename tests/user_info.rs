use authflow::flow::AuthResult;
use authflow::http::{HttpResponse, InMemoryHttpClient};
use authflow::{AuthError, UserInfo};
use serde_json::{Value, json};

const ENDPOINT: &str = "http://example.com/graph/v1.0/me";

fn bearer() -> AuthResult {
    AuthResult::Bearer(authflow::oauth::BearerClient::new(
        json!({"access_token": "T", "token_type": "Bearer"})
            .as_object()
            .unwrap()
            .clone(),
    ))
}

#[tokio::test]
async fn fetches_user_info() {
    let http = InMemoryHttpClient::with_default(HttpResponse::json(200, &json!({"id": "root"})));

    let user = UserInfo::new(ENDPOINT).fetch(&http, &bearer()).await.unwrap();

    assert_eq!(json!({"id": "root"}), user);
}

#[tokio::test]
async fn stamps_bearer_token_on_request() {
    let http = InMemoryHttpClient::with_default(HttpResponse::json(200, &json!({"id": "root"})));

    UserInfo::new(ENDPOINT).fetch(&http, &bearer()).await.unwrap();

    let request = &http.requests()[0];
    assert_eq!(ENDPOINT, request.url);
    let authorization = request
        .headers
        .iter()
        .find(|(name, _)| name == "Authorization")
        .map(|(_, value)| value.as_str());
    assert_eq!(Some("Bearer T"), authorization);
}

#[tokio::test]
async fn mappers_refine_the_value() {
    let http = InMemoryHttpClient::with_default(HttpResponse::json(
        200,
        &json!({"id": "root", "mail": "root@example.com"}),
    ));

    let user = UserInfo::new(ENDPOINT)
        .map(|value, _| Ok(json!({"username": value["id"]})))
        .map(|value, _| {
            let mut user = value.as_object().unwrap().clone();
            user.insert("origin".into(), Value::String("graph".into()));
            Ok(Value::Object(user))
        })
        .fetch(&http, &bearer())
        .await
        .unwrap();

    assert_eq!(json!({"username": "root", "origin": "graph"}), user);
}

#[tokio::test]
async fn status_400_and_above_is_one_error_kind() {
    for status in [400, 401, 403, 500] {
        let http = InMemoryHttpClient::with_default(HttpResponse::json(status, &json!({})));

        let error = UserInfo::new(ENDPOINT).fetch(&http, &bearer()).await.unwrap_err();

        match error {
            AuthError::UserInfo(message) => {
                assert!(
                    message.contains(&format!("Unexpected status {status}")),
                    "{message}",
                );
            }
            other => panic!("unexpected error {other}"),
        }
    }
}

#[tokio::test]
async fn mapper_failure_wraps_into_user_info_error() {
    let http = InMemoryHttpClient::with_default(HttpResponse::json(200, &json!({"id": "root"})));

    let error = UserInfo::new(ENDPOINT)
        .map(|_, _| Err(AuthError::MalformedResponse("unexpected shape".into())))
        .fetch(&http, &bearer())
        .await
        .unwrap_err();

    match error {
        AuthError::UserInfo(message) => {
            assert!(message.starts_with("Invoking mappers:"), "{message}");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn value_decoding_by_content_type() {
    // JSON, vendor JSON, form-encoded and plaintext all decode
    let cases = [
        ("application/json", "\"Test\"", json!("Test")),
        ("application/vnd.api+json", "\"Test\"", json!("Test")),
        ("application/vnd.github.v3+json", "\"Test\"", json!("Test")),
        ("application/x-www-form-urlencoded", "key=Test", json!({"key": "Test"})),
        ("text/plain", "Test", json!("Test")),
    ];
    for (content_type, body, expected) in cases {
        let response =
            HttpResponse::new(200, vec![("Content-Type".into(), content_type.into())], body);
        assert_eq!(expected, response.value().unwrap(), "{content_type}");
    }
}

#[test]
fn value_without_content_type_is_malformed() {
    let response = HttpResponse::new(200, vec![], "...");
    assert!(matches!(
        response.value().unwrap_err(),
        AuthError::MalformedResponse(message)
            if message == "Cannot convert content without a mime type to a value",
    ));
}

#[test]
fn value_with_unknown_content_type_is_malformed() {
    let response =
        HttpResponse::new(200, vec![("Content-Type".into(), "text/html".into())], "<html>");
    assert!(matches!(
        response.value().unwrap_err(),
        AuthError::MalformedResponse(message)
            if message == "Cannot convert \"text/html\" to a value",
    ));
}
