#![cfg(feature = "web")]

use std::time::Duration;

use formsheet::client::FormClient;
use formsheet::{ClientError, Field, FieldType, FormDefinition, SubmissionValues};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn form() -> FormDefinition {
    FormDefinition::new("Signup")
        .with_field_added(
            Field::new(FieldType::Email)
                .with_id("email")
                .with_label("Email")
                .required(),
        )
        .unwrap()
}

fn values(email: &str) -> SubmissionValues {
    let mut values = SubmissionValues::new();
    values.insert("email".into(), email.into());
    values
}

#[tokio::test]
async fn posts_builder_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/submit-form"))
        .and(body_partial_json(json!({
            "formConfig": { "title": "Signup" },
            "submissionData": { "email": "ada@example.com" }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "message": "Thanks!" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = FormClient::new(format!("{}/api/submit-form", server.uri()));
    let response = client.submit(&form(), &values("ada@example.com")).await.unwrap();

    assert!(response.success);
    assert_eq!(response.message, "Thanks!");
    assert!(!client.is_submitting());
}

#[tokio::test]
async fn invalid_values_never_leave_the_client() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = FormClient::new(format!("{}/api/submit-form", server.uri()));
    match client.submit(&form(), &values("not-an-email")).await {
        Err(ClientError::Validation(errors)) => {
            assert_eq!(errors.get("email").unwrap().code(), "invalid_email");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn server_rejection_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "success": false,
            "message": "Failed to submit form. Please try again."
        })))
        .mount(&server)
        .await;

    let client = FormClient::new(server.uri());
    match client.submit(&form(), &values("ada@example.com")).await {
        Err(ClientError::Rejected(message)) => {
            assert_eq!(message, "Failed to submit form. Please try again.");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn overlapping_submit_is_dropped() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "message": "ok" }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = FormClient::new(server.uri());
    let form = form();
    let values = values("ada@example.com");

    let (first, second) = tokio::join!(client.submit(&form, &values), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.submit(&form, &values).await
    });

    assert!(first.is_ok());
    assert!(matches!(second, Err(ClientError::Busy)));
    assert!(!client.is_submitting());
}
