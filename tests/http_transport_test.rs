mod common;

use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use mockito::{Matcher, Server, ServerGuard};

use common::*;
use mpesa_api::models::PaymentRequest;
use mpesa_api::{AppError, MpesaService};

async fn mock_token(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/oauth/v1/generate")
        .match_query(Matcher::UrlEncoded(
            "grant_type".into(),
            "client_credentials".into(),
        ))
        .match_header(
            "authorization",
            format!(
                "Basic {}",
                base64.encode("test-consumer-key:test-consumer-secret")
            )
            .as_str(),
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"sandbox-token","expires_in":"3599"}"#)
        .create_async()
        .await
}

fn http_service(server: &ServerGuard, retries: &str) -> MpesaService {
    let url = server.url();
    let config = mpesa_config_with(&[
        ("MPESA_BASE_URL", url.as_str()),
        ("MPESA_TRANSPORT", "http"),
        ("MPESA_TIMEOUT_SECS", "5"),
        ("MPESA_QUERY_RETRIES", retries),
    ]);
    MpesaService::from_config(config).unwrap()
}

#[tokio::test]
async fn stk_push_round_trip_over_http() {
    let mut server = Server::new_async().await;
    let token = mock_token(&mut server).await;
    let push = server
        .mock("POST", "/mpesa/stkpush/v1/processrequest")
        .match_header("authorization", "Bearer sandbox-token")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "BusinessShortCode": SHORT_CODE,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": 451,
            "PartyA": "254712345678",
            "PartyB": SHORT_CODE,
            "PhoneNumber": "254712345678",
            "AccountReference": "ORD-1",
            "TransactionDesc": "Payment for order ORD-1"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResponseCode": "0",
                "ResponseDescription": "Success. Request accepted for processing",
                "CustomerMessage": "Success. Request accepted for processing"
            }"#,
        )
        .create_async()
        .await;

    let service = http_service(&server, "0");
    let response = service
        .initiate_payment(&PaymentRequest::new("0712345678", 450.7, "ORD-1"))
        .await
        .unwrap();

    assert!(response.success, "unexpected response: {:?}", response);
    assert_eq!(
        response.checkout_request_id.as_deref(),
        Some("ws_CO_191220191020363925")
    );
    token.assert_async().await;
    push.assert_async().await;
}

#[tokio::test]
async fn gateway_error_body_on_4xx_becomes_soft_failure() {
    let mut server = Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let _push = server
        .mock("POST", "/mpesa/stkpush/v1/processrequest")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "requestId": "8517-2367542-1",
                "errorCode": "400.002.02",
                "errorMessage": "Bad Request - Invalid PhoneNumber"
            }"#,
        )
        .create_async()
        .await;

    let service = http_service(&server, "0");
    let response = service
        .initiate_payment(&PaymentRequest::new("0712345678", 10.0, "ORD-2"))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.response_code.as_deref(), Some("400.002.02"));
    assert_eq!(
        response.error.as_deref(),
        Some("Bad Request - Invalid PhoneNumber")
    );
}

#[tokio::test]
async fn rejected_token_request_is_an_authentication_error() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("GET", "/oauth/v1/generate")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"errorCode":"400.008.01","errorMessage":"Invalid Authentication passed"}"#)
        .create_async()
        .await;

    let service = http_service(&server, "0");
    let result = service
        .initiate_payment(&PaymentRequest::new("0712345678", 10.0, "ORD-3"))
        .await;

    assert!(matches!(result, Err(AppError::Authentication(_))));
}

#[tokio::test]
async fn pending_query_arrives_as_http_500_with_error_body() {
    let mut server = Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let query = server
        .mock("POST", "/mpesa/stkpushquery/v1/query")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "BusinessShortCode": SHORT_CODE,
            "CheckoutRequestID": "ws_CO_191220191020363925"
        })))
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "requestId": "ws_CO_191220191020363925",
                "errorCode": "500.001.1001",
                "errorMessage": "The transaction is being processed"
            }"#,
        )
        .expect(1)
        .create_async()
        .await;

    let service = http_service(&server, "2");
    let status = service
        .query_payment_status("ws_CO_191220191020363925")
        .await
        .unwrap();

    assert!(!status.success);
    assert!(status.is_pending());
    query.assert_async().await;
}

#[tokio::test]
async fn server_errors_on_query_are_retried() {
    let mut server = Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let query = server
        .mock("POST", "/mpesa/stkpushquery/v1/query")
        .with_status(503)
        .with_body("<html>Service Unavailable</html>")
        .expect(2)
        .create_async()
        .await;

    let service = http_service(&server, "1");
    let status = service.query_payment_status("ws_CO_1").await.unwrap();

    assert!(!status.success);
    assert!(status.error.unwrap().contains("503"));
    query.assert_async().await;
}

#[tokio::test]
async fn settled_query_with_string_result_code() {
    let mut server = Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let _query = server
        .mock("POST", "/mpesa/stkpushquery/v1/query")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "ResponseCode": "0",
                "ResponseDescription": "The service request has been accepted successsfully",
                "MerchantRequestID": "22205-34066-1",
                "CheckoutRequestID": "ws_CO_13012021093521236557",
                "ResultCode": "0",
                "ResultDesc": "The service request is processed successfully."
            }"#,
        )
        .create_async()
        .await;

    let service = http_service(&server, "0");
    let status = service
        .query_payment_status("ws_CO_13012021093521236557")
        .await
        .unwrap();

    assert!(status.success);
    assert_eq!(status.merchant_request_id.as_deref(), Some("22205-34066-1"));
}
