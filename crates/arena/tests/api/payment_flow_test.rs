use arena_core::Role;
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};

use crate::helpers::{intent_id_from_secret, TestApp};

#[tokio::test]
async fn test_intent_requires_matching_price() {
    let app = TestApp::spawn().await.unwrap();
    let contest = app
        .confirmed_contest(
            "creator-1",
            25.0,
            0,
            OffsetDateTime::now_utc() + Duration::days(2),
        )
        .await;
    let contest_id = contest["id"].as_str().unwrap();
    let token = app.token("user-1", Role::User);

    let mismatch = app
        .post(
            "/payments/create-intent",
            Some(&token),
            json!({ "price": 20, "contestId": contest_id }),
        )
        .await;
    assert_eq!(mismatch.status(), 400);
    let body: Value = mismatch.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Price does not match contest entry fee");

    let update_fee = app
        .post(
            "/payments/create-intent",
            Some(&token),
            json!({ "price": 10, "contestId": contest_id, "paymentType": "update" }),
        )
        .await;
    assert_eq!(update_fee.status(), 200);
    let body: Value = update_fee.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(body["clientSecret"].as_str().is_some());
    assert!(body["paymentId"].as_str().is_some());

    let unauthenticated = app
        .post(
            "/payments/create-intent",
            None,
            json!({ "price": 25, "contestId": contest_id }),
        )
        .await;
    assert_eq!(unauthenticated.status(), 401);
}

#[tokio::test]
async fn test_gateway_outage_surfaces_as_server_error() {
    let app = TestApp::spawn().await.unwrap();
    let contest = app
        .confirmed_contest(
            "creator-1",
            25.0,
            0,
            OffsetDateTime::now_utc() + Duration::days(2),
        )
        .await;
    let token = app.token("user-1", Role::User);

    app.gateway.set_unavailable(true);
    let response = app
        .post(
            "/payments/create-intent",
            Some(&token),
            json!({ "price": 25, "contestId": contest["id"] }),
        )
        .await;
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_confirm_reports_unpaid_intent() {
    let app = TestApp::spawn().await.unwrap();
    let contest = app
        .confirmed_contest(
            "creator-1",
            25.0,
            0,
            OffsetDateTime::now_utc() + Duration::days(2),
        )
        .await;
    let token = app.token("user-1", Role::User);

    let intent: Value = app
        .post(
            "/payments/create-intent",
            Some(&token),
            json!({ "price": 25, "contestId": contest["id"] }),
        )
        .await
        .json()
        .await
        .unwrap();

    let stranger = app.token("user-2", Role::User);
    let forbidden = app
        .post(
            "/payments/confirm",
            Some(&stranger),
            json!({ "paymentId": intent["paymentId"] }),
        )
        .await;
    assert_eq!(forbidden.status(), 403);

    let declined = app
        .post(
            "/payments/confirm",
            Some(&token),
            json!({ "paymentId": intent["paymentId"] }),
        )
        .await;
    assert_eq!(declined.status(), 400);
    let body: Value = declined.json().await.unwrap();
    assert_eq!(body["message"], "Payment not completed");
    assert_eq!(body["payment"]["paymentStatus"], "failed");
}

#[tokio::test]
async fn test_webhook_completes_payment_once() {
    let app = TestApp::spawn().await.unwrap();
    let contest = app
        .confirmed_contest(
            "creator-1",
            25.0,
            0,
            OffsetDateTime::now_utc() + Duration::days(2),
        )
        .await;
    let token = app.token("user-1", Role::User);

    let intent: Value = app
        .post(
            "/payments/create-intent",
            Some(&token),
            json!({ "price": 25, "contestId": contest["id"] }),
        )
        .await
        .json()
        .await
        .unwrap();
    let intent_id = intent_id_from_secret(intent["clientSecret"].as_str().unwrap());

    let event = json!({
        "id": "evt_it_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "status": "succeeded" } }
    });

    let forged = app.send_webhook(&event, "whsec_not_ours").await;
    assert_eq!(forged.status(), 400);

    for _ in 0..2 {
        let delivered = app.send_webhook(&event, app.webhook_secret()).await;
        assert_eq!(delivered.status(), 200);
        let body: Value = delivered.json().await.unwrap();
        assert_eq!(body["received"], true);
    }

    // Already completed, so confirm returns the stored payment untouched
    let confirmed = app
        .post(
            "/payments/confirm",
            Some(&token),
            json!({ "paymentId": intent["paymentId"] }),
        )
        .await;
    assert_eq!(confirmed.status(), 200);
    let body: Value = confirmed.json().await.unwrap();
    assert_eq!(body["payment"]["paymentStatus"], "completed");
    assert_eq!(body["payment"]["transactionId"], intent_id.as_str());
    assert!(body["payment"]["paidAt"].as_str().is_some());

    let paid_again = app
        .post(
            "/payments/create-intent",
            Some(&token),
            json!({ "price": 25, "contestId": contest["id"] }),
        )
        .await;
    assert_eq!(paid_again.status(), 400);
    let body: Value = paid_again.json().await.unwrap();
    assert_eq!(body["message"], "You have already paid for this contest");
}

#[tokio::test]
async fn test_malformed_bodies_get_the_error_envelope() {
    let app = TestApp::spawn().await.unwrap();
    let contest = app
        .confirmed_contest(
            "creator-1",
            25.0,
            0,
            OffsetDateTime::now_utc() + Duration::days(2),
        )
        .await;
    let token = app.token("user-1", Role::User);

    let missing_id = app.post("/payments/confirm", Some(&token), json!({})).await;
    assert_eq!(missing_id.status(), 400);
    let body: Value = missing_id.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("paymentId"));

    let negative = app
        .post(
            "/payments/create-intent",
            Some(&token),
            json!({ "price": -5, "contestId": contest["id"] }),
        )
        .await;
    assert_eq!(negative.status(), 400);
    let body: Value = negative.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("price"));

    let bad_id = app.get("/contests/not-a-uuid").await;
    assert_eq!(bad_id.status(), 400);
    let body: Value = bad_id.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_payment_history_is_per_caller() {
    let app = TestApp::spawn().await.unwrap();
    let contest = app
        .confirmed_contest(
            "creator-1",
            25.0,
            0,
            OffsetDateTime::now_utc() + Duration::days(2),
        )
        .await;
    let contest_id = contest["id"].as_str().unwrap();
    let payment_id = app.paid_entry("user-1", contest_id, 25.0).await;

    let mine: Value = app
        .get_as("/payments/me", &app.token("user-1", Role::User))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(mine["success"], true);
    assert_eq!(mine["count"], 1);
    assert_eq!(mine["data"][0]["id"], payment_id.as_str());
    assert_eq!(mine["data"][0]["paymentStatus"], "completed");
    assert_eq!(mine["data"][0]["amount"], 25.0);

    let theirs: Value = app
        .get_as("/payments/me", &app.token("user-2", Role::User))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(theirs["count"], 0);

    let anonymous = app.get("/payments/me").await;
    assert_eq!(anonymous.status(), 401);
}
