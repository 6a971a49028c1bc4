use arena_core::Role;
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};

use crate::helpers::TestApp;

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::spawn().await.unwrap();
    let response = app.get("/health_check").await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_last_slot_goes_to_first_paid_user() {
    let app = TestApp::spawn().await.unwrap();
    let contest = app
        .confirmed_contest(
            "creator-1",
            25.0,
            1,
            OffsetDateTime::now_utc() + Duration::days(2),
        )
        .await;
    let contest_id = contest["id"].as_str().unwrap();
    assert_eq!(contest["price"], 25.0);

    let payment_a = app.paid_entry("user-a", contest_id, 25.0).await;
    let token_a = app.token("user-a", Role::User);
    let joined = app
        .post(
            "/participations",
            Some(&token_a),
            json!({
                "contestId": contest_id,
                "paymentId": payment_a,
                "submissionLink": "https://example.com/mascot-a.png",
            }),
        )
        .await;
    assert_eq!(joined.status(), 201);
    let body: Value = joined.json().await.unwrap();
    assert_eq!(body["submission"]["userName"], "user-a name");
    assert_eq!(body["submission"]["userEmail"], "user-a@example.com");
    assert_eq!(body["submission"]["paymentStatus"], "paid");

    let payment_b = app.paid_entry("user-b", contest_id, 25.0).await;
    let token_b = app.token("user-b", Role::User);
    let rejected = app
        .post(
            "/participations",
            Some(&token_b),
            json!({ "contestId": contest_id, "paymentId": payment_b }),
        )
        .await;
    assert_eq!(rejected.status(), 400);
    let body: Value = rejected.json().await.unwrap();
    assert_eq!(body["message"], "Contest participation limit reached");

    let contest: Value = app
        .get(&format!("/contests/{}", contest_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(contest["contest"]["participantsCount"], 1);

    let again = app
        .post(
            "/participations",
            Some(&token_a),
            json!({ "contestId": contest_id, "paymentId": payment_a }),
        )
        .await;
    assert_eq!(again.status(), 400);
}

#[tokio::test]
async fn test_roles_and_ownership() {
    let app = TestApp::spawn().await.unwrap();
    let user = app.token("user-1", Role::User);

    let not_a_creator = app
        .post(
            "/contests",
            Some(&user),
            json!({
                "name": "Jingle",
                "price": 5,
                "prizeMoney": 50,
                "deadline": "2999-01-01T00:00:00Z",
            }),
        )
        .await;
    assert_eq!(not_a_creator.status(), 403);

    let contest = app
        .confirmed_contest(
            "creator-1",
            5.0,
            0,
            OffsetDateTime::now_utc() + Duration::days(2),
        )
        .await;
    let contest_id = contest["id"].as_str().unwrap();

    let other_creator = app.token("creator-2", Role::Creator);
    let edit = app
        .client
        .put(format!("{}/contests/{}", app.base_url, contest_id))
        .bearer_auth(&other_creator)
        .json(&json!({ "prizeMoney": 1000 }))
        .send()
        .await
        .unwrap();
    assert_eq!(edit.status(), 403);

    let owner = app.token("creator-1", Role::Creator);
    let edit = app
        .client
        .put(format!("{}/contests/{}", app.base_url, contest_id))
        .bearer_auth(&owner)
        .json(&json!({ "prizeMoney": 1000 }))
        .send()
        .await
        .unwrap();
    assert_eq!(edit.status(), 200);
    let body: Value = edit.json().await.unwrap();
    assert_eq!(body["contest"]["status"], "pending");
    assert_eq!(body["contest"]["prizeMoney"], 1000.0);

    let missing = app.get(&format!("/contests/{}", uuid::Uuid::now_v7())).await;
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_winner_declared_once_after_deadline() {
    let app = TestApp::spawn().await.unwrap();
    let contest = app
        .confirmed_contest(
            "creator-1",
            5.0,
            0,
            OffsetDateTime::now_utc() + Duration::seconds(3),
        )
        .await;
    let contest_id = contest["id"].as_str().unwrap();

    let payment = app.paid_entry("user-1", contest_id, 5.0).await;
    let user = app.token("user-1", Role::User);
    let joined = app
        .post(
            "/participations",
            Some(&user),
            json!({ "contestId": contest_id, "paymentId": payment }),
        )
        .await;
    assert_eq!(joined.status(), 201);

    let owner = app.token("creator-1", Role::Creator);
    let winner_path = format!("/contests/{}/winner", contest_id);
    let early = app
        .patch(&winner_path, &owner, json!({ "winnerUserId": "user-1" }))
        .await;
    assert_eq!(early.status(), 400);

    tokio::time::sleep(std::time::Duration::from_secs(4)).await;

    let declared = app
        .patch(&winner_path, &owner, json!({ "winnerUserId": "user-1" }))
        .await;
    assert_eq!(declared.status(), 200);
    let body: Value = declared.json().await.unwrap();
    assert_eq!(body["contest"]["winnerUserId"], "user-1");

    let again = app
        .patch(&winner_path, &owner, json!({ "winnerUserId": "user-1" }))
        .await;
    assert_eq!(again.status(), 400);
    let body: Value = again.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Winner has already been declared for this contest"
    );
}

#[tokio::test]
async fn test_creator_reviews_submissions_before_declaring() {
    let app = TestApp::spawn().await.unwrap();
    let contest = app
        .confirmed_contest(
            "creator-1",
            5.0,
            0,
            OffsetDateTime::now_utc() + Duration::days(2),
        )
        .await;
    let contest_id = contest["id"].as_str().unwrap();

    let payment = app.paid_entry("user-1", contest_id, 5.0).await;
    let user = app.token("user-1", Role::User);
    let joined = app
        .post(
            "/participations",
            Some(&user),
            json!({
                "contestId": contest_id,
                "paymentId": payment,
                "submissionLink": "https://example.com/jingle.mp3",
            }),
        )
        .await;
    assert_eq!(joined.status(), 201);

    let submissions_path = format!("/participations/contest/{}", contest_id);
    let owner = app.token("creator-1", Role::Creator);
    let submissions: Value = app
        .get_as(&submissions_path, &owner)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(submissions["count"], 1);
    assert_eq!(submissions["data"][0]["userId"], "user-1");
    assert_eq!(
        submissions["data"][0]["submissionLink"],
        "https://example.com/jingle.mp3"
    );

    let other_creator = app
        .get_as(&submissions_path, &app.token("creator-2", Role::Creator))
        .await;
    assert_eq!(other_creator.status(), 403);
    let participant = app.get_as(&submissions_path, &user).await;
    assert_eq!(participant.status(), 403);

    let mine: Value = app
        .get_as("/participations/me", &user)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(mine["count"], 1);
    assert_eq!(mine["data"][0]["contestId"], contest_id);
    assert_eq!(mine["data"][0]["paymentStatus"], "paid");
}
