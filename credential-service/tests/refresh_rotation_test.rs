//! Refresh rotation and replay detection.

mod common;

use common::{unique_email, TestApp};
use credential_service::models::id;

#[tokio::test]
async fn replay_revokes_the_family_and_is_audited() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (owner_token, _) = app
        .owner_session(&unique_email("replay"), "CorrectHorseBatteryStaple!")
        .await;
    let minted = app
        .mint_primary(&owner_token, &["posts:read"], "replayed")
        .await;
    let key_id = id::from_external(minted["key_id"].as_str().unwrap()).unwrap();

    let (_at1, rt1) = app
        .key_session(
            minted["key_public_id"].as_str().unwrap(),
            minted["key_secret"].as_str().unwrap(),
        )
        .await;

    // Normal rotation consumes RT1 and yields RT2.
    let res = app.refresh("gateway", &rt1).await;
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    let rt2 = body["data"]["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(rt2, rt1);

    // Presenting RT1 again is replay.
    let res = app.refresh("gateway", &rt1).await;
    assert_eq!(res.status(), 401);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");

    // The replay was audited with the key as subject.
    let row: Option<(String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT actor_kind, subject_kind FROM audit_events
        WHERE action = 'refresh:replay_attempt' AND subject_id = $1
        "#,
    )
    .bind(key_id)
    .fetch_optional(app.state.db.pool())
    .await
    .unwrap();
    let (actor_kind, subject_kind) = row.expect("replay audit event recorded");
    assert_eq!(actor_kind, "key");
    assert_eq!(subject_kind.as_deref(), Some("key"));

    // Family revocation: the legitimate RT2 died with the replay.
    let res = app.refresh("gateway", &rt2).await;
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn refresh_token_is_bound_to_its_surface() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (_, owner_refresh) = app
        .owner_session(&unique_email("surface"), "CorrectHorseBatteryStaple!")
        .await;

    // An owner refresh token is worthless on the Gateway.
    let res = app.refresh("gateway", &owner_refresh).await;
    assert_eq!(res.status(), 401);

    // And it still works where it belongs.
    let res = app.refresh("console", &owner_refresh).await;
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn unknown_refresh_tokens_are_rejected() {
    let Some(app) = TestApp::try_spawn().await else { return };

    let res = app.refresh("gateway", "rt_definitelynotissuedbyanyone000000000000").await;
    assert_eq!(res.status(), 401);

    let res = app.refresh("console", "garbage").await;
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn refresh_for_a_deactivated_key_fails() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (owner_token, _) = app
        .owner_session(&unique_email("deadkey"), "CorrectHorseBatteryStaple!")
        .await;
    let minted = app
        .mint_primary(&owner_token, &["posts:read"], "shortlived")
        .await;
    let (_, refresh) = app
        .key_session(
            minted["key_public_id"].as_str().unwrap(),
            minted["key_secret"].as_str().unwrap(),
        )
        .await;

    let res = app
        .client
        .post(format!(
            "{}/console/keys/{}/deactivate",
            app.address,
            minted["key_id"].as_str().unwrap()
        ))
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({ "cascade": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = app.refresh("gateway", &refresh).await;
    assert_eq!(res.status(), 401);
}
