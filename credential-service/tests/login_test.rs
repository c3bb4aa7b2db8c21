//! Owner registration, login and console refresh flows.

mod common;

use common::{unique_email, TestApp};

#[tokio::test]
async fn register_and_login_owner() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let email = unique_email("alice");

    let res = app.register_owner(&email, "CorrectHorseBatteryStaple!").await;
    assert_eq!(res.status(), 201);
    let body: serde_json::Value = res.json().await.unwrap();
    let owner_id = body["data"]["owner_id"].as_str().unwrap();
    assert_eq!(owner_id.len(), 32);
    assert!(owner_id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    let res = app.login(&email, "CorrectHorseBatteryStaple!").await;
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["expires_in"], 900);
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert!(body["data"]["refresh_token"].as_str().unwrap().starts_with("rt_"));
}

#[tokio::test]
async fn duplicate_registration_is_a_conflict() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let email = unique_email("dupe");

    assert_eq!(app.register_owner(&email, "CorrectHorseBatteryStaple!").await.status(), 201);

    let res = app.register_owner(&email, "AnotherFinePassword123!").await;
    assert_eq!(res.status(), 409);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn short_password_fails_validation() {
    let Some(app) = TestApp::try_spawn().await else { return };

    let res = app.register_owner(&unique_email("shorty"), "short").await;
    assert_eq!(res.status(), 422);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "validation_failed");
    assert!(body["error"]["details"]["fields"]["password"].is_array());
}

#[tokio::test]
async fn bad_credentials_are_generically_unauthorized() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let email = unique_email("bob");
    app.owner_session(&email, "CorrectHorseBatteryStaple!").await;

    // Wrong password and unknown email are indistinguishable.
    for (try_email, password) in [
        (email.clone(), "wrong-password-entirely".to_string()),
        (unique_email("nobody"), "CorrectHorseBatteryStaple!".to_string()),
    ] {
        let res = app.login(&try_email, &password).await;
        assert_eq!(res.status(), 401);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"]["code"], "unauthorized");
        assert_eq!(body["error"]["message"], "Unauthorized");
    }
}

#[tokio::test]
async fn console_refresh_rotates_the_token() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (_, refresh) = app
        .owner_session(&unique_email("carol"), "CorrectHorseBatteryStaple!")
        .await;

    let res = app.refresh("console", &refresh).await;
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    let new_refresh = body["data"]["refresh_token"].as_str().unwrap();
    assert_ne!(new_refresh, refresh);

    // The old token was consumed.
    let res = app.refresh("console", &refresh).await;
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn logout_revokes_the_refresh_token() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (_, refresh) = app
        .owner_session(&unique_email("dave"), "CorrectHorseBatteryStaple!")
        .await;

    let res = app
        .client
        .post(format!("{}/console/auth/logout", app.address))
        .json(&serde_json::json!({ "refresh_token": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    assert_eq!(app.refresh("console", &refresh).await.status(), 401);
}

#[tokio::test]
async fn protected_console_routes_require_a_token() {
    let Some(app) = TestApp::try_spawn().await else { return };

    let res = app
        .client
        .get(format!("{}/console/keys", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    // A key token is the wrong type for the Console surface.
    let (owner_token, _) = app
        .owner_session(&unique_email("erin"), "CorrectHorseBatteryStaple!")
        .await;
    let minted = app
        .mint_primary(&owner_token, &["posts:read"], "probe")
        .await;
    let (key_token, _) = app
        .key_session(
            minted["key_public_id"].as_str().unwrap(),
            minted["key_secret"].as_str().unwrap(),
        )
        .await;

    let res = app
        .client
        .get(format!("{}/console/keys", app.address))
        .bearer_auth(&key_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
}
