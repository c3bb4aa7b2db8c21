//! Key minting, envelope enforcement, rotation and cascade deactivation.

mod common;

use common::{unique_email, TestApp};

#[tokio::test]
async fn mint_primary_and_list() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (owner_token, _) = app
        .owner_session(&unique_email("alice"), "CorrectHorseBatteryStaple!")
        .await;

    let minted = app
        .mint_primary(
            &owner_token,
            &["keys:issue", "posts:create", "posts:read", "comments:write"],
            "root",
        )
        .await;

    let key_id = minted["key_id"].as_str().unwrap();
    assert_eq!(key_id.len(), 32);
    let public_id = minted["key_public_id"].as_str().unwrap();
    assert!(public_id.starts_with("apub_"));
    assert_eq!(public_id.len(), 21);
    let secret = minted["key_secret"].as_str().unwrap();
    assert!(secret.starts_with("sec_"));
    assert!(secret.len() >= 32);

    let res = app
        .client
        .get(format!("{}/console/keys", app.address))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    let listed = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|k| k["key_id"] == key_id)
        .expect("minted key is listed");
    assert_eq!(listed["active"], true);
    assert_eq!(listed["key_type"], "primary");
    assert_eq!(listed["initial_author_key_id"], key_id);
}

#[tokio::test]
async fn envelope_violation_creates_no_key() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (owner_token, _) = app
        .owner_session(&unique_email("envy"), "CorrectHorseBatteryStaple!")
        .await;
    let minted = app
        .mint_primary(&owner_token, &["posts:create", "posts:read"], "narrow")
        .await;
    let (key_token, _) = app
        .key_session(
            minted["key_public_id"].as_str().unwrap(),
            minted["key_secret"].as_str().unwrap(),
        )
        .await;

    let res = app
        .mint_child(&key_token, "secondary", &["posts:create", "keys:issue"])
        .await;
    assert_eq!(res.status(), 422);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "validation_failed");
    assert_eq!(body["error"]["details"]["missing_permissions"], serde_json::json!(["keys:issue"]));

    // No key row was created.
    let res = app
        .client
        .get(format!("{}/console/keys", app.address))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn use_key_forbidden_permissions_rejected() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (owner_token, _) = app
        .owner_session(&unique_email("usekey"), "CorrectHorseBatteryStaple!")
        .await;
    let minted = app
        .mint_primary(
            &owner_token,
            &["posts:create", "posts:read", "comments:write", "keys:issue"],
            "parent",
        )
        .await;
    let (key_token, _) = app
        .key_session(
            minted["key_public_id"].as_str().unwrap(),
            minted["key_secret"].as_str().unwrap(),
        )
        .await;

    let res = app
        .mint_child(&key_token, "use", &["posts:create", "comments:write"])
        .await;
    assert_eq!(res.status(), 422);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        body["error"]["details"]["forbidden_permissions"],
        serde_json::json!(["posts:create"])
    );
}

#[tokio::test]
async fn rotation_preserves_shape_and_retires_the_old_key() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (owner_token, _) = app
        .owner_session(&unique_email("rotor"), "CorrectHorseBatteryStaple!")
        .await;
    let minted = app
        .mint_primary(&owner_token, &["posts:read", "keys:issue"], "rotated")
        .await;
    let old_id = minted["key_id"].as_str().unwrap().to_string();
    let old_secret = minted["key_secret"].as_str().unwrap().to_string();
    let old_public = minted["key_public_id"].as_str().unwrap().to_string();

    let res = app
        .client
        .post(format!("{}/console/keys/{}/rotate", app.address, old_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    let new_id = body["data"]["key_id"].as_str().unwrap().to_string();
    let new_secret = body["data"]["key_secret"].as_str().unwrap().to_string();
    let new_public = body["data"]["key_public_id"].as_str().unwrap().to_string();
    assert_ne!(new_id, old_id);
    assert_ne!(new_public, old_public);

    // Old credential is dead, the replacement works.
    assert_eq!(app.exchange(&old_public, &old_secret).await.status(), 401);
    assert_eq!(app.exchange(&new_public, &new_secret).await.status(), 200);

    let res = app
        .client
        .get(format!("{}/console/keys/{}", app.address, old_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    let old_row: serde_json::Value = res.json().await.unwrap();
    assert_eq!(old_row["data"]["active"], false);
    assert_eq!(old_row["data"]["rotated_to_id"], new_id);
    assert!(old_row["data"]["retired_utc"].is_string());

    let res = app
        .client
        .get(format!("{}/console/keys/{}", app.address, new_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    let new_row: serde_json::Value = res.json().await.unwrap();
    assert_eq!(new_row["data"]["rotated_from_id"], old_id);
    assert_eq!(new_row["data"]["permissions"], old_row["data"]["permissions"]);
    assert_eq!(new_row["data"]["key_type"], "primary");
    assert_eq!(new_row["data"]["use_count_current"], 0);

    // Retired keys are terminal.
    let res = app
        .client
        .post(format!("{}/console/keys/{}/rotate", app.address, old_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 409);
}

#[tokio::test]
async fn cascade_deactivation_covers_the_whole_subtree() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (owner_token, _) = app
        .owner_session(&unique_email("cascade"), "CorrectHorseBatteryStaple!")
        .await;
    let primary = app
        .mint_primary(&owner_token, &["keys:issue", "posts:read"], "P")
        .await;
    let (p_token, _) = app
        .key_session(
            primary["key_public_id"].as_str().unwrap(),
            primary["key_secret"].as_str().unwrap(),
        )
        .await;

    // P -> S1, S2; S1 -> U1.
    let s1 = app.mint_child(&p_token, "secondary", &["keys:issue", "posts:read"]).await;
    assert_eq!(s1.status(), 201);
    let s1: serde_json::Value = s1.json().await.unwrap();
    let s2 = app.mint_child(&p_token, "secondary", &["posts:read"]).await;
    assert_eq!(s2.status(), 201);
    let s2: serde_json::Value = s2.json().await.unwrap();

    let (s1_token, _) = app
        .key_session(
            s1["data"]["key_public_id"].as_str().unwrap(),
            s1["data"]["key_secret"].as_str().unwrap(),
        )
        .await;
    let u1 = app.mint_child(&s1_token, "use", &["posts:read"]).await;
    assert_eq!(u1.status(), 201);
    let u1: serde_json::Value = u1.json().await.unwrap();

    let res = app
        .client
        .post(format!(
            "{}/console/keys/{}/deactivate",
            app.address,
            primary["key_id"].as_str().unwrap()
        ))
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({ "cascade": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["keys_deactivated"], 4);

    // Every secret in the subtree is now refused.
    for key in [&primary, &s1["data"], &s2["data"], &u1["data"]] {
        let res = app
            .exchange(
                key["key_public_id"].as_str().unwrap(),
                key["key_secret"].as_str().unwrap(),
            )
            .await;
        assert_eq!(res.status(), 401);
    }

    // Idempotent: a second cascade deactivates nothing.
    let res = app
        .client
        .post(format!(
            "{}/console/keys/{}/deactivate",
            app.address,
            primary["key_id"].as_str().unwrap()
        ))
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({ "cascade": true }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["keys_deactivated"], 0);
}

#[tokio::test]
async fn use_count_limit_zero_disables_the_key() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (owner_token, _) = app
        .owner_session(&unique_email("limit"), "CorrectHorseBatteryStaple!")
        .await;
    let primary = app
        .mint_primary(&owner_token, &["keys:issue", "posts:read"], "P")
        .await;
    let (p_token, _) = app
        .key_session(
            primary["key_public_id"].as_str().unwrap(),
            primary["key_secret"].as_str().unwrap(),
        )
        .await;

    let res = app
        .client
        .post(format!("{}/api/keys", app.address))
        .bearer_auth(&p_token)
        .json(&serde_json::json!({
            "key_type": "use",
            "permissions": ["posts:read"],
            "use_count_limit": 0,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let minted: serde_json::Value = res.json().await.unwrap();

    let res = app
        .exchange(
            minted["data"]["key_public_id"].as_str().unwrap(),
            minted["data"]["key_secret"].as_str().unwrap(),
        )
        .await;
    assert_eq!(res.status(), 403);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "use_limit_exceeded");
}

#[tokio::test]
async fn use_keys_cannot_mint_children() {
    let Some(app) = TestApp::try_spawn().await else { return };
    let (owner_token, _) = app
        .owner_session(&unique_email("noissue"), "CorrectHorseBatteryStaple!")
        .await;
    let primary = app
        .mint_primary(&owner_token, &["keys:issue", "posts:read"], "P")
        .await;
    let (p_token, _) = app
        .key_session(
            primary["key_public_id"].as_str().unwrap(),
            primary["key_secret"].as_str().unwrap(),
        )
        .await;
    let use_key = app.mint_child(&p_token, "use", &["posts:read"]).await;
    assert_eq!(use_key.status(), 201);
    let use_key: serde_json::Value = use_key.json().await.unwrap();
    let (u_token, _) = app
        .key_session(
            use_key["data"]["key_public_id"].as_str().unwrap(),
            use_key["data"]["key_secret"].as_str().unwrap(),
        )
        .await;

    let res = app.mint_child(&u_token, "use", &["posts:read"]).await;
    assert_eq!(res.status(), 403);
}
