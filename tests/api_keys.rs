//! API key lifecycle, dispatcher behavior and usage reporting over HTTP.

mod common;

use axum::http::StatusCode;
use common::{ADMIN_SECRET, bearer_request, cookie_request, spawn_app};
use serde_json::json;

#[tokio::test]
async fn key_management_requires_session() {
    let app = spawn_app();

    let list = app.send(cookie_request("GET", "/api/keys", "")).await;
    let usage = app.send(cookie_request("GET", "/api/usage", "")).await;

    assert_eq!(list.status, StatusCode::UNAUTHORIZED);
    assert_eq!(usage.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn created_key_is_shown_once() {
    let app = spawn_app();
    let (access, _, _) = app.login("keys@example.com").await;
    let (key, key_id) = app.create_api_key(&access).await;
    assert!(key.starts_with("arb_"));

    let list = app
        .send(cookie_request(
            "GET",
            "/api/keys",
            &format!("auth-token={}", access),
        ))
        .await;

    assert_eq!(list.status, StatusCode::OK);
    let keys = list.body["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["id"], key_id.as_str());
    assert_eq!(keys[0]["key_prefix"], format!("{}...", &key[..12]));
    assert!(!list.body.to_string().contains(&key));
}

#[tokio::test]
async fn api_key_authorizes_tool_calls_until_revoked() {
    let app = spawn_app();
    let (access, _, _) = app.login("tools@example.com").await;
    let (key, key_id) = app.create_api_key(&access).await;

    let call = app
        .send(bearer_request(
            "POST",
            "/api/v1/tools/ask_stylus",
            &key,
            Some(json!({ "question": "what is a storage slot?" })),
        ))
        .await;
    assert_eq!(call.status, StatusCode::OK, "{}", call.body);
    assert_eq!(call.body["data"], "result from ask_stylus");
    assert_eq!(call.body["tokens_used"], 11);

    let revoke = app
        .send(cookie_request(
            "DELETE",
            &format!("/api/keys/{}", key_id),
            &format!("auth-token={}", access),
        ))
        .await;
    assert_eq!(revoke.status, StatusCode::OK);

    let again = app
        .send(cookie_request(
            "DELETE",
            &format!("/api/keys/{}", key_id),
            &format!("auth-token={}", access),
        ))
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);

    let rejected = app
        .send(bearer_request(
            "POST",
            "/api/v1/tools/ask_stylus",
            &key,
            Some(json!({ "question": "still there?" })),
        ))
        .await;
    assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cannot_revoke_another_users_key() {
    let app = spawn_app();
    let (owner, _, _) = app.login("owner@example.com").await;
    let (other, _, _) = app.login("other@example.com").await;
    let (key, key_id) = app.create_api_key(&owner).await;

    let revoke = app
        .send(cookie_request(
            "DELETE",
            &format!("/api/keys/{}", key_id),
            &format!("auth-token={}", other),
        ))
        .await;
    assert_eq!(revoke.status, StatusCode::NOT_FOUND);

    let call = app
        .send(bearer_request(
            "POST",
            "/api/v1/tools/get_workflow",
            &key,
            Some(json!({ "workflowType": "build" })),
        ))
        .await;
    assert_eq!(call.status, StatusCode::OK);
}

#[tokio::test]
async fn rejections_are_indistinguishable() {
    let app = spawn_app();
    let args = Some(json!({ "workflowType": "build" }));

    let unknown_key = app
        .send(bearer_request(
            "POST",
            "/api/v1/tools/get_workflow",
            "arb_000000000000000000000000000000000000000000000000",
            args.clone(),
        ))
        .await;
    let wrong_secret = app
        .send(bearer_request(
            "POST",
            "/api/v1/tools/get_workflow",
            "not-the-admin-secret",
            args.clone(),
        ))
        .await;
    let missing = app
        .send(cookie_request("POST", "/api/v1/tools/get_workflow", ""))
        .await;

    for response in [&unknown_key, &wrong_secret, &missing] {
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }
    assert_eq!(unknown_key.body, wrong_secret.body);
    assert_eq!(wrong_secret.body, missing.body);
}

#[tokio::test]
async fn admin_secret_calls_tools_without_metering() {
    let app = spawn_app();

    let call = app
        .send(bearer_request(
            "POST",
            "/api/v1/tools/get_workflow",
            ADMIN_SECRET,
            Some(json!({ "workflowType": "deploy", "network": "arbitrum_one" })),
        ))
        .await;

    assert_eq!(call.status, StatusCode::OK);
    assert!(app.store.usage_entries().is_empty());
}

#[tokio::test]
async fn invalid_tool_arguments_are_400_and_metered() {
    let app = spawn_app();
    let (access, _, _) = app.login("args@example.com").await;
    let (key, _) = app.create_api_key(&access).await;

    let missing_field = app
        .send(bearer_request(
            "POST",
            "/api/v1/tools/generate_tests",
            &key,
            Some(json!({})),
        ))
        .await;
    let unknown_tool = app
        .send(bearer_request(
            "POST",
            "/api/v1/tools/mine_bitcoin",
            &key,
            Some(json!({})),
        ))
        .await;
    let failing = app
        .send(bearer_request(
            "POST",
            "/api/v1/tools/ask_stylus",
            &key,
            Some(json!({ "question": "fail" })),
        ))
        .await;

    assert_eq!(missing_field.status, StatusCode::BAD_REQUEST);
    assert_eq!(unknown_tool.status, StatusCode::BAD_REQUEST);
    assert_eq!(failing.status, StatusCode::BAD_GATEWAY);

    let usage = app.store.usage_entries();
    assert_eq!(usage.len(), 3);
    assert!(usage.iter().all(|entry| !entry.success));
    assert!(usage.iter().any(|entry| entry.tool == "mine_bitcoin"));
}

#[tokio::test]
async fn usage_report_aggregates_calls() {
    let app = spawn_app();
    let (access, _, _) = app.login("stats@example.com").await;
    let (key, _) = app.create_api_key(&access).await;

    for tool in ["ask_stylus", "ask_stylus", "get_stylus_context"] {
        let args = match tool {
            "ask_stylus" => json!({ "question": "why?" }),
            _ => json!({ "query": "erc20", "nResults": 3 }),
        };
        let call = app
            .send(bearer_request(
                "POST",
                &format!("/api/v1/tools/{}", tool),
                &key,
                Some(args),
            ))
            .await;
        assert_eq!(call.status, StatusCode::OK);
    }

    let usage = app
        .send(cookie_request(
            "GET",
            "/api/usage?days=7",
            &format!("auth-token={}", access),
        ))
        .await;

    assert_eq!(usage.status, StatusCode::OK);
    assert_eq!(usage.body["total_calls"], 3);
    assert_eq!(usage.body["total_tokens"], 33);
    assert_eq!(usage.body["calls_by_tool"]["ask_stylus"], 2);
    assert_eq!(usage.body["calls_by_tool"]["get_stylus_context"], 1);
    assert_eq!(usage.body["daily_usage"][0]["calls"], 3);
}

#[tokio::test]
async fn usage_logging_failure_does_not_fail_calls() {
    let app = spawn_app();
    let (access, _, _) = app.login("flaky@example.com").await;
    let (key, _) = app.create_api_key(&access).await;
    app.store.fail_best_effort_writes(true);

    let call = app
        .send(bearer_request(
            "POST",
            "/api/v1/tools/ask_stylus",
            &key,
            Some(json!({ "question": "ok?" })),
        ))
        .await;

    assert_eq!(call.status, StatusCode::OK);
}
