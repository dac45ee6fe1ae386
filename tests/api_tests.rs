use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use marginalia::config::Config;
use tower::ServiceExt;

/// Default token seeded by migration (must match m20240101_initial.rs)
const DEFAULT_TOKEN: &str = "marginalia_default_token_please_regenerate";

async fn spawn_app() -> Router {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.storage.stylesheets_path = std::env::temp_dir()
        .join(format!("marginalia-test-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();

    let state = marginalia::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    marginalia::api::router(state).await
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn get(app: &Router, uri: &str, token: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("X-Api-Key", token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: &str,
    payload: serde_json::Value,
) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("X-Api-Key", token)
                .header("Content-Type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Register a user and return (user_id, token).
async fn register(app: &Router, username: &str, email: &str) -> (i64, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "username": username,
                        "email": email,
                        "password": "correct horse battery staple",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let user_id = json["data"]["user"]["id"].as_i64().unwrap();
    let token = json["data"]["token"].as_str().unwrap().to_string();
    (user_id, token)
}

#[tokio::test]
async fn test_auth_endpoints() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/system/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get(&app, "/api/system/status", "wrong-token").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get(&app, "/api/system/status", DEFAULT_TOKEN).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["database"], serde_json::json!(true));
    assert_eq!(json["data"]["users"].as_u64().unwrap(), 1);
}

#[tokio::test]
async fn test_register_and_login() {
    let app = spawn_app().await;

    let (_user_id, token) = register(&app, "alice", "alice@example.com").await;
    assert_eq!(token.len(), 64);

    // the minted token authenticates
    let response = get(&app, "/api/auth/me", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["username"], "alice");

    // login with the same credentials returns the same token
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "username": "alice",
                        "password": "correct horse battery staple",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["token"], serde_json::json!(token));

    // duplicate username is rejected with a conflict
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "username": "alice",
                        "email": "other@example.com",
                        "password": "another long password",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_each_user_gets_own_token() {
    let app = spawn_app().await;

    let (_alice_id, alice_token) = register(&app, "alice", "alice@example.com").await;
    let (_bob_id, bob_token) = register(&app, "bob", "bob@example.com").await;

    assert_ne!(alice_token, bob_token);

    // registering bob did not disturb alice's token
    let response = get(&app, "/api/auth/token", &alice_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["token"], serde_json::json!(alice_token));
}

#[tokio::test]
async fn test_page_crud() {
    let app = spawn_app().await;
    let (user_id, token) = register(&app, "carol", "carol@example.com").await;

    let response = send_json(
        &app,
        "POST",
        "/api/pages",
        &token,
        serde_json::json!({"name": "My Blog"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let page_id = json["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(json["data"]["name"], "My Blog");
    assert_eq!(json["data"]["user_id"].as_i64().unwrap(), user_id);
    assert_eq!(json["data"]["has_stylesheet"], serde_json::json!(false));

    // listed for its owner
    let response = get(&app, "/api/pages", &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    // rename
    let response = send_json(
        &app,
        "PUT",
        &format!("/api/pages/{page_id}"),
        &token,
        serde_json::json!({"name": "Renamed"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, &format!("/api/pages/{page_id}"), &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["name"], "Renamed");

    // only the owner may rename
    let (_other_id, other_token) = register(&app, "mallory", "mallory@example.com").await;
    let response = send_json(
        &app,
        "PUT",
        &format!("/api/pages/{page_id}"),
        &other_token,
        serde_json::json!({"name": "Hijacked"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // delete, then the page is gone
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/pages/{page_id}"))
                .header("X-Api-Key", &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, &format!("/api/pages/{page_id}"), &token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comment_thread_nesting() {
    let app = spawn_app().await;
    let (_user_id, token) = register(&app, "dave", "test@example.com").await;

    let response = send_json(
        &app,
        "POST",
        "/api/pages",
        &token,
        serde_json::json!({"name": "Thread page"}),
    )
    .await;
    let page_id = body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let post = |text: &str, parent: Option<String>| {
        let payload = serde_json::json!({
            "page_id": page_id,
            "text": text,
            "parent_id": parent,
        });
        send_json(&app, "POST", "/api/comments", &token, payload)
    };

    let root_json = body_json(post("root", None).await).await;
    let root_id = root_json["data"]["id"].as_str().unwrap().to_string();

    let reply_json = body_json(post("first reply", Some(root_id.clone())).await).await;
    let reply_id = reply_json["data"]["id"].as_str().unwrap().to_string();

    body_json(post("second reply", Some(root_id.clone())).await).await;
    body_json(post("nested", Some(reply_id.clone())).await).await;

    let response = get(&app, &format!("/api/pages/{page_id}/comments"), &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    let thread = json["data"].as_array().unwrap();
    assert_eq!(thread.len(), 1);

    let root = &thread[0];
    assert_eq!(root["text"], "root");
    assert_eq!(root["parent"], serde_json::Value::Null);
    assert_eq!(root["user"]["username"], "dave");
    // md5 of "test@example.com"
    assert_eq!(root["user"]["gravatar"], "55502f40dc8b7c769880b10874abc9d0");

    let children = root["children"].as_array().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["text"], "first reply");
    assert_eq!(children[1]["text"], "second reply");

    let nested = children[0]["children"].as_array().unwrap();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0]["text"], "nested");
    assert_eq!(nested[0]["parent"], serde_json::json!(reply_id));

    // a subtree fetch is rooted at the requested comment
    let response = get(&app, &format!("/api/comments/{reply_id}"), &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["text"], "first reply");
    assert_eq!(json["data"]["parent"], serde_json::json!(root_id));
    assert_eq!(json["data"]["children"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reply_must_stay_on_same_page() {
    let app = spawn_app().await;
    let (_user_id, token) = register(&app, "erin", "erin@example.com").await;

    let page_a = body_json(
        send_json(
            &app,
            "POST",
            "/api/pages",
            &token,
            serde_json::json!({"name": "A"}),
        )
        .await,
    )
    .await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let page_b = body_json(
        send_json(
            &app,
            "POST",
            "/api/pages",
            &token,
            serde_json::json!({"name": "B"}),
        )
        .await,
    )
    .await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let parent = body_json(
        send_json(
            &app,
            "POST",
            "/api/comments",
            &token,
            serde_json::json!({"page_id": page_a, "text": "on page A"}),
        )
        .await,
    )
    .await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = send_json(
        &app,
        "POST",
        "/api/comments",
        &token,
        serde_json::json!({"page_id": page_b, "text": "cross-page reply", "parent_id": parent}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_comment_delete_removes_subtree() {
    let app = spawn_app().await;
    let (_user_id, token) = register(&app, "frank", "frank@example.com").await;

    let page_id = body_json(
        send_json(
            &app,
            "POST",
            "/api/pages",
            &token,
            serde_json::json!({"name": "P"}),
        )
        .await,
    )
    .await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let mut parent: Option<String> = None;
    let mut ids = Vec::new();
    for text in ["a", "b", "c"] {
        let json = body_json(
            send_json(
                &app,
                "POST",
                "/api/comments",
                &token,
                serde_json::json!({"page_id": page_id, "text": text, "parent_id": parent}),
            )
            .await,
        )
        .await;
        let id = json["data"]["id"].as_str().unwrap().to_string();
        parent = Some(id.clone());
        ids.push(id);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/comments/{}", ids[0]))
                .header("X-Api-Key", &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["deleted"].as_u64().unwrap(), 3);

    for id in &ids {
        let response = get(&app, &format!("/api/comments/{id}"), &token).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_stylesheet_round_trip() {
    let app = spawn_app().await;
    let (_user_id, token) = register(&app, "grace", "grace@example.com").await;

    let page_id = body_json(
        send_json(
            &app,
            "POST",
            "/api/pages",
            &token,
            serde_json::json!({"name": "Styled"}),
        )
        .await,
    )
    .await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let css = "body { margin: 0; }";

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/pages/{page_id}/stylesheet"))
                .header("X-Api-Key", &token)
                .header("Content-Type", "text/css")
                .body(Body::from(css))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["has_stylesheet"], serde_json::json!(true));

    let response = get(&app, &format!("/api/pages/{page_id}/stylesheet"), &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap(),
        "text/css; charset=utf-8"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), css.as_bytes());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/pages/{page_id}/stylesheet"))
                .header("X-Api-Key", &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, &format!("/api/pages/{page_id}/stylesheet"), &token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_validation_errors() {
    let app = spawn_app().await;
    let (_user_id, token) = register(&app, "heidi", "heidi@example.com").await;

    // blank page name
    let response = send_json(
        &app,
        "POST",
        "/api/pages",
        &token,
        serde_json::json!({"name": "   "}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // malformed email on registration
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "username": "ivan",
                        "email": "not-an-email",
                        "password": "long enough password",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // short password
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "username": "judy",
                        "email": "judy@example.com",
                        "password": "short",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // comment on a page that does not exist
    let response = send_json(
        &app,
        "POST",
        "/api/comments",
        &token,
        serde_json::json!({"page_id": "no-such-page", "text": "hello"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
