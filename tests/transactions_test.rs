mod common;

use axum::http::StatusCode;
use common::{auth_request, create_test_user, json_request, login_user, setup_test_app};

async fn create_transaction(
    app: &axum::Router,
    cookie: &str,
    payload: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let (status, body) = json_request(app, "POST", "/transactions", cookie, &payload).await?;
    anyhow::ensure!(
        status == StatusCode::CREATED,
        "transaction creation failed: {} {}",
        status,
        body
    );
    Ok(serde_json::from_str(&body)?)
}

#[tokio::test]
async fn test_create_transaction_with_explicit_date() -> anyhow::Result<()> {
    let app = setup_test_app().await?;
    create_test_user(&app.state, "alice", "password123").await?;
    let cookie = login_user(&app.router, "alice", "password123").await?;

    let created = create_transaction(
        &app.router,
        &cookie,
        serde_json::json!({
            "kind": "expense",
            "amount": 42.5,
            "currency": "USD",
            "note": "lunch",
            "date": "2024-03-10T12:00:00Z"
        }),
    )
    .await?;

    assert_eq!(created["kind"], "expense");
    assert_eq!(created["amount"], 42.5);
    assert_eq!(created["currency"], "USD");
    assert_eq!(created["note"], "lunch");
    assert!(created["date"].as_str().unwrap().starts_with("2024-03-10T12:00:00"));

    Ok(())
}

#[tokio::test]
async fn test_create_transaction_rejects_unknown_kind() -> anyhow::Result<()> {
    let app = setup_test_app().await?;
    create_test_user(&app.state, "alice", "password123").await?;
    let cookie = login_user(&app.router, "alice", "password123").await?;

    let payload = serde_json::json!({
        "kind": "transfer",
        "amount": 10.0,
        "currency": "USD"
    });
    let (status, body) = json_request(&app.router, "POST", "/transactions", &cookie, &payload).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("income"));

    Ok(())
}

#[tokio::test]
async fn test_create_transaction_rejects_nonpositive_amount() -> anyhow::Result<()> {
    let app = setup_test_app().await?;
    create_test_user(&app.state, "alice", "password123").await?;
    let cookie = login_user(&app.router, "alice", "password123").await?;

    for amount in [0.0, -5.0] {
        let payload = serde_json::json!({
            "kind": "expense",
            "amount": amount,
            "currency": "USD"
        });
        let (status, _) =
            json_request(&app.router, "POST", "/transactions", &cookie, &payload).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    Ok(())
}

#[tokio::test]
async fn test_create_transaction_rejects_unknown_category() -> anyhow::Result<()> {
    let app = setup_test_app().await?;
    create_test_user(&app.state, "alice", "password123").await?;
    let cookie = login_user(&app.router, "alice", "password123").await?;

    let payload = serde_json::json!({
        "kind": "expense",
        "amount": 10.0,
        "currency": "USD",
        "category_id": "does-not-exist"
    });
    let (status, body) = json_request(&app.router, "POST", "/transactions", &cookie, &payload).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Category does not exist"));

    Ok(())
}

#[tokio::test]
async fn test_list_transactions_filters_by_kind_and_range() -> anyhow::Result<()> {
    let app = setup_test_app().await?;
    create_test_user(&app.state, "alice", "password123").await?;
    let cookie = login_user(&app.router, "alice", "password123").await?;

    for (kind, amount, date) in [
        ("income", 1000.0, "2024-03-01T09:00:00Z"),
        ("expense", 50.0, "2024-03-05T12:00:00Z"),
        ("expense", 30.0, "2024-04-02T18:00:00Z"),
    ] {
        create_transaction(
            &app.router,
            &cookie,
            serde_json::json!({
                "kind": kind,
                "amount": amount,
                "currency": "USD",
                "date": date
            }),
        )
        .await?;
    }

    let (status, body) =
        auth_request(&app.router, "GET", "/transactions?kind=expense", &cookie).await?;
    assert_eq!(status, StatusCode::OK);
    let listed: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(listed["total_count"], 2);

    let (status, body) = auth_request(
        &app.router,
        "GET",
        "/transactions?from=2024-03-01T00:00:00Z&to=2024-03-31T23:59:59Z",
        &cookie,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let listed: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(listed["total_count"], 2);

    Ok(())
}

#[tokio::test]
async fn test_list_transactions_sorts_newest_first_by_default() -> anyhow::Result<()> {
    let app = setup_test_app().await?;
    create_test_user(&app.state, "alice", "password123").await?;
    let cookie = login_user(&app.router, "alice", "password123").await?;

    for date in ["2024-03-01T09:00:00Z", "2024-03-05T12:00:00Z"] {
        create_transaction(
            &app.router,
            &cookie,
            serde_json::json!({
                "kind": "expense",
                "amount": 10.0,
                "currency": "USD",
                "date": date
            }),
        )
        .await?;
    }

    let (_, body) = auth_request(&app.router, "GET", "/transactions", &cookie).await?;
    let listed: serde_json::Value = serde_json::from_str(&body)?;
    let first = listed["transactions"][0]["date"].as_str().unwrap();
    assert!(first.starts_with("2024-03-05"));

    let (_, body) =
        auth_request(&app.router, "GET", "/transactions?sort=date_asc", &cookie).await?;
    let listed: serde_json::Value = serde_json::from_str(&body)?;
    let first = listed["transactions"][0]["date"].as_str().unwrap();
    assert!(first.starts_with("2024-03-01"));

    Ok(())
}

#[tokio::test]
async fn test_update_transaction_merges_fields() -> anyhow::Result<()> {
    let app = setup_test_app().await?;
    create_test_user(&app.state, "alice", "password123").await?;
    let cookie = login_user(&app.router, "alice", "password123").await?;

    let created = create_transaction(
        &app.router,
        &cookie,
        serde_json::json!({
            "kind": "expense",
            "amount": 20.0,
            "currency": "USD",
            "note": "original",
            "date": "2024-03-10T12:00:00Z"
        }),
    )
    .await?;
    let id = created["id"].as_str().unwrap();

    let payload = serde_json::json!({ "amount": 25.0 });
    let (status, body) = json_request(
        &app.router,
        "PUT",
        &format!("/transactions/{}", id),
        &cookie,
        &payload,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let updated: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(updated["amount"], 25.0);
    assert_eq!(updated["note"], "original");
    assert_eq!(updated["kind"], "expense");

    Ok(())
}

#[tokio::test]
async fn test_update_transaction_requires_a_field() -> anyhow::Result<()> {
    let app = setup_test_app().await?;
    create_test_user(&app.state, "alice", "password123").await?;
    let cookie = login_user(&app.router, "alice", "password123").await?;

    let created = create_transaction(
        &app.router,
        &cookie,
        serde_json::json!({ "kind": "income", "amount": 5.0, "currency": "USD" }),
    )
    .await?;
    let id = created["id"].as_str().unwrap();

    let (status, _) = json_request(
        &app.router,
        "PUT",
        &format!("/transactions/{}", id),
        &cookie,
        &serde_json::json!({}),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_delete_transaction() -> anyhow::Result<()> {
    let app = setup_test_app().await?;
    create_test_user(&app.state, "alice", "password123").await?;
    let cookie = login_user(&app.router, "alice", "password123").await?;

    let created = create_transaction(
        &app.router,
        &cookie,
        serde_json::json!({ "kind": "income", "amount": 5.0, "currency": "USD" }),
    )
    .await?;
    let id = created["id"].as_str().unwrap();

    let (status, _) = auth_request(
        &app.router,
        "DELETE",
        &format!("/transactions/{}", id),
        &cookie,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = auth_request(
        &app.router,
        "GET",
        &format!("/transactions/{}", id),
        &cookie,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_transactions_are_isolated_per_user() -> anyhow::Result<()> {
    let app = setup_test_app().await?;
    create_test_user(&app.state, "alice", "password123").await?;
    create_test_user(&app.state, "bob", "password123").await?;
    let alice_cookie = login_user(&app.router, "alice", "password123").await?;
    let bob_cookie = login_user(&app.router, "bob", "password123").await?;

    let created = create_transaction(
        &app.router,
        &alice_cookie,
        serde_json::json!({ "kind": "expense", "amount": 99.0, "currency": "USD" }),
    )
    .await?;
    let id = created["id"].as_str().unwrap();

    let (status, _) = auth_request(
        &app.router,
        "GET",
        &format!("/transactions/{}", id),
        &bob_cookie,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = auth_request(
        &app.router,
        "DELETE",
        &format!("/transactions/{}", id),
        &bob_cookie,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = auth_request(&app.router, "GET", "/transactions", &bob_cookie).await?;
    let listed: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(listed["total_count"], 0);

    Ok(())
}
