//! Granted role listing and policy-filtered resource listing.

mod common;

use access_service::models::{AppRole, Resource, Sensitivity};
use access_service::services::store::Assignee;
use access_service::services::MockPrincipalStore;
use chrono::Utc;
use common::{grant, TestApp, TestOptions};
use serde_json::Value;

fn resource(id: i64, name: &str, sensitivity: Sensitivity) -> Resource {
    Resource {
        id,
        name: name.to_string(),
        resource_type: "database".to_string(),
        sensitivity,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn lists_grants_for_role_and_direct_assignment() {
    // First signup in a fresh store gets id 1
    let store = MockPrincipalStore::new()
        .with_grant(Assignee::Role(AppRole::Devops), grant(1, "deploy", Sensitivity::Medium))
        .with_grant(Assignee::Principal(1), grant(2, "billing-ro", Sensitivity::Low))
        .with_grant(Assignee::Role(AppRole::Admin), grant(3, "break-glass", Sensitivity::High));
    let app = TestApp::spawn_with(TestOptions {
        store,
        ..TestOptions::default()
    })
    .await;
    let (token, id) = app.trusted_user("ops@example.com", AppRole::Devops).await;
    assert_eq!(id, 1);

    let res = app.get("/me/aws/roles", Some(&token)).await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    let roles = body["roles"].as_array().unwrap();
    let names: Vec<&str> = roles.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["deploy", "billing-ro"]);
    assert_eq!(roles[0]["risk_level"], "medium");
    assert_eq!(roles[0]["env"], "prod");
    assert!(roles[0].get("arn").is_none());
}

#[tokio::test]
async fn resource_listing_returns_only_readable_entries() {
    let store = MockPrincipalStore::new()
        .with_resource(Assignee::Role(AppRole::User), resource(1, "wiki", Sensitivity::Low))
        .with_resource(Assignee::Role(AppRole::User), resource(2, "payroll-db", Sensitivity::High))
        .with_resource(Assignee::Role(AppRole::Admin), resource(3, "audit-log", Sensitivity::Medium));
    let app = TestApp::spawn_with(TestOptions {
        store,
        ..TestOptions::default()
    })
    .await;
    let (token, _) = app.trusted_user("reader@example.com", AppRole::User).await;

    let res = app.get("/resources", Some(&token)).await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    let resources = body["resources"].as_array().unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0]["name"], "wiki");
    assert_eq!(resources[0]["type"], "database");
    assert_eq!(resources[0]["sensitivity"], "low");

    // signup, login, enroll, verify, then one decision per candidate
    app.settle_audit(6).await;
    let decisions: Vec<_> = app
        .audit
        .snapshot()
        .into_iter()
        .filter(|r| r.event.as_str() == "access_decision")
        .collect();
    assert_eq!(decisions.len(), 2);
    let denied = decisions.iter().find(|r| !r.allowed).unwrap();
    assert_eq!(denied.resource_name, "payroll-db");
    assert_eq!(denied.policy_name, "high-sensitivity-admin-only");
}

#[tokio::test]
async fn admin_sees_high_sensitivity_resources() {
    let store = MockPrincipalStore::new()
        .with_resource(Assignee::Role(AppRole::Admin), resource(1, "payroll-db", Sensitivity::High))
        .with_resource(Assignee::Role(AppRole::Admin), resource(2, "hr-share", Sensitivity::Medium));
    let app = TestApp::spawn_with(TestOptions {
        store,
        ..TestOptions::default()
    })
    .await;
    let (token, _) = app.trusted_user("admin@example.com", AppRole::Admin).await;

    let body: Value = app.get("/resources", Some(&token)).await.json().await.unwrap();
    assert_eq!(body["resources"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn listing_requires_trusted_token() {
    let app = TestApp::spawn().await;

    let res = app.get("/resources", None).await;
    assert_eq!(res.status(), 401);

    let (provisional, _) = app.signup("early@example.com").await;
    let res = app.get("/resources", Some(&provisional)).await;
    assert_eq!(res.status(), 401);
}
