use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use factor_canon::classifier::ScriptedReply;
use factor_canon::{AppState, EditPolicy, ScriptedClassifier, ServiceConfig, router};

const PALLADIUM_ANSWER: &str = r#"{
    "canonicalToAliases": {
        "Palladium on carbon": ["Pd/C", "Pd on carbon"],
        "Platinum on alumina": ["Pt/Al2O3"]
    },
    "notes": "grouped by metal and support"
}"#;

fn app_with(classifier: ScriptedClassifier) -> (axum::Router, Arc<ScriptedClassifier>) {
    let classifier = Arc::new(classifier);
    let state = AppState::with_classifier(ServiceConfig::default(), classifier.clone());
    (router(Arc::new(state)), classifier)
}

async fn send(app: axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request");

    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

fn canonicalize_body() -> Value {
    json!({
        "columnName": "catalyst",
        "values": ["Pd/C", " Pd on carbon ", "Pt/Al2O3", null, "Pd/C"]
    })
}

#[tokio::test]
async fn canonicalize_returns_validated_mapping() {
    let (app, classifier) = app_with(ScriptedClassifier::answering(PALLADIUM_ANSWER));

    let (status, body) = send(app, Method::POST, "/api/canonicalize", Some(canonicalize_body())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(body["requestId"].as_str().is_some_and(|id| id.len() == 36));
    let mapping = &body["result"]["canonicalToAliases"];
    assert_eq!(mapping["Palladium on carbon"], json!(["Pd/C", "Pd on carbon"]));
    assert_eq!(mapping["Platinum on alumina"], json!(["Pt/Al2O3"]));
    assert_eq!(body["result"]["notes"], "grouped by metal and support");
    assert!(body["result"].get("uncertainties").is_none());

    let prompts = classifier.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].user.contains(r#"["Pd/C","Pd on carbon","Pt/Al2O3"]"#));
}

#[tokio::test]
async fn labels_keep_classifier_order() {
    let answer = r#"{"canonicalToAliases": {"Zinc": ["Zn"], "Aluminium": ["Al"]}}"#;
    let (app, _) = app_with(ScriptedClassifier::answering(answer));
    let body = json!({"columnName": "metal", "values": ["Al", "Zn"]});

    let (status, body) = send(app, Method::POST, "/api/canonicalize", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    let labels: Vec<&String> = body["result"]["canonicalToAliases"]
        .as_object()
        .unwrap()
        .keys()
        .collect();
    assert_eq!(labels, ["Zinc", "Aluminium"]);
}

#[tokio::test]
async fn incomplete_mapping_is_bad_gateway() {
    let answer = r#"{"canonicalToAliases": {"Palladium on carbon": ["Pd/C", "Pd on carbon"]}}"#;
    let (app, _) = app_with(ScriptedClassifier::answering(answer));

    let (status, body) = send(app, Method::POST, "/api/canonicalize", Some(canonicalize_body())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "invalid-model-output");
    assert_eq!(body["details"]["reason"], "missing-coverage");
    assert_eq!(body["details"]["missing"], json!(["Pt/Al2O3"]));
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn duplicated_alias_is_bad_gateway() {
    let answer = r#"{"canonicalToAliases": {
        "Palladium on carbon": ["Pd/C", "Pd on carbon"],
        "Platinum on alumina": ["Pt/Al2O3", "Pd/C"]
    }}"#;
    let (app, _) = app_with(ScriptedClassifier::answering(answer));

    let (status, body) = send(app, Method::POST, "/api/canonicalize", Some(canonicalize_body())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["details"]["reason"], "duplicate-alias");
}

#[tokio::test]
async fn fenced_answer_is_accepted() {
    let answer = format!("```json\n{PALLADIUM_ANSWER}\n```");
    let (app, _) = app_with(ScriptedClassifier::answering(answer));

    let (status, body) = send(app, Method::POST, "/api/canonicalize", Some(canonicalize_body())).await;

    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn transport_failure_is_upstream_unavailable() {
    let (app, _) = app_with(ScriptedClassifier::new([ScriptedReply::Fail(
        "connection reset".into(),
    )]));

    let (status, body) = send(app, Method::POST, "/api/canonicalize", Some(canonicalize_body())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "upstream-unavailable");
    assert_eq!(body["details"]["cause"], "transport");
}

#[tokio::test]
async fn stalled_classifier_times_out() {
    let mut config = ServiceConfig::default();
    config.classifier.timeout = Duration::from_millis(50);
    let classifier = Arc::new(ScriptedClassifier::new([ScriptedReply::Stall]));
    let app = router(Arc::new(AppState::with_classifier(config, classifier)));

    let (status, body) = send(app, Method::POST, "/api/canonicalize", Some(canonicalize_body())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "upstream-unavailable");
    assert_eq!(body["details"]["cause"], "timeout");
}

#[tokio::test]
async fn missing_credential_is_server_error() {
    let app = router(Arc::new(AppState::without_classifier(ServiceConfig::default())));

    let (status, body) = send(app, Method::POST, "/api/canonicalize", Some(canonicalize_body())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "config-missing");
}

#[tokio::test]
async fn undecodable_body_is_bad_request() {
    let (app, classifier) = app_with(ScriptedClassifier::answering(PALLADIUM_ANSWER));

    let (status, body) = send(
        app,
        Method::POST,
        "/api/canonicalize",
        Some(json!({"columnName": "catalyst", "values": "Pd/C"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid-request");
    assert!(classifier.prompts().is_empty());
}

#[tokio::test]
async fn all_null_values_are_bad_request() {
    let (app, classifier) = app_with(ScriptedClassifier::answering(PALLADIUM_ANSWER));

    let (status, body) = send(
        app,
        Method::POST,
        "/api/canonicalize",
        Some(json!({"columnName": "catalyst", "values": [null, "   ", ""]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid-request");
    assert!(classifier.prompts().is_empty());
}

#[tokio::test]
async fn wrong_method_is_method_not_allowed() {
    let (app, _) = app_with(ScriptedClassifier::default());

    let (status, body) = send(app, Method::GET, "/api/canonicalize", None).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "method-not-allowed");
}

#[tokio::test]
async fn grouping_options_follow_resolved_factors() {
    let (app, _) = app_with(ScriptedClassifier::default());
    let body = json!({
        "experiments": [{"experimentId": "e1"}, {"experimentId": "e2"}],
        "factors": {
            "e1": [
                {"name": "catalyst", "value": "Pd/C"},
                {"name": "additive", "value": "TEA"}
            ],
            "e2": [
                {"name": "catalyst", "value": "Pd/C"},
                {"name": "additive", "value": "DMAP"}
            ]
        },
        "overrides": {}
    });

    let (status, body) = send(app, Method::POST, "/api/grouping/options", Some(body)).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["result"]["availableFactors"], json!(["catalyst", "additive"]));
    let options = body["result"]["options"].as_array().unwrap();
    let by_catalyst = options
        .iter()
        .find(|option| option["recipeId"] == "by-catalyst")
        .expect("by-catalyst option");
    assert_eq!(by_catalyst["groups"].as_array().unwrap().len(), 1);
    assert_eq!(by_catalyst["groups"][0]["experimentIds"], json!(["e1", "e2"]));
    assert_eq!(by_catalyst["groups"][0]["groupId"], "group-by-catalyst-1");

    let by_pair = options
        .iter()
        .find(|option| option["recipeId"] == "by-catalyst-additive")
        .expect("by-catalyst-additive option");
    assert_eq!(by_pair["groups"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn override_beats_extracted_value() {
    let (app, _) = app_with(ScriptedClassifier::default());
    let body = json!({
        "experiments": [{"experimentId": "e1"}, {"experimentId": "e2"}],
        "factors": {
            "e1": [{"name": "catalyst", "value": "Pd/C"}],
            "e2": [{"name": "catalyst", "value": "Pd/C"}]
        },
        "overrides": {"e2": {"catalyst": {"value": "Pt/C"}}}
    });

    let (_, body) = send(app, Method::POST, "/api/grouping/options", Some(body)).await;

    let options = body["result"]["options"].as_array().unwrap();
    let by_catalyst = options
        .iter()
        .find(|option| option["recipeId"] == "by-catalyst")
        .unwrap();
    assert_eq!(by_catalyst["groups"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn blank_experiment_id_is_bad_request() {
    let (app, _) = app_with(ScriptedClassifier::default());
    let body = json!({"experiments": [{"experimentId": "  "}]});

    let (status, body) = send(app, Method::POST, "/api/grouping/options", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid-request");
}

fn two_groups() -> Value {
    json!([
        {"groupId": "g1", "name": "Pd", "experimentIds": ["e1", "e2"]},
        {"groupId": "g2", "name": "Pt", "experimentIds": ["e3"]}
    ])
}

#[tokio::test]
async fn edit_moves_experiment() {
    let (app, _) = app_with(ScriptedClassifier::default());
    let body = json!({
        "groups": two_groups(),
        "action": {"type": "move", "experimentId": "e1", "targetGroupId": "g2"}
    });

    let (status, body) = send(app, Method::POST, "/api/grouping/edit", Some(body)).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let groups = &body["result"]["groups"];
    assert_eq!(groups[0]["experimentIds"], json!(["e2"]));
    assert_eq!(groups[1]["experimentIds"], json!(["e3", "e1"]));
}

#[tokio::test]
async fn edit_merges_groups() {
    let (app, _) = app_with(ScriptedClassifier::default());
    let body = json!({
        "groups": two_groups(),
        "action": {"type": "merge", "groupIds": ["g1", "g2"], "name": "Noble metals"}
    });

    let (status, body) = send(app, Method::POST, "/api/grouping/edit", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    let groups = body["result"]["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["name"], "Noble metals");
    assert_eq!(groups[0]["experimentIds"], json!(["e1", "e2", "e3"]));
}

#[tokio::test]
async fn lenient_edit_with_unknown_group_is_noop() {
    let (app, _) = app_with(ScriptedClassifier::default());
    let body = json!({
        "groups": two_groups(),
        "action": {"type": "rename", "groupId": "nope", "name": "x"}
    });

    let (status, body) = send(app, Method::POST, "/api/grouping/edit", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["groups"][0]["name"], "Pd");
    assert_eq!(body["result"]["groups"][1]["name"], "Pt");
}

#[tokio::test]
async fn strict_edit_with_unknown_group_is_rejected() {
    let config = ServiceConfig {
        edit_policy: EditPolicy::Strict,
        ..ServiceConfig::default()
    };
    let app = router(Arc::new(AppState::without_classifier(config)));
    let body = json!({
        "groups": two_groups(),
        "action": {"type": "rename", "groupId": "nope", "name": "x"}
    });

    let (status, body) = send(app, Method::POST, "/api/grouping/edit", Some(body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "edit-rejected");
}

#[tokio::test]
async fn overlapping_input_groups_are_bad_request() {
    let (app, _) = app_with(ScriptedClassifier::default());
    let body = json!({
        "groups": [
            {"groupId": "g1", "name": "a", "experimentIds": ["e1"]},
            {"groupId": "g2", "name": "b", "experimentIds": ["e1"]}
        ],
        "action": {"type": "create", "name": "c"}
    });

    let (status, body) = send(app, Method::POST, "/api/grouping/edit", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid-request");
}

#[tokio::test]
async fn health_reports_classifier_state() {
    let (app, _) = app_with(ScriptedClassifier::default());
    let (status, body) = send(app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let app = router(Arc::new(AppState::without_classifier(ServiceConfig::default())));
    let (status, body) = send(app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"][0]["component"], "classifier");
}

#[tokio::test]
async fn metrics_expose_request_counters() {
    let (app, _) = app_with(ScriptedClassifier::answering(PALLADIUM_ANSWER));
    let (status, _) = send(app.clone(), Method::POST, "/api/canonicalize", Some(canonicalize_body())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, Method::GET, "/metrics", None).await;

    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().expect("text exposition");
    assert!(text.contains(r#"canonicalize_requests_total{outcome="ok"}"#));
    assert!(text.contains("classifier_duration_seconds"));
}
