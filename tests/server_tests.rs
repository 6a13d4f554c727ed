use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{App, middleware, test, web};
use assert_json_diff::assert_json_eq;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;

use snippet_runner::model::{SnippetStatus, StatusEvent};
use snippet_runner::routes::{self, json_error_handler};
use snippet_runner::service::SnippetService;
use snippet_runner::status::StatusReporter;
use snippet_runner::test_support::{
    MemoryAssetStore, RecordingReporter, ScriptBook, StaticRuleStore, Step, scripted_registry,
    token_for,
};
use snippet_runner::workfile::WorkDir;

const SUM: &str = "let a : number = 1; let b : number = 2; println(a+b);";
const READ: &str = "let x : number = readInput(\"Enter: \");\nprintln(x);";
const MESSY: &str = "let a : number = 1;   println(a)  ;";
const SHOUTY: &str = "let MyVar : number = 1;";
const BROKEN: &str = "let = ;";
const OWNER: &str = "owner@test.com";

struct Fixture {
    service: Arc<SnippetService>,
    assets: Arc<MemoryAssetStore>,
    reporter: Arc<RecordingReporter>,
    _work: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let book = ScriptBook::new()
            .with_output(SUM, ["3"])
            .with_steps(READ, [Step::read("Enter: "), Step::PrintInput])
            .with_violation(SHOUTY, "CamelCaseFormat", "MyVar is not camel case at 1:5")
            .with_failure(BROKEN, "Unexpected token = at 1:5");
        let assets = Arc::new(
            MemoryAssetStore::new()
                .with_snippet(1, SUM)
                .with_snippet(2, READ)
                .with_snippet(3, MESSY)
                .with_snippet(4, SHOUTY)
                .with_snippet(5, BROKEN),
        );
        let reporter = Arc::new(RecordingReporter::new());
        let work = tempfile::tempdir().unwrap();

        let service = SnippetService::new(
            assets.clone(),
            Arc::new(StaticRuleStore::new()),
            scripted_registry(book),
            WorkDir::new(work.path()).unwrap(),
        );

        Self {
            service: Arc::new(service),
            assets,
            reporter,
            _work: work,
        }
    }

    fn reporter_data(&self) -> web::Data<dyn StatusReporter> {
        let reporter: Arc<dyn StatusReporter> = self.reporter.clone();
        web::Data::from(reporter)
    }
}

/// Same app as the server builds, minus the access log.
macro_rules! init_app {
    ($fixture:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from($fixture.service.clone()))
                .app_data($fixture.reporter_data())
                .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                .wrap(middleware::NormalizePath::trim())
                .configure(routes::configure),
        )
        .await
    };
}

fn post(uri: &str, body: Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header((AUTHORIZATION, format!("Bearer {}", token_for(OWNER))))
        .set_json(body)
}

async fn body_text(resp: ServiceResponse<impl MessageBody>) -> String {
    let bytes = test::read_body(resp).await;
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[actix_web::test]
async fn test_missing_token_is_unauthorized() {
    let fixture = Fixture::new();
    let app = init_app!(fixture);

    let req = test::TestRequest::post()
        .uri("/execute/test")
        .set_json(json!({"snippetId": 1}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_execute_test() {
    let fixture = Fixture::new();
    let app = init_app!(fixture);

    let req = post("/execute/test", json!({"snippetId": 1, "language": "Printscript"})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "3\n");

    let req = post("/execute/test", json!({"snippetId": 2, "inputs": []})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "no input left for prompt \"Enter: \"");
}

#[actix_web::test]
async fn test_execute_live_suspends_then_completes() {
    let fixture = Fixture::new();
    let app = init_app!(fixture);

    let req = post("/execute/live", json!({"snippetId": 2, "inputs": []})).to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_json_eq!(resp, json!({"output": "Enter: ", "doesItNeedInput": true}));

    let req = post("/execute/live", json!({"snippetId": 2, "inputs": ["5"]})).to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_json_eq!(resp, json!({"output": "Enter: \n5\n", "doesItNeedInput": false}));
}

#[actix_web::test]
async fn test_format_and_save() {
    let fixture = Fixture::new();
    let app = init_app!(fixture);

    let req = post("/format/save/", json!({"snippetId": 3})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "let a : number = 1;\nprintln(a);\n");
    assert_eq!(
        fixture.assets.saves(),
        vec![(3, "let a : number = 1;\nprintln(a);\n".to_string())]
    );
}

#[actix_web::test]
async fn test_format_posted_source_saves_nothing() {
    let fixture = Fixture::new();
    let app = init_app!(fixture);

    let req = post("/format/snippet", json!({"snippet": "println(1)  ;"})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "println(1);\n");
    assert!(fixture.assets.saves().is_empty());
}

#[actix_web::test]
async fn test_sca_reports_status() {
    let fixture = Fixture::new();
    let app = init_app!(fixture);

    let req = post(
        "/sca/withRules",
        json!({"snippetId": 4, "rules": [{"name": "CamelCaseFormat", "value": "true"}]}),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "MyVar is not camel case at 1:5");

    let req = post("/sca", json!({"snippetId": 1})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = post("/sca", json!({"snippetId": 5})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "Unexpected token = at 1:5");

    assert_eq!(
        fixture.reporter.events(),
        vec![
            StatusEvent::new(4, SnippetStatus::Compliant, OWNER),
            StatusEvent::new(1, SnippetStatus::Compliant, OWNER),
            StatusEvent::new(5, SnippetStatus::NotCompliant, OWNER),
        ]
    );
}

#[actix_web::test]
async fn test_verify_rules() {
    let fixture = Fixture::new();
    let app = init_app!(fixture);

    let req = post("/verify/rule/sca", json!([{"name": "CamelCaseFormat", "value": "true"}])).to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_json_eq!(resp, json!(true));

    let req = post("/verify/rule/sca", json!([{"name": "CamelCaseFormat", "value": "1"}])).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = post("/verify/rule/parser", json!([])).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "Unknown rule kind parser");
}

#[actix_web::test]
async fn test_unsupported_language() {
    let fixture = Fixture::new();
    let app = init_app!(fixture);

    let req = post("/format", json!({"snippetId": 1, "language": "Go"})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "Language Go not implemented");
}

#[actix_web::test]
async fn test_invalid_body() {
    let fixture = Fixture::new();
    let app = init_app!(fixture);

    let req = post("/execute/test", json!({"inputs": ["1"]})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(resp).await.contains("snippetId"));
}
