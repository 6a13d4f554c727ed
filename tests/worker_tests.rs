use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use snippet_runner::model::{SnippetStatus, StatusEvent};
use snippet_runner::queue::{FORMAT_QUEUE, ListStore, MemoryListStore, SCA_QUEUE, SCA_UNIQUE_QUEUE};
use snippet_runner::rules::{RuleKind, RuleSet};
use snippet_runner::service::SnippetService;
use snippet_runner::test_support::{
    MemoryAssetStore, RecordingReporter, ScriptBook, StaticRuleStore, scripted_registry, token_for,
};
use snippet_runner::workfile::WorkDir;
use snippet_runner::worker::{ConsumerContext, JobKind, PollOutcome, consumer, poll_once};

const MESSY: &str = "let a : number = 1;   println(a)  ;";
const SHOUTY: &str = "let MyVar : number = 1;";
const OWNER: &str = "owner@test.com";

struct Pipeline {
    ctx: ConsumerContext,
    store: Arc<MemoryListStore>,
    assets: Arc<MemoryAssetStore>,
    rules: Arc<StaticRuleStore>,
    reporter: Arc<RecordingReporter>,
    work: TempDir,
}

impl Pipeline {
    fn new(rules: StaticRuleStore) -> Self {
        let book = ScriptBook::new()
            .with_violation(SHOUTY, "CamelCaseFormat", "MyVar is not camel case at 1:5")
            .with_failure("let = ;", "Unexpected token = at 1:5");
        let assets = Arc::new(
            MemoryAssetStore::new()
                .with_snippet(1, MESSY)
                .with_snippet(2, SHOUTY)
                .with_snippet(3, "let = ;"),
        );
        let rules = Arc::new(rules);
        let store = Arc::new(MemoryListStore::new());
        let reporter = Arc::new(RecordingReporter::new());
        let work = tempfile::tempdir().unwrap();

        let service = SnippetService::new(
            assets.clone(),
            rules.clone(),
            scripted_registry(book),
            WorkDir::new(work.path()).unwrap(),
        );
        let ctx = ConsumerContext {
            service: Arc::new(service),
            store: store.clone(),
            reporter: reporter.clone(),
        };

        Self {
            ctx,
            store,
            assets,
            rules,
            reporter,
            work,
        }
    }

    async fn push(&self, key: &str, message: serde_json::Value) {
        self.store.push(key, message.to_string()).await.unwrap();
    }

    /// Polls `key` once and waits for the job to finish reporting.
    async fn poll(&self, kind: JobKind, key: &str) -> &'static str {
        match poll_once(kind, key, &self.ctx).await.unwrap() {
            PollOutcome::Empty => "empty",
            PollOutcome::Dropped => "dropped",
            PollOutcome::Dispatched(handle) => {
                handle.await.unwrap();
                "dispatched"
            }
        }
    }

    fn leftover_files(&self) -> usize {
        std::fs::read_dir(self.work.path()).unwrap().count()
    }
}

fn rules_job(snippet_id: u64, rules: serde_json::Value) -> serde_json::Value {
    json!({
        "job": {"snippetId": snippet_id, "language": "Printscript", "rules": rules},
        "callerIdentity": token_for(OWNER)
    })
}

#[tokio::test]
async fn test_empty_queue_is_noop() {
    let pipeline = Pipeline::new(StaticRuleStore::new());

    for kind in JobKind::ALL {
        assert_eq!(pipeline.poll(kind, kind.default_queue()).await, "empty");
    }
    assert!(pipeline.reporter.events().is_empty());
    assert!(pipeline.assets.saves().is_empty());
}

#[tokio::test]
async fn test_format_job_saves_and_reports_compliant() {
    let pipeline = Pipeline::new(StaticRuleStore::new());
    pipeline
        .push(FORMAT_QUEUE, rules_job(1, json!([{"name": "DotFront", "value": "1"}])))
        .await;

    assert_eq!(pipeline.poll(JobKind::Format, FORMAT_QUEUE).await, "dispatched");

    assert_eq!(
        pipeline.assets.saves(),
        vec![(1, "let a : number = 1;\nprintln(a);\n".to_string())]
    );
    assert_eq!(
        pipeline.reporter.events(),
        vec![StatusEvent::new(1, SnippetStatus::Compliant, OWNER)]
    );
    assert!(pipeline.store.is_empty(FORMAT_QUEUE));
    assert_eq!(pipeline.leftover_files(), 0);
}

#[tokio::test]
async fn test_format_job_for_missing_snippet() {
    let pipeline = Pipeline::new(StaticRuleStore::new());
    pipeline.push(FORMAT_QUEUE, rules_job(404, json!([]))).await;

    assert_eq!(pipeline.poll(JobKind::Format, FORMAT_QUEUE).await, "dispatched");

    assert!(pipeline.assets.saves().is_empty());
    assert_eq!(
        pipeline.reporter.events(),
        vec![StatusEvent::new(404, SnippetStatus::NotCompliant, OWNER)]
    );
}

#[tokio::test]
async fn test_failed_job_is_not_retried() {
    let pipeline = Pipeline::new(StaticRuleStore::new());
    pipeline.push(FORMAT_QUEUE, rules_job(3, json!([]))).await;

    assert_eq!(pipeline.poll(JobKind::Format, FORMAT_QUEUE).await, "dispatched");
    assert_eq!(pipeline.poll(JobKind::Format, FORMAT_QUEUE).await, "empty");

    assert_eq!(
        pipeline.reporter.events(),
        vec![StatusEvent::new(3, SnippetStatus::NotCompliant, OWNER)]
    );
    assert_eq!(pipeline.leftover_files(), 0);
}

#[tokio::test]
async fn test_malformed_message_is_dropped() {
    let pipeline = Pipeline::new(StaticRuleStore::new());
    pipeline
        .store
        .push(SCA_QUEUE, "{\"job\": \"nope\"}".to_string())
        .await
        .unwrap();

    assert_eq!(pipeline.poll(JobKind::Sca, SCA_QUEUE).await, "dropped");
    assert!(pipeline.store.is_empty(SCA_QUEUE));
    assert!(pipeline.reporter.events().is_empty());
}

#[tokio::test]
async fn test_finished_sca_job_is_compliant_even_with_violations() {
    let pipeline = Pipeline::new(StaticRuleStore::new());
    pipeline
        .push(SCA_QUEUE, rules_job(2, json!([{"name": "CamelCaseFormat", "value": "true"}])))
        .await;
    pipeline
        .push(SCA_QUEUE, rules_job(2, json!([{"name": "CamelCaseFormat", "value": "false"}])))
        .await;
    pipeline.push(SCA_QUEUE, rules_job(3, json!([]))).await;

    for _ in 0..3 {
        assert_eq!(pipeline.poll(JobKind::Sca, SCA_QUEUE).await, "dispatched");
    }

    assert_eq!(
        pipeline.reporter.events(),
        vec![
            StatusEvent::new(2, SnippetStatus::Compliant, OWNER),
            StatusEvent::new(2, SnippetStatus::Compliant, OWNER),
            StatusEvent::new(3, SnippetStatus::NotCompliant, OWNER),
        ]
    );
    assert!(pipeline.assets.saves().is_empty());
}

#[tokio::test]
async fn test_sca_unique_job_uses_stored_rules() {
    let stored: RuleSet = [("CamelCaseFormat", "false")].into_iter().collect();
    let pipeline = Pipeline::new(StaticRuleStore::new().with_rules(RuleKind::Sca, stored));
    let token = token_for(OWNER);
    pipeline
        .push(
            SCA_UNIQUE_QUEUE,
            json!({"job": {"snippetId": 2}, "callerIdentity": token}),
        )
        .await;

    assert_eq!(pipeline.poll(JobKind::ScaUnique, SCA_UNIQUE_QUEUE).await, "dispatched");

    assert_eq!(pipeline.rules.requests(), vec![(RuleKind::Sca, token)]);
    assert_eq!(
        pipeline.reporter.events(),
        vec![StatusEvent::new(2, SnippetStatus::Compliant, OWNER)]
    );
}

#[tokio::test]
async fn test_unsupported_language_reports_not_compliant() {
    let pipeline = Pipeline::new(StaticRuleStore::new());
    pipeline
        .push(
            SCA_QUEUE,
            json!({
                "job": {"snippetId": 2, "language": "Python", "rules": []},
                "callerIdentity": "opaque-token"
            }),
        )
        .await;

    assert_eq!(pipeline.poll(JobKind::Sca, SCA_QUEUE).await, "dispatched");
    assert_eq!(
        pipeline.reporter.events(),
        vec![StatusEvent::new(2, SnippetStatus::NotCompliant, "")]
    );
}

#[tokio::test]
async fn test_consumer_drains_queue_and_stops() {
    let pipeline = Pipeline::new(StaticRuleStore::new());
    pipeline.push(FORMAT_QUEUE, rules_job(1, json!([]))).await;
    pipeline.push(FORMAT_QUEUE, rules_job(404, json!([]))).await;

    let token = CancellationToken::new();
    let task = tokio::spawn(consumer(
        JobKind::Format,
        FORMAT_QUEUE.to_string(),
        Duration::from_millis(10),
        pipeline.ctx.clone(),
        token.clone(),
    ));

    for _ in 0..200 {
        if pipeline.reporter.events().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    token.cancel();
    task.await.unwrap().unwrap();

    let mut events = pipeline.reporter.events();
    events.sort_by_key(|e| e.id);
    assert_eq!(
        events,
        vec![
            StatusEvent::new(1, SnippetStatus::Compliant, OWNER),
            StatusEvent::new(404, SnippetStatus::NotCompliant, OWNER),
        ]
    );
    assert!(pipeline.store.is_empty(FORMAT_QUEUE));
    assert_eq!(pipeline.leftover_files(), 0);
}
