use actix_web::{HttpResponse, Responder, post, web};

use crate::error::ServiceResult;
use crate::identity::CallerIdentity;
use crate::model::{SnippetStatus, StatusEvent};
use crate::service::SnippetService;
use crate::status::StatusReporter;

use super::{SnippetRequest, SnippetWithRulesRequest, bad_request};

/// Reports the outcome to the Snippet Manager, then answers the request.
///
/// A finished analysis is compliant whatever its report lists; only a failed
/// one is not.
async fn report_and_respond(
    reporter: &dyn StatusReporter,
    snippet_id: u64,
    caller: &CallerIdentity,
    result: ServiceResult<String>,
) -> HttpResponse {
    let status = match &result {
        Ok(_) => SnippetStatus::Compliant,
        Err(_) => SnippetStatus::NotCompliant,
    };
    reporter
        .report(StatusEvent::new(snippet_id, status, caller.email_or_default()))
        .await;

    match result {
        Ok(violations) => HttpResponse::Ok().body(violations),
        Err(e) => bad_request(&e),
    }
}

#[post("/sca")]
pub async fn analyze_snippet(
    service: web::Data<SnippetService>,
    reporter: web::Data<dyn StatusReporter>,
    caller: CallerIdentity,
    body: web::Json<SnippetRequest>,
) -> impl Responder {
    let result = service.analyze(body.snippet_id, body.language, &caller).await;
    report_and_respond(reporter.get_ref(), body.snippet_id, &caller, result).await
}

#[post("/sca/withRules")]
pub async fn analyze_with_rules(
    service: web::Data<SnippetService>,
    reporter: web::Data<dyn StatusReporter>,
    caller: CallerIdentity,
    body: web::Json<SnippetWithRulesRequest>,
) -> impl Responder {
    let result = service
        .analyze_with_rules(body.snippet_id, body.language, &body.rules)
        .await;
    report_and_respond(reporter.get_ref(), body.snippet_id, &caller, result).await
}
