use actix_web::{HttpResponse, Responder, post, web};
use serde::Deserialize;

use crate::error::ServiceResult;
use crate::identity::CallerIdentity;
use crate::model::Language;
use crate::rules::RuleSet;
use crate::service::SnippetService;

use super::{SnippetRequest, bad_request};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SnippetWithRulesRequest {
    pub snippet_id: u64,
    #[serde(default)]
    pub language: Language,
    pub rules: RuleSet,
}

#[derive(Deserialize, Debug)]
pub struct SourceRequest {
    pub snippet: String,
    #[serde(default)]
    pub language: Language,
}

async fn respond_and_save(
    service: &SnippetService,
    snippet_id: u64,
    formatted: ServiceResult<String>,
) -> HttpResponse {
    let formatted = match formatted {
        Ok(formatted) => formatted,
        Err(e) => return bad_request(&e),
    };
    match service.save(snippet_id, &formatted).await {
        Ok(()) => HttpResponse::Ok().body(formatted),
        Err(e) => {
            log::error!("Failed to save formatted snippet {snippet_id}: {e}");
            bad_request(&e)
        }
    }
}

#[post("/format")]
pub async fn format_snippet(
    service: web::Data<SnippetService>,
    caller: CallerIdentity,
    body: web::Json<SnippetRequest>,
) -> impl Responder {
    match service.format(body.snippet_id, body.language, &caller).await {
        Ok(formatted) => HttpResponse::Ok().body(formatted),
        Err(e) => bad_request(&e),
    }
}

#[post("/format/withRules")]
pub async fn format_with_rules(
    service: web::Data<SnippetService>,
    _caller: CallerIdentity,
    body: web::Json<SnippetWithRulesRequest>,
) -> impl Responder {
    match service
        .format_with_rules(body.snippet_id, body.language, &body.rules)
        .await
    {
        Ok(formatted) => HttpResponse::Ok().body(formatted),
        Err(e) => bad_request(&e),
    }
}

#[post("/format/save")]
pub async fn format_and_save(
    service: web::Data<SnippetService>,
    caller: CallerIdentity,
    body: web::Json<SnippetRequest>,
) -> impl Responder {
    let formatted = service.format(body.snippet_id, body.language, &caller).await;
    respond_and_save(&service, body.snippet_id, formatted).await
}

#[post("/format/withRules/save")]
pub async fn format_with_rules_and_save(
    service: web::Data<SnippetService>,
    _caller: CallerIdentity,
    body: web::Json<SnippetWithRulesRequest>,
) -> impl Responder {
    let formatted = service
        .format_with_rules(body.snippet_id, body.language, &body.rules)
        .await;
    respond_and_save(&service, body.snippet_id, formatted).await
}

#[post("/format/snippet")]
pub async fn format_source(
    service: web::Data<SnippetService>,
    caller: CallerIdentity,
    body: web::Json<SourceRequest>,
) -> impl Responder {
    match service
        .format_source(&body.snippet, body.language, &caller)
        .await
    {
        Ok(formatted) => HttpResponse::Ok().body(formatted),
        Err(e) => bad_request(&e),
    }
}
