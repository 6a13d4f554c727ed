use actix_web::{HttpResponse, Responder, post, web};
use serde::Deserialize;

use crate::identity::CallerIdentity;
use crate::model::Language;
use crate::rules::{RuleKind, RuleSet};
use crate::service::SnippetService;

use super::bad_request;

#[derive(Deserialize, Debug)]
pub struct VerifyQuery {
    #[serde(default)]
    pub language: Language,
}

#[post("/verify/rule/{kind}")]
pub async fn verify_rules(
    service: web::Data<SnippetService>,
    _caller: CallerIdentity,
    path: web::Path<String>,
    query: web::Query<VerifyQuery>,
    body: web::Json<RuleSet>,
) -> impl Responder {
    let kind = match path.as_str() {
        "lexer" => RuleKind::Lexer,
        "formatter" => RuleKind::Format,
        "sca" => RuleKind::Sca,
        other => return HttpResponse::BadRequest().body(format!("Unknown rule kind {other}")),
    };

    match service.verify_rules(kind, &body, query.language).await {
        Ok(accepted) => HttpResponse::Ok().json(accepted),
        Err(e) => bad_request(&e),
    }
}
