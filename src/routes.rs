mod execute;
mod format;
mod sca;
mod verify;

pub use execute::*;
pub use format::*;
pub use sca::*;
pub use verify::*;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;

use crate::error::ServiceError;
use crate::model::Language;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SnippetRequest {
    pub snippet_id: u64,
    #[serde(default)]
    pub language: Language,
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().body(err.to_string());
    InternalError::from_response(err, response).into()
}

/// Every failure of a synchronous operation is a 400 carrying the error message.
fn bad_request(e: &ServiceError) -> HttpResponse {
    HttpResponse::BadRequest().body(e.to_string())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(execute_test)
        .service(execute_live)
        .service(format_snippet)
        .service(format_with_rules)
        .service(format_and_save)
        .service(format_with_rules_and_save)
        .service(format_source)
        .service(analyze_snippet)
        .service(analyze_with_rules)
        .service(verify_rules);
}
