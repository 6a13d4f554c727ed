use actix_web::{HttpResponse, Responder, post, web};
use serde::{Deserialize, Serialize};

use crate::engine::EnvVars;
use crate::identity::CallerIdentity;
use crate::model::{ExecutionResult, Language};
use crate::service::SnippetService;

use super::bad_request;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTestRequest {
    pub snippet_id: u64,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub envs: EnvVars,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteLiveRequest {
    pub snippet_id: u64,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub inputs: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LiveResponse {
    pub output: String,
    pub does_it_need_input: bool,
}

impl From<ExecutionResult> for LiveResponse {
    fn from(result: ExecutionResult) -> Self {
        let does_it_need_input = result.needs_input();
        let output = match result {
            ExecutionResult::Completed { output } => output,
            ExecutionResult::NeedsInput { partial_output, .. } => partial_output,
        };
        Self {
            output,
            does_it_need_input,
        }
    }
}

#[post("/execute/test")]
pub async fn execute_test(
    service: web::Data<SnippetService>,
    caller: CallerIdentity,
    body: web::Json<ExecuteTestRequest>,
) -> impl Responder {
    let ExecuteTestRequest {
        snippet_id,
        language,
        inputs,
        envs,
    } = body.into_inner();

    match service
        .execute(snippet_id, language, inputs, envs, &caller)
        .await
    {
        Ok(output) => HttpResponse::Ok().body(output),
        Err(e) => bad_request(&e),
    }
}

#[post("/execute/live")]
pub async fn execute_live(
    service: web::Data<SnippetService>,
    caller: CallerIdentity,
    body: web::Json<ExecuteLiveRequest>,
) -> impl Responder {
    let ExecuteLiveRequest {
        snippet_id,
        language,
        inputs,
    } = body.into_inner();

    match service
        .execute_live(snippet_id, language, inputs, &caller)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(LiveResponse::from(result)),
        Err(e) => HttpResponse::BadRequest().json(LiveResponse {
            output: e.to_string(),
            does_it_need_input: false,
        }),
    }
}
