use async_trait::async_trait;

use crate::error::UpstreamError;

use super::{AssetStore, check_status, http_client, trim_base};

pub struct HttpAssetStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAssetStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: trim_base(base_url),
            client: http_client(),
        }
    }

    fn snippet_url(&self, id: u64) -> String {
        format!("{}/v1/asset/snippet/{id}", self.base_url)
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn get_snippet(&self, id: u64) -> Result<String, UpstreamError> {
        log::debug!("Fetching snippet {id}");
        let response = self.client.get(self.snippet_url(id)).send().await?;
        let text = check_status(response).await?.text().await?;
        Ok(text)
    }

    async fn save_snippet(&self, id: u64, content: &str) -> Result<(), UpstreamError> {
        log::debug!("Saving snippet {id}");
        let response = self
            .client
            .put(self.snippet_url(id))
            .body(content.to_string())
            .send()
            .await?;
        check_status(response).await?;
        log::info!("Saved snippet {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, HttpResponse, HttpServer, web};
    use parking_lot::Mutex;

    use super::*;

    type Saved = Arc<Mutex<Vec<(u64, String)>>>;

    async fn get_snippet(id: web::Path<u64>) -> HttpResponse {
        match id.into_inner() {
            1 => HttpResponse::Ok().body("let a : number = 1;"),
            400 => HttpResponse::BadRequest().body("bad id"),
            500 => HttpResponse::InternalServerError().body("boom"),
            _ => HttpResponse::NotFound().body("no such snippet"),
        }
    }

    async fn put_snippet(id: web::Path<u64>, body: String, saved: web::Data<Saved>) -> HttpResponse {
        saved.lock().push((id.into_inner(), body));
        HttpResponse::Ok().finish()
    }

    fn serve(saved: Saved) -> String {
        let saved = web::Data::new(saved);
        let server = HttpServer::new(move || {
            App::new().app_data(saved.clone()).service(
                web::resource("/v1/asset/snippet/{id}")
                    .route(web::get().to(get_snippet))
                    .route(web::put().to(put_snippet)),
            )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{addr}/")
    }

    #[actix_web::test]
    async fn test_get_and_save_snippet() {
        let saved = Saved::default();
        let store = HttpAssetStore::new(&serve(saved.clone()));

        assert_eq!(store.get_snippet(1).await.unwrap(), "let a : number = 1;");

        store.save_snippet(9, "println(1);\n").await.unwrap();
        assert_eq!(saved.lock().as_slice(), &[(9, "println(1);\n".to_string())]);
    }

    #[actix_web::test]
    async fn test_status_mapping() {
        let store = HttpAssetStore::new(&serve(Saved::default()));

        match store.get_snippet(400).await {
            Err(UpstreamError::BadRequest(body)) => assert_eq!(body, "bad id"),
            other => panic!("expected BadRequest, got {other:?}"),
        }
        match store.get_snippet(7).await {
            Err(e @ UpstreamError::NotFound(_)) => assert_eq!(e.to_string(), "Not Found: no such snippet"),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(matches!(
            store.get_snippet(500).await,
            Err(UpstreamError::Status { status: 500, .. })
        ));
    }
}
