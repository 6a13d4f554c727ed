use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::config::ServerConfig;
use crate::routes::{self, json_error_handler};
use crate::service::SnippetService;
use crate::status::StatusReporter;

pub fn build_server(
    server_config: ServerConfig,
    service: Arc<SnippetService>,
    reporter: Arc<dyn StatusReporter>,
) -> std::io::Result<Server> {
    let service = web::Data::from(service);
    let reporter: web::Data<dyn StatusReporter> = web::Data::from(reporter);

    let bind_address = server_config
        .bind_address
        .unwrap_or("127.0.0.1".to_string());
    let bind_port = server_config.bind_port.unwrap_or(8080);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(reporter.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((bind_address.as_str(), bind_port))?
    .run();

    log::info!("Listening on {bind_address}:{bind_port}");
    Ok(server)
}
