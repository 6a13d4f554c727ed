pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod interactive;
pub mod language;
pub mod model;
pub mod queue;
pub mod routes;
pub mod rules;
pub mod service;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod upstream;
pub mod web_server;
pub mod workfile;
pub mod worker;
