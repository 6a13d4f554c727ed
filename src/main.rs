use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use snippet_runner::config::{CliArgs, Config, StatusSink};
use snippet_runner::language::RunnerRegistry;
use snippet_runner::queue::{ListStore, MemoryListStore, RedisListStore};
use snippet_runner::service::SnippetService;
use snippet_runner::status::{HttpStatusReporter, QueueStatusReporter, StatusReporter};
use snippet_runner::upstream::{HttpAssetStore, HttpRuleStore};
use snippet_runner::web_server::build_server;
use snippet_runner::workfile::WorkDir;
use snippet_runner::worker::{ConsumerContext, JobKind, consumer};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let Config {
        server: server_config,
        services,
        queue: queue_config,
        status: status_config,
        work_dir,
        languages,
    } = cli
        .to_config()
        .with_context(|| format!("Failed to load configuration from {}", cli.config_path))?;

    let registry = RunnerRegistry::from_config(&languages)?;
    let work_dir = WorkDir::from_config(work_dir.as_deref())?;

    let store: Arc<dyn ListStore> = match &queue_config.redis_url {
        Some(url) => Arc::new(RedisListStore::connect(url).await?),
        None => {
            log::warn!("No queue store configured, using in-process lists");
            Arc::new(MemoryListStore::new())
        }
    };

    let reporter: Arc<dyn StatusReporter> = match status_config.sink {
        StatusSink::Queue => Arc::new(QueueStatusReporter::with_key(
            store.clone(),
            &queue_config.status_key(),
        )),
        StatusSink::Http => {
            let Some(url) = &services.snippet_manager_url else {
                bail!("Status sink \"http\" requires services.snippet_manager_url");
            };
            Arc::new(HttpStatusReporter::new(url))
        }
    };

    let service = Arc::new(SnippetService::new(
        Arc::new(HttpAssetStore::new(&services.asset_url)),
        Arc::new(HttpRuleStore::new(&services.rule_url)),
        registry,
        work_dir,
    ));
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let mut consumers = JoinSet::new();
    if cli.no_consumers {
        log::info!("Queue consumers disabled");
    } else {
        let ctx = ConsumerContext {
            service: service.clone(),
            store: store.clone(),
            reporter: reporter.clone(),
        };
        for kind in JobKind::ALL {
            consumers.spawn(consumer(
                kind,
                queue_config.key(kind),
                queue_config.poll_interval(),
                ctx.clone(),
                shutdown_token.clone(),
            ));
        }
    }

    let server = build_server(server_config, service, reporter).context("Failed to build server")?;

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
        Some(res_consumer) = consumers.join_next() => {
            log::error!("A consumer terminated unexpectedly: {:?}", res_consumer);
        }
    }

    // 1. Shutdown actix-web server gracefully
    server_handle.stop(true).await;

    // 2. Broadcast shutdown signal to consumers
    shutdown_token.cancel();
    log::info!("Shutdown signal sent to consumers, waiting for them to finish...");

    // 3. Wait until every consumer terminates
    while let Some(res) = consumers.join_next().await {
        match res {
            Ok(Err(e)) => log::error!("Consumer finished with error: {e:?}"),
            Err(e) if e.is_panic() => log::error!("Consumer handle panicked: {:?}", e),
            Err(e) => log::error!("Consumer handle finished with error: {:?}", e),
            Ok(Ok(())) => {}
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}
