use std::sync::Arc;

use axum::middleware;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use kindred_matching::clients::inbox::HttpChatInbox;
use kindred_matching::clients::llm::LlmClient;
use kindred_matching::config::AppConfig;
use kindred_matching::delayed::RedisDelayedQueue;
use kindred_matching::events::publisher::EventNotifier;
use kindred_matching::jobs::{Jobs, RedisRunLock};
use kindred_matching::matching::date_plan::DatePlanner;
use kindred_matching::matching::lifecycle::{LifecycleSettings, MatchLifecycle};
use kindred_matching::matching::orchestrator::{RunSettings, WeeklyMatcher};
use kindred_matching::matching::retry::RetryPolicy;
use kindred_matching::matching::scorer::CompatibilityScorer;
use kindred_matching::profiles::ProfileService;
use kindred_matching::scheduler::{self, Schedule};
use kindred_matching::store::{PgStore, PgVenueDirectory};
use kindred_matching::AppState;
use kindred_shared::clients::db::create_pool;
use kindred_shared::clients::rabbitmq::RabbitMQClient;
use kindred_shared::clients::redis::RedisClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kindred_shared::middleware::init_tracing("kindred-matching");
    let metrics = kindred_shared::middleware::init_metrics()?;

    let config = AppConfig::load()?;
    let port = config.port;

    // Database pool
    let db = create_pool(&config.database_url, config.db_pool_size)?;

    // Infrastructure clients
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let redis = RedisClient::connect(&config.redis_url).await?;
    let http = reqwest::Client::builder()
        .timeout(config.provider_timeout())
        .build()?;

    // Ports
    let store = Arc::new(PgStore::new(db.clone()));
    let llm = Arc::new(LlmClient::new(
        http.clone(),
        &config.llm_base_url,
        &config.llm_api_key,
        &config.embedding_model,
    ));
    let notifier = Arc::new(EventNotifier::new(rabbitmq.clone()));
    let policy = RetryPolicy::from_config(&config);

    let matcher = WeeklyMatcher::new(
        store.clone(),
        store.clone(),
        CompatibilityScorer::new(llm.clone(), &config.primary_model, &config.fallback_model, policy.clone()),
        // Starters go to the cheaper model; scoring keeps the primary.
        DatePlanner::new(llm.clone(), Arc::new(PgVenueDirectory::new(db)), &config.fallback_model, policy.clone()),
        notifier.clone(),
        RunSettings::from_config(&config, &policy)?,
    );
    let lifecycle = Arc::new(MatchLifecycle::new(
        store.clone(),
        notifier,
        Arc::new(RedisDelayedQueue::new(redis.clone())),
        Arc::new(HttpChatInbox::new(http, &config.messaging_service_url)),
        LifecycleSettings::from_config(&config)?,
    ));
    let jobs = Arc::new(Jobs::new(
        Arc::new(matcher),
        lifecycle.clone(),
        Arc::new(RedisRunLock::new(redis.clone())),
    ));
    let profiles = ProfileService::new(store, llm, policy);

    if config.scheduler_enabled {
        scheduler::spawn(jobs.clone(), Schedule::from_config(&config)?);
    } else {
        tracing::warn!("scheduler disabled, jobs run only through /internal/runs");
    }

    let state = Arc::new(AppState {
        config,
        redis,
        rabbitmq,
        jobs,
        lifecycle,
        profiles,
        metrics,
    });

    let app = kindred_matching::router(state)
        .layer(middleware::from_fn(kindred_shared::middleware::metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "kindred-matching starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
