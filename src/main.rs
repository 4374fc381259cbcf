use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;

use onboarding_flow::config::AppConfig;
use onboarding_flow::onboarding::routes::{DEFAULT_COMPLETED_TTL, DEFAULT_IDLE_TTL};
use onboarding_flow::onboarding::{
    FlowDefinition, OnboardingRouteState, SessionRegistry, onboarding_routes,
};
use onboarding_flow::service::{HttpUserService, UserService};

/// How often finished and idle sessions are unmounted.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;

    eprintln!("Onboarding flow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   User API: {}", config.service.base_url);
    eprintln!("   Sessions: http://0.0.0.0:{}/api/onboarding/sessions", config.server.port);

    let service: Arc<dyn UserService> = Arc::new(
        HttpUserService::new(&config.service).context("building user service client")?,
    );

    let mut flows = vec![FlowDefinition::signup(), FlowDefinition::survey()];
    if let Some(delay) = config.flow.exit_delay {
        flows = flows
            .into_iter()
            .map(|f| f.with_default_exit_delay(delay))
            .collect();
    }
    let idle_ttl = config.flow.session_idle_ttl.unwrap_or(DEFAULT_IDLE_TTL);
    let registry = Arc::new(
        SessionRegistry::new(flows, service, config.flow.share_base_url.clone())
            .with_ttls(idle_ttl, DEFAULT_COMPLETED_TTL),
    );
    let _sweeper = registry.spawn_sweeper(SWEEP_INTERVAL);

    let app = onboarding_routes(OnboardingRouteState { registry });

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Onboarding API listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
