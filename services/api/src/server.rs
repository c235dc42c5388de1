use crate::cli::ServeArgs;
use crate::infra::{build_service, seed_library, AppState, OutboxNotifier};
use crate::routes::with_circulation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use circulation::config::AppConfig;
use circulation::error::AppError;
use circulation::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = seed_library(args.books_csv.as_deref(), args.students_csv.as_deref())?;
    let service = Arc::new(build_service(
        store,
        OutboxNotifier::default(),
        config.circulation,
    ));

    let app = with_circulation_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        penalty_rate = config.circulation.penalty_rate,
        max_active_loans = config.circulation.max_active_loans,
        "circulation desk ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
