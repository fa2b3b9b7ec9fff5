use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemorySessionRepository};
use crate::routes::with_questionnaire_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use credit_intake::config::AppConfig;
use credit_intake::error::AppError;
use credit_intake::telemetry::{self, LogOutput};
use credit_intake::workflows::credit_risk::{HttpScoringClient, QuestionnaireService};
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

    telemetry::init(&config.telemetry, LogOutput::Stdout)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let scoring = Arc::new(HttpScoringClient::new(
        config.scoring.endpoint.clone(),
        config.scoring.timeout,
    ));
    let repository = Arc::new(InMemorySessionRepository::default());
    let questionnaire_service = Arc::new(QuestionnaireService::new(
        repository,
        scoring,
        config.questionnaire.mode,
        config.scoring.timeout,
    ));

    let app = with_questionnaire_routes(questionnaire_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        scoring_endpoint = %config.scoring.endpoint,
        "credit intake service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
