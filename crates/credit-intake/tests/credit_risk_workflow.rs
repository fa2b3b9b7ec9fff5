use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use credit_intake::workflows::credit_risk::{
    submit, EncodedPayload, HttpScoringClient, PredictionValue, PresentationMode,
    QuestionnaireSchema, QuestionnaireSession, ScoringService, SessionState, SubmissionResult,
};
use serde_json::{json, Value};

type Captured = Arc<Mutex<Vec<Value>>>;

const AGENT_TIMEOUT: Duration = Duration::from_secs(2);

async fn spawn_scoring(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub scoring service");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    format!("http://{addr}/predict")
}

async fn predict_ok(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
    captured.lock().expect("capture mutex").push(body);
    Json(json!({
        "predictions": {"KNN": 1, "LogisticRegression": "High"},
        "average_score": 0.74,
        "risk_category": "High Risk",
        "summary": "## Next steps\nReduce utilisation."
    }))
}

async fn predict_rejects() -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({"error": "bad input"})))
}

async fn predict_garbage() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
}

async fn predict_slowly() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({"predictions": {}}))
}

fn answered_session() -> QuestionnaireSession {
    let mut session = QuestionnaireSession::new(
        QuestionnaireSchema::credit_risk(),
        PresentationMode::SinglePage,
    );
    let answers = [
        ("age", "29"),
        ("owns_house", "no"),
        ("owns_car", "yes"),
        ("agency", "Experian"),
        ("credit_score", "560"),
        ("net_yearly_income", "31000"),
        ("credit_limit", "4000"),
        ("credit_limit_used", "92"),
        ("default_in_last_6months", "1"),
        ("gender", "male"),
        ("migrant_worker", "yes"),
        ("no_of_children", "0"),
        ("no_of_days_employed", "240"),
        ("occupation", "Drivers"),
    ];
    for (field, raw) in answers {
        session.enter(field, raw).expect("valid answer");
    }
    session
}

#[tokio::test]
async fn http_client_posts_flat_payload_and_reads_predictions() {
    let captured = Captured::default();
    let endpoint = spawn_scoring(
        Router::new()
            .route("/predict", post(predict_ok))
            .with_state(captured.clone()),
    )
    .await;
    let client = HttpScoringClient::new(endpoint, AGENT_TIMEOUT);

    let mut session = answered_session();
    let state = session
        .submit_to(&client, Duration::from_secs(5))
        .await
        .expect("submitted")
        .clone();

    let SessionState::Submitted { result } = state else {
        panic!("expected submitted, got {state:?}");
    };
    assert_eq!(result.risk_category, "High Risk");
    assert_eq!(result.predictions["KNN"], PredictionValue::Score(1.0));
    assert_eq!(
        result.predictions["LogisticRegression"],
        PredictionValue::Label("High".to_string())
    );

    let bodies = captured.lock().expect("capture mutex").clone();
    assert_eq!(bodies.len(), 1);
    let body = bodies[0].as_object().expect("flat object");
    assert_eq!(body.len(), 27);
    assert_eq!(body["agency"], "Experian");
    assert_eq!(body["owns_car"], 1.0);
    assert_eq!(body["gender"], 1.0);
    assert_eq!(body["occupation_Drivers"], 1.0);
    assert_eq!(body["occupation_Managers"], 0.0);
    assert_eq!(body["credit_limit_used"], 92.0);
}

#[tokio::test]
async fn error_body_becomes_failure_with_service_message() {
    let endpoint = spawn_scoring(Router::new().route("/predict", post(predict_rejects))).await;
    let client = HttpScoringClient::new(endpoint, AGENT_TIMEOUT);

    let mut session = answered_session();
    let state = session
        .submit_to(&client, Duration::from_secs(5))
        .await
        .expect("attempted");
    assert_eq!(
        state,
        &SessionState::Error {
            message: "bad input".to_string()
        }
    );

    session.retry().expect("retry");
    assert_eq!(session.state(), &SessionState::Filling);
    assert_eq!(session.responses().len(), 14);
}

#[tokio::test]
async fn undecodable_body_is_malformed_response() {
    let endpoint = spawn_scoring(Router::new().route("/predict", post(predict_garbage))).await;
    let client = HttpScoringClient::new(endpoint, AGENT_TIMEOUT);

    let result = submit(&client, &EncodedPayload::default(), Duration::from_secs(5)).await;
    assert_eq!(result, SubmissionResult::failure("malformed response"));
}

#[tokio::test]
async fn unreachable_endpoint_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = HttpScoringClient::new(format!("http://{addr}/predict"), AGENT_TIMEOUT);
    let result = submit(&client, &EncodedPayload::default(), Duration::from_secs(5)).await;
    assert_eq!(result, SubmissionResult::failure("network error"));
}

#[tokio::test]
async fn slow_service_is_timeout() {
    let endpoint = spawn_scoring(Router::new().route("/predict", post(predict_slowly))).await;
    let client = HttpScoringClient::new(endpoint, AGENT_TIMEOUT);

    let result = submit(&client, &EncodedPayload::default(), Duration::from_millis(100)).await;
    assert_eq!(result, SubmissionResult::failure("timeout"));
}

#[tokio::test]
async fn client_reports_its_endpoint() {
    let client = HttpScoringClient::new("http://scoring.internal/predict", AGENT_TIMEOUT);
    assert_eq!(client.endpoint(), "http://scoring.internal/predict");

    fn assert_scoring<S: ScoringService>(_: &S) {}
    assert_scoring(&client);
}
