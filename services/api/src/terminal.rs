use crate::infra::{parse_mode, ScoringArgs};
use clap::Args;
use credit_intake::config::AppConfig;
use credit_intake::error::AppError;
use credit_intake::telemetry::{self, LogOutput};
use credit_intake::workflows::credit_risk::validation::REQUIRED_MESSAGE;
use credit_intake::workflows::credit_risk::{
    raw_answer, FieldDefinition, FieldView, HttpScoringClient, PredictionBundle,
    PresentationMode, QuestionnaireSchema, QuestionnaireSession, ResponseValue, ScoringService,
    SessionError, SessionState, WizardStep,
};
use serde_json::{Map, Value};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Args, Debug, Default)]
pub(crate) struct QuestionnaireArgs {
    /// Presentation mode: wizard (one question at a time) or single_page
    #[arg(long, value_parser = parse_mode)]
    pub(crate) mode: Option<PresentationMode>,
    #[command(flatten)]
    pub(crate) scoring: ScoringArgs,
}

#[derive(Args, Debug)]
pub(crate) struct SubmitArgs {
    /// JSON object mapping field ids to answers
    #[arg(long)]
    pub(crate) responses: PathBuf,
    #[command(flatten)]
    pub(crate) scoring: ScoringArgs,
}

const BACK_COMMANDS: [&str; 2] = ["back", "<"];
const QUIT_COMMANDS: [&str; 2] = ["quit", "q"];

pub(crate) async fn run_questionnaire(args: QuestionnaireArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    args.scoring.apply(&mut config);
    telemetry::init(&config.telemetry, LogOutput::Stderr)?;

    let mode = args.mode.unwrap_or(config.questionnaire.mode);
    let client = HttpScoringClient::new(config.scoring.endpoint.clone(), config.scoring.timeout);
    let session = QuestionnaireSession::new(QuestionnaireSchema::credit_risk(), mode);

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();
    drive(
        session,
        &mut input,
        &mut output,
        &client,
        config.scoring.timeout,
    )
    .await?;
    Ok(())
}

pub(crate) async fn run_submit(args: SubmitArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    args.scoring.apply(&mut config);
    telemetry::init(&config.telemetry, LogOutput::Stderr)?;

    let raw = std::fs::read_to_string(&args.responses)?;
    let answers: Map<String, Value> = serde_json::from_str(&raw)?;
    let client = HttpScoringClient::new(config.scoring.endpoint.clone(), config.scoring.timeout);

    let bundle = submit_answers(&answers, &client, config.scoring.timeout).await?;
    let mut output = std::io::stdout();
    render_result(&mut output, &bundle)?;
    Ok(())
}

pub(crate) fn print_schema() -> Result<(), AppError> {
    let schema = QuestionnaireSchema::credit_risk();
    let fields: Vec<FieldView> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(position, field)| FieldView::new(position, field))
        .collect();
    let rendered = serde_json::to_string_pretty(&fields)?;
    println!("{rendered}");
    Ok(())
}

/// Fill a single-form session from a JSON document and submit it.
pub(crate) async fn submit_answers<S>(
    answers: &Map<String, Value>,
    scoring: &S,
    timeout: Duration,
) -> Result<PredictionBundle, AppError>
where
    S: ScoringService,
{
    let mut session = QuestionnaireSession::new(
        QuestionnaireSchema::credit_risk(),
        PresentationMode::SinglePage,
    );

    // Agency first so the credit score is checked against it.
    let mut entries: Vec<_> = answers.iter().collect();
    entries.sort_by_key(|(field, _)| session.schema().position(field).unwrap_or(usize::MAX));

    for (field, value) in entries {
        let raw = raw_answer(value).ok_or_else(|| SessionError::Rejected {
            field: field.clone(),
            message: "Expected a string, number, or boolean.".to_string(),
        })?;
        session.enter(field, &raw)?;
    }

    match session.submit_to(scoring, timeout).await? {
        SessionState::Submitted { result } => Ok(result.clone()),
        SessionState::Error { message } => Err(AppError::Submission(message.clone())),
        SessionState::Collecting { .. } | SessionState::Filling => {
            Err(AppError::Submission("submission did not complete".to_string()))
        }
    }
}

/// Run the questionnaire against a line-oriented terminal until it is submitted or abandoned.
pub(crate) async fn drive<I, O, S>(
    mut session: QuestionnaireSession,
    input: &mut I,
    output: &mut O,
    scoring: &S,
    timeout: Duration,
) -> Result<QuestionnaireSession, AppError>
where
    I: BufRead,
    O: Write,
    S: ScoringService,
{
    writeln!(
        output,
        "Credit risk questionnaire ({} questions). Leave blank to keep an answer, type 'back' to \
         revisit the previous question, 'quit' to stop.",
        session.schema().len()
    )?;

    loop {
        match session.state().clone() {
            SessionState::Collecting { index } => {
                let Some(field) = session.schema().get(index) else {
                    return Ok(session);
                };
                prompt(output, &session, index, field)?;
                let Some(line) = read_line(input)? else {
                    writeln!(output, "Questionnaire abandoned.")?;
                    return Ok(session);
                };
                let line = line.trim();

                if QUIT_COMMANDS.contains(&line) {
                    writeln!(output, "Questionnaire abandoned.")?;
                    return Ok(session);
                }
                if BACK_COMMANDS.contains(&line) {
                    session.back()?;
                    continue;
                }
                let keep_existing = line.is_empty() && session.responses().is_set(field.id);
                if !keep_existing {
                    if let Err(err) = session.enter(field.id, line) {
                        writeln!(output, "  {err}")?;
                        continue;
                    }
                }

                match session.next() {
                    Ok(WizardStep::Advanced { .. }) => {}
                    Ok(WizardStep::ReadyToSubmit) => {
                        submit_session(&mut session, output, scoring, timeout).await?;
                    }
                    Err(SessionError::Incomplete(missing)) => {
                        for message in missing.values() {
                            writeln!(output, "  {message}")?;
                        }
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            SessionState::Filling => {
                let schema = *session.schema();
                let unanswered = schema
                    .fields()
                    .iter()
                    .enumerate()
                    .find(|(_, field)| !session.responses().is_set(field.id));

                let Some((index, field)) = unanswered else {
                    submit_session(&mut session, output, scoring, timeout).await?;
                    continue;
                };
                prompt(output, &session, index, field)?;
                let Some(line) = read_line(input)? else {
                    writeln!(output, "Questionnaire abandoned.")?;
                    return Ok(session);
                };
                let line = line.trim();
                if QUIT_COMMANDS.contains(&line) {
                    writeln!(output, "Questionnaire abandoned.")?;
                    return Ok(session);
                }
                if line.is_empty() {
                    writeln!(output, "  {REQUIRED_MESSAGE}")?;
                    continue;
                }
                if let Err(err) = session.enter(field.id, line) {
                    writeln!(output, "  {err}")?;
                }
            }
            SessionState::Submitted { result } => {
                render_result(output, &result)?;
                return Ok(session);
            }
            SessionState::Error { message } => {
                writeln!(output, "Submission failed: {message}")?;
                writeln!(output, "Press Enter to retry, or type 'quit' to stop.")?;
                let line = read_line(input)?;
                match line.as_deref().map(str::trim) {
                    None => return Ok(session),
                    Some(line) if QUIT_COMMANDS.contains(&line) => return Ok(session),
                    Some(_) => session.retry()?,
                }
            }
        }
    }
}

async fn submit_session<O, S>(
    session: &mut QuestionnaireSession,
    output: &mut O,
    scoring: &S,
    timeout: Duration,
) -> Result<(), AppError>
where
    O: Write,
    S: ScoringService,
{
    writeln!(output, "Submitting answers...")?;
    match session.submit_to(scoring, timeout).await {
        Ok(state) => {
            debug!(state = state.label(), "submission finished");
            Ok(())
        }
        Err(SessionError::Incomplete(missing)) => {
            for (field, message) in &missing {
                writeln!(output, "  {field}: {message}")?;
            }
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn prompt<O: Write>(
    output: &mut O,
    session: &QuestionnaireSession,
    index: usize,
    field: &FieldDefinition,
) -> Result<(), AppError> {
    let total = session.schema().len();
    writeln!(output)?;
    writeln!(output, "Question {} of {}: {}", index + 1, total, field.prompt)?;

    let options = field.kind.options();
    if !options.is_empty() {
        let labels: Vec<String> = options.iter().map(|label| label.replace('_', " ")).collect();
        writeln!(output, "  Options: {}", labels.join(", "))?;
    }
    if let Some(current) = session.responses().get(field.id).map(ResponseValue::display) {
        writeln!(output, "  Current answer: {current}")?;
    }
    write!(output, "> ")?;
    output.flush()?;
    Ok(())
}

fn read_line<I: BufRead>(input: &mut I) -> Result<Option<String>, AppError> {
    let mut line = String::new();
    let read = input.read_line(&mut line)?;
    Ok((read > 0).then_some(line))
}

pub(crate) fn render_result<O: Write>(
    output: &mut O,
    bundle: &PredictionBundle,
) -> Result<(), AppError> {
    writeln!(output)?;
    writeln!(output, "Risk category: {}", bundle.risk_category)?;
    writeln!(output, "Average score: {:.2}", bundle.average_score)?;
    writeln!(output, "Model predictions:")?;
    for (model, prediction) in &bundle.predictions {
        writeln!(output, "  - {model}: {prediction}")?;
    }
    if !bundle.summary.trim().is_empty() {
        writeln!(output)?;
        writeln!(output, "{}", bundle.summary.trim_end())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use credit_intake::workflows::credit_risk::{
        EncodedPayload, PredictionResponse, PredictionValue, TransportError,
    };
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct ScriptedScoring {
        replies: Arc<Mutex<Vec<Result<PredictionResponse, String>>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl ScriptedScoring {
        fn new(replies: Vec<Result<PredictionResponse, String>>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies)),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().expect("calls mutex")
        }
    }

    impl ScoringService for ScriptedScoring {
        fn predict(
            &self,
            _payload: &EncodedPayload,
        ) -> impl Future<Output = Result<PredictionResponse, TransportError>> + Send {
            *self.calls.lock().expect("calls mutex") += 1;
            let reply = {
                let mut replies = self.replies.lock().expect("replies mutex");
                if replies.is_empty() {
                    Err("no scripted reply".to_string())
                } else {
                    replies.remove(0)
                }
            };
            async move { reply.map_err(TransportError::Network) }
        }
    }

    fn low_risk() -> PredictionResponse {
        let mut predictions = BTreeMap::new();
        predictions.insert("KNN".to_string(), PredictionValue::Score(0.0));
        PredictionResponse {
            predictions: Some(predictions),
            average_score: Some(0.2),
            risk_category: Some("Low Risk".to_string()),
            summary: Some("Keep utilisation low.".to_string()),
            error: None,
        }
    }

    const WIZARD_SCRIPT: &str = "35\nyes\nno\nEquifax\n720\n55000\n10000\n25\n0\nfemale\nno\n2\n1200\nIT staff\n";

    async fn run_script(
        mode: PresentationMode,
        script: &str,
        scoring: &ScriptedScoring,
    ) -> (QuestionnaireSession, String) {
        let session = QuestionnaireSession::new(QuestionnaireSchema::credit_risk(), mode);
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut output = Vec::new();
        let session = drive(
            session,
            &mut input,
            &mut output,
            scoring,
            Duration::from_secs(1),
        )
        .await
        .expect("drive");
        (session, String::from_utf8(output).expect("utf8"))
    }

    #[tokio::test]
    async fn wizard_script_submits_and_renders_result() {
        let scoring = ScriptedScoring::new(vec![Ok(low_risk())]);
        let (session, output) = run_script(PresentationMode::Wizard, WIZARD_SCRIPT, &scoring).await;

        assert!(matches!(session.state(), SessionState::Submitted { .. }));
        assert_eq!(scoring.calls(), 1);
        assert!(output.contains("Question 1 of 14: What is your age?"));
        assert!(output.contains("Risk category: Low Risk"));
        assert!(output.contains("  - KNN: 0"));
    }

    #[tokio::test]
    async fn wizard_reprompts_after_rejected_entry() {
        let scoring = ScriptedScoring::new(vec![Ok(low_risk())]);
        let script = format!("-4\n{WIZARD_SCRIPT}");
        let (session, output) = run_script(PresentationMode::Wizard, &script, &scoring).await;

        assert!(output.contains("  Value cannot be negative."));
        assert!(matches!(session.state(), SessionState::Submitted { .. }));
    }

    #[tokio::test]
    async fn back_command_revisits_previous_question() {
        let scoring = ScriptedScoring::new(Vec::new());
        let (session, output) =
            run_script(PresentationMode::Wizard, "35\nback\n40\nquit\n", &scoring).await;

        assert_eq!(
            session.responses().get("age").and_then(|v| v.as_number()),
            Some(40.0)
        );
        assert!(output.contains("Current answer: 35"));
        assert!(output.contains("Questionnaire abandoned."));
        assert_eq!(scoring.calls(), 0);
    }

    #[tokio::test]
    async fn failed_submission_can_be_retried_from_terminal() {
        let scoring = ScriptedScoring::new(vec![Err("refused".to_string()), Ok(low_risk())]);
        // Blank line retries, second blank keeps the last answer and resubmits.
        let script = format!("{WIZARD_SCRIPT}\n\n");
        let (session, output) = run_script(PresentationMode::Wizard, &script, &scoring).await;

        assert!(output.contains("Submission failed: network error"));
        assert!(matches!(session.state(), SessionState::Submitted { .. }));
        assert_eq!(scoring.calls(), 2);
    }

    #[tokio::test]
    async fn single_page_prompts_only_unanswered_fields() {
        let scoring = ScriptedScoring::new(vec![Ok(low_risk())]);
        let (session, output) =
            run_script(PresentationMode::SinglePage, WIZARD_SCRIPT, &scoring).await;

        assert!(matches!(session.state(), SessionState::Submitted { .. }));
        assert!(output.contains("Question 14 of 14: Select your occupation"));
        assert!(!output.contains("Current answer"));
    }

    #[tokio::test]
    async fn single_page_insists_on_an_answer() {
        let scoring = ScriptedScoring::new(Vec::new());
        let (session, output) = run_script(PresentationMode::SinglePage, "\n", &scoring).await;

        assert!(output.contains("  This field is required."));
        assert!(session.responses().is_empty());
    }

    #[tokio::test]
    async fn end_of_input_abandons_without_submitting() {
        let scoring = ScriptedScoring::new(vec![Ok(low_risk())]);
        let (session, output) = run_script(PresentationMode::Wizard, "35\n", &scoring).await;

        assert!(output.contains("Questionnaire abandoned."));
        assert_eq!(session.state(), &SessionState::Collecting { index: 1 });
        assert_eq!(scoring.calls(), 0);
    }

    fn answers_document() -> Map<String, Value> {
        let value = json!({
            "credit_score": 650,
            "agency": "TransUnion",
            "age": 35,
            "owns_house": true,
            "owns_car": "no",
            "net_yearly_income": 42000,
            "credit_limit": 8000,
            "credit_limit_used": 40,
            "default_in_last_6months": 0,
            "gender": "male",
            "migrant_worker": false,
            "no_of_children": 1,
            "no_of_days_employed": 900,
            "occupation": "Drivers"
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!("literal is an object"),
        }
    }

    #[tokio::test]
    async fn answers_file_submits_in_one_step() {
        let scoring = ScriptedScoring::new(vec![Ok(low_risk())]);
        let bundle = submit_answers(&answers_document(), &scoring, Duration::from_secs(1))
            .await
            .expect("submitted");
        assert_eq!(bundle.risk_category, "Low Risk");
        assert_eq!(scoring.calls(), 1);
    }

    #[tokio::test]
    async fn answers_file_with_out_of_range_score_is_rejected() {
        let scoring = ScriptedScoring::new(vec![Ok(low_risk())]);
        let mut answers = answers_document();
        answers.insert("credit_score".to_string(), json!(800));

        let err = submit_answers(&answers, &scoring, Duration::from_secs(1))
            .await
            .expect_err("rejected");
        assert_eq!(
            err.to_string(),
            "questionnaire error: credit_score: Invalid credit score for TransUnion. Must be between 0 and 710."
        );
        assert_eq!(scoring.calls(), 0);
    }

    #[tokio::test]
    async fn answers_file_missing_fields_lists_them() {
        let scoring = ScriptedScoring::new(vec![Ok(low_risk())]);
        let mut answers = answers_document();
        answers.remove("gender");

        let err = submit_answers(&answers, &scoring, Duration::from_secs(1))
            .await
            .expect_err("incomplete");
        assert_eq!(
            err.to_string(),
            "questionnaire error: missing answers for gender"
        );
    }

    #[tokio::test]
    async fn service_error_fails_the_command() {
        let scoring = ScriptedScoring::new(vec![Ok(PredictionResponse {
            error: Some("bad input".to_string()),
            ..PredictionResponse::default()
        })]);
        let err = submit_answers(&answers_document(), &scoring, Duration::from_secs(1))
            .await
            .expect_err("service error");
        assert_eq!(err.to_string(), "submission failed: bad input");
    }
}
