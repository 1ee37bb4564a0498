//! Integration tests for the phase flow
//!
//! Tests clock-driven transitions: reconciliation, recess, the block reset
//! before the last phase, completion

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aut_flex::config::SurveyConfig;
use aut_flex::core::{
    CategorizationGateway, Categorizer, SessionParams, Sink, SurveySession, TrialWriter,
};
use aut_flex::error::{GatewayError, SinkError};
use aut_flex::types::{
    CategoryLabel, GroupAssignment, ObjectId, PhaseDef, PhaseState, ReasonCode, Reconciliation,
    TrialRecord,
};

/// Counts batch calls and disqualifies uses containing "nonsense"
#[derive(Default)]
struct CountingCategorizer {
    classified: AtomicUsize,
    reconciled: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl Categorizer for CountingCategorizer {
    async fn classify(
        &self,
        _: &str,
        object: ObjectId,
        taxonomy: &[&str],
    ) -> Result<String, GatewayError> {
        self.classified.fetch_add(1, Ordering::SeqCst);
        assert_eq!(taxonomy, object.categories());
        Ok(taxonomy[0].to_string())
    }

    async fn reconcile(
        &self,
        _: ObjectId,
        responses: &[String],
    ) -> Result<Reconciliation, GatewayError> {
        self.reconciled.lock().unwrap().push(responses.to_vec());
        Ok(Reconciliation {
            disqualified: responses
                .iter()
                .filter(|r| r.contains("nonsense"))
                .cloned()
                .collect(),
            used_categories: vec![],
        })
    }
}

struct NullSink;

#[async_trait]
impl Sink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    async fn append(&self, _: &TrialRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

fn session_with(
    config: &SurveyConfig,
    group: u8,
    categorizer: Arc<CountingCategorizer>,
) -> SurveySession {
    let (writer, _) = TrialWriter::spawn(Arc::new(NullSink), 16);
    SurveySession::with_group(
        "session_flow",
        SessionParams::default(),
        GroupAssignment::from_id(group).unwrap(),
        config,
        CategorizationGateway::new(categorizer),
        writer,
    )
}

fn instant_config() -> SurveyConfig {
    SurveyConfig {
        recess_secs: 0,
        ..SurveyConfig::default()
    }
    .with_phase_durations(0)
}

/// Zero-length phases end at the first poll; empty phases skip the batch call
#[tokio::test]
async fn test_empty_phases_advance_without_reconciliation() {
    let categorizer = Arc::new(CountingCategorizer::default());
    let mut session = session_with(&instant_config(), 0, categorizer.clone());
    session.begin();

    for expected in [PhaseState::Active(1), PhaseState::Active(2), PhaseState::Completed] {
        let poll = session.poll().await;
        assert_eq!(poll.reason, ReasonCode::P002_PHASE_ENDED);
        assert_eq!(poll.state, expected);
        assert!(poll.transition.unwrap().reconciliation.is_none());
    }
    assert!(categorizer.reconciled.lock().unwrap().is_empty());
    assert!(session.is_complete());
}

/// Running phase reports its remaining time
#[tokio::test]
async fn test_poll_while_running() {
    let categorizer = Arc::new(CountingCategorizer::default());
    let mut session = session_with(&SurveyConfig::default(), 0, categorizer);
    session.begin();

    let poll = session.poll().await;
    assert_eq!(poll.reason, ReasonCode::P001_PHASE_RUNNING);
    assert_eq!(poll.state, PhaseState::Active(0));
    assert!(poll.remaining_secs > 119.0 && poll.remaining_secs <= 120.0);
    assert!(poll.transition.is_none());
}

/// Late submission is refused and the next poll moves on
#[tokio::test]
async fn test_submission_after_budget_is_refused() {
    let categorizer = Arc::new(CountingCategorizer::default());
    let mut session = session_with(&instant_config(), 0, categorizer.clone());
    session.begin();

    let late = session.submit("build a wall").await;
    assert_eq!(late.reason, ReasonCode::P002_PHASE_ENDED);
    assert!(!late.is_accepted());
    assert_eq!(categorizer.classified.load(Ordering::SeqCst), 0);

    session.poll().await;
    assert_eq!(session.phase_state(), PhaseState::Active(1));
}

/// Batch verdict corrects labels; the block is cleared before the last phase
#[tokio::test]
async fn test_reconciliation_and_block_reset() {
    let categorizer = Arc::new(CountingCategorizer::default());
    let config = SurveyConfig {
        recess_secs: 0,
        ..SurveyConfig::default()
    };
    let mut session = session_with(&config, 0, categorizer.clone());
    session.begin();

    session.submit("build a wall").await;
    session.submit("nonsense words").await;
    let t = session.end_phase().await;
    assert_eq!(t.disqualified, vec!["nonsense words".to_string()]);
    assert_eq!(session.responses()[1].category, CategoryLabel::Disqualified);
    assert_eq!(
        session.responses()[0].category,
        CategoryLabel::Category("Building/Construction".into())
    );

    session.submit("paperweight").await;
    let t = session.end_phase().await;
    assert_eq!(t.from_index, 1);
    assert_eq!(t.to_index, 2);
    assert_eq!(t.disqualified, vec!["nonsense words".to_string()]);
    assert!(session.responses().is_empty());
    assert!(session.disqualified().is_empty());

    let batches = categorizer.reconciled.lock().unwrap().clone();
    assert_eq!(
        batches,
        vec![
            vec!["build a wall".to_string(), "nonsense words".to_string()],
            vec![
                "build a wall".to_string(),
                "nonsense words".to_string(),
                "paperweight".to_string()
            ],
        ]
    );
}

/// Last phase responses stay for the completion screen
#[tokio::test]
async fn test_completion_keeps_last_phase_responses() {
    let categorizer = Arc::new(CountingCategorizer::default());
    let config = SurveyConfig {
        recess_secs: 0,
        ..SurveyConfig::default()
    };
    let mut session = session_with(&config, 2, categorizer);
    session.begin();
    session.end_phase().await;
    session.end_phase().await;
    assert_eq!(session.status().object, Some(ObjectId::Brick));

    session.submit("build a wall").await;
    let t = session.end_phase().await;
    assert!(t.completed);
    assert_eq!(session.responses().len(), 1);

    let completion = session.finish().await;
    assert_eq!(completion.completion_code, "C6KNGZWE");
    assert!(completion.completion_url.ends_with("?cc=C6KNGZWE"));
}

/// Recess ends on its own and only then starts the phase clock
#[tokio::test]
async fn test_recess_resumes_after_its_time() {
    let categorizer = Arc::new(CountingCategorizer::default());
    let config = SurveyConfig {
        recess_secs: 1,
        phases: vec![
            PhaseDef::new("one", 0),
            PhaseDef::new("two", 30),
            PhaseDef::new("three", 30),
        ],
        ..SurveyConfig::default()
    };
    let mut session = session_with(&config, 0, categorizer);
    session.begin();

    let poll = session.poll().await;
    assert_eq!(poll.state, PhaseState::Recess(1));
    assert_eq!(poll.transition.unwrap().recess_secs, Some(1));

    let resting = session.poll().await;
    assert_eq!(resting.reason, ReasonCode::P003_RECESS);
    assert!(resting.remaining_secs <= 1.0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let resumed = session.poll().await;
    assert_eq!(resumed.reason, ReasonCode::P001_PHASE_RUNNING);
    assert_eq!(resumed.state, PhaseState::Active(1));
    assert!(resumed.remaining_secs > 29.0);
    assert_eq!(session.hints().len(), aut_flex::MAX_HINTS);
}
