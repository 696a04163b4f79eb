//! Classification workflow scenarios against a real data directory.

mod common;

use std::time::Duration;

use common::harness::wait_for_status;
use common::{jpeg_bytes, png_bytes, truncated_png, StandardBuilder, TestHarness};

use herdscore::{
    AnalysisError, AnalysisOutcome, InMemoryRemote, RecordStatus, ScoreGrade,
    StubAnalysisProvider, WorkflowError,
};

#[tokio::test]
async fn capture_analyze_commit_sync() {
    let harness = TestHarness::new();
    let station = harness.open();
    let workflow = station.workflow();

    let draft = workflow.capture(&png_bytes()).unwrap();
    assert_eq!(draft.status(), RecordStatus::Draft);
    assert!(draft.id().starts_with("TEST01-000001-"));
    assert!(!draft.is_analyzed());

    let analyzed = workflow.analyze(draft.id()).await.unwrap();
    assert_eq!(analyzed.category(), Some("Sahiwal"));
    assert_eq!(analyzed.confidence(), Some(94.2));
    assert_eq!(analyzed.score(), Some(78.9));
    assert_eq!(ScoreGrade::from_score(78.9), ScoreGrade::Good);
    assert_eq!(analyzed.status(), RecordStatus::Draft);

    let committed = workflow.commit(draft.id()).unwrap();
    assert_eq!(committed.status(), RecordStatus::PendingSync);

    let report = station.sync_engine().run_pass().await.unwrap();
    assert_eq!(report.synced(), 1);

    let synced = station.store().get(draft.id()).unwrap();
    assert_eq!(synced.status(), RecordStatus::Synced);
    assert_eq!(
        synced.remote_id(),
        harness.remote.remote_id_for(draft.id()).as_deref()
    );
}

#[tokio::test]
async fn configured_standard_drives_score() {
    let harness = TestHarness::new();
    let config = harness
        .config()
        .without_standards()
        .standard(
            StandardBuilder::new("Sahiwal")
                .trait_standard("bodyLength", 152.3, 10.0)
                .build(),
        )
        .build();
    let station = harness.open_with(config);

    let draft = station.workflow().capture(&png_bytes()).unwrap();
    let analyzed = station.workflow().analyze(draft.id()).await.unwrap();
    assert_eq!(analyzed.score(), Some(100.0));

    // Gir has no configured standard and there is no fallback.
    let overridden = station.workflow().set_category(draft.id(), "Gir").unwrap();
    assert_eq!(overridden.score(), Some(0.0));
}

#[tokio::test]
async fn station_without_standards_scores_zero() {
    let harness = TestHarness::new();
    let station = harness.open_with(harness.config().without_standards().build());

    let draft = station.workflow().capture(&png_bytes()).unwrap();
    let analyzed = station.workflow().analyze(draft.id()).await.unwrap();
    assert_eq!(analyzed.category(), Some("Sahiwal"));
    assert_eq!(analyzed.score(), Some(0.0));
    assert!(station.workflow().standards().is_empty());
}

#[tokio::test]
async fn edits_rescore_and_are_idempotent() {
    let harness = TestHarness::new();
    let station = harness.open();
    let workflow = station.workflow();

    let draft = workflow.capture(&jpeg_bytes()).unwrap();
    workflow.analyze(draft.id()).await.unwrap();

    let first = workflow.edit_trait(draft.id(), "heightAtWithers", 136.0).unwrap();
    let second = workflow.edit_trait(draft.id(), "heightAtWithers", 136.0).unwrap();
    assert_eq!(first.score(), second.score());
    assert!(first.score().unwrap() > 78.9);
    assert_eq!(second.confidence(), Some(94.2));

    assert!(matches!(
        workflow.edit_trait(draft.id(), "hornLength", 20.0),
        Err(WorkflowError::UnknownTrait { .. })
    ));
    assert!(matches!(
        workflow.edit_trait(draft.id(), "bodyLength", f64::NAN),
        Err(WorkflowError::InvalidTraitValue { .. })
    ));
}

#[tokio::test]
async fn provider_unavailable_leaves_plain_draft() {
    let harness = TestHarness::with_doubles(
        StubAnalysisProvider::failing(AnalysisError::ProviderUnavailable("offline".into())),
        InMemoryRemote::new(),
    );
    let station = harness.open();
    let workflow = station.workflow();

    let draft = workflow.capture(&png_bytes()).unwrap();
    let err = workflow.analyze(draft.id()).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!err.requires_recapture());
    // Two attempts per analysis in the test config.
    assert_eq!(harness.provider.calls(), 2);

    let record = station.store().get(draft.id()).unwrap();
    assert_eq!(record.status(), RecordStatus::Draft);
    assert!(!record.is_analyzed());
    assert!(matches!(
        workflow.commit(draft.id()),
        Err(WorkflowError::NotAnalyzed(_))
    ));

    // The operator retries once the provider is back.
    harness.provider.push_outcome(Ok(herdscore::analysis::sample_result()));
    assert!(workflow.analyze(draft.id()).await.unwrap().is_analyzed());
}

#[tokio::test]
async fn unusable_image_requires_recapture() {
    let harness = TestHarness::new();
    harness
        .provider
        .push_outcome(Err(AnalysisError::ImageUnusable("animal not visible".into())));
    let station = harness.open();
    let workflow = station.workflow();

    let draft = workflow.capture(&png_bytes()).unwrap();
    let err = workflow.analyze(draft.id()).await.unwrap_err();
    assert!(err.requires_recapture());
    assert_eq!(harness.provider.calls(), 1);

    let recaptured = workflow.recapture(draft.id(), &jpeg_bytes()).unwrap();
    assert_ne!(recaptured.image_ref(), draft.image_ref());
    assert!(workflow.analyze(draft.id()).await.unwrap().is_analyzed());
}

#[tokio::test]
async fn undecodable_capture_creates_nothing() {
    let harness = TestHarness::new();
    let station = harness.open();

    let err = station.workflow().capture(&truncated_png()).unwrap_err();
    assert!(err.requires_recapture());
    assert!(station.store().list_all().unwrap().is_empty());

    // No id was consumed by the failed capture.
    let draft = station.workflow().capture(&png_bytes()).unwrap();
    assert!(draft.id().starts_with("TEST01-000001-"));
}

#[tokio::test]
async fn recapture_discards_late_analysis() {
    let harness = TestHarness::with_doubles(
        StubAnalysisProvider::default().with_latency(Duration::from_millis(200)),
        InMemoryRemote::new(),
    );
    let station = harness.open();
    let workflow = station.workflow();

    let draft = workflow.capture(&png_bytes()).unwrap();
    let task = workflow.start_analysis(draft.id()).unwrap();
    assert!(workflow.is_analyzing(draft.id()));

    workflow.recapture(draft.id(), &jpeg_bytes()).unwrap();
    let outcome = task.wait().await;
    assert!(matches!(
        outcome,
        AnalysisOutcome::Cancelled | AnalysisOutcome::Discarded
    ));

    let record = station.store().get(draft.id()).unwrap();
    assert!(!record.is_analyzed());
}

#[tokio::test]
async fn cancel_keeps_record_unchanged() {
    let harness = TestHarness::with_doubles(
        StubAnalysisProvider::default().with_latency(Duration::from_secs(5)),
        InMemoryRemote::new(),
    );
    let station = harness.open();
    let workflow = station.workflow();

    let draft = workflow.capture(&png_bytes()).unwrap();
    let task = workflow.start_analysis(draft.id()).unwrap();
    assert!(workflow.cancel_analysis(draft.id()));
    assert!(matches!(task.wait().await, AnalysisOutcome::Cancelled));

    assert_eq!(station.store().get(draft.id()).unwrap(), draft);
}

#[tokio::test]
async fn committed_record_is_frozen_until_reopened() {
    let harness = TestHarness::new();
    let station = harness.open();
    let workflow = station.workflow();
    let record = harness.committed_record(&station).await;

    assert!(matches!(
        workflow.set_category(record.id(), "Gir"),
        Err(WorkflowError::InvalidState { .. })
    ));
    assert!(matches!(
        workflow.reopen(record.id()),
        Err(WorkflowError::InvalidState {
            status: RecordStatus::PendingSync,
            ..
        })
    ));

    station.sync_engine().run_pass().await.unwrap();
    let reopened = workflow.reopen(record.id()).unwrap();
    assert_eq!(reopened.status(), RecordStatus::Draft);
    assert_eq!(reopened.remote_id(), None);
    assert_eq!(reopened.sync_attempts(), 0);

    workflow.set_notes(record.id(), Some("  limping, recheck  ")).unwrap();
    let edited = workflow.set_animal_tag(record.id(), Some("IN-4471")).unwrap();
    assert_eq!(edited.notes.as_deref(), Some("limping, recheck"));
    assert_eq!(edited.animal_tag.as_deref(), Some("IN-4471"));
}

#[tokio::test]
async fn reopened_record_resyncs_to_same_remote_entity() {
    let harness = TestHarness::new();
    let station = harness.open();
    let workflow = station.workflow();
    let record = harness.committed_record(&station).await;

    station.sync_engine().run_pass().await.unwrap();
    let first_remote = harness.remote.remote_id_for(record.id()).unwrap();

    workflow.reopen(record.id()).unwrap();
    workflow.set_category(record.id(), "Gir").unwrap();
    workflow.commit(record.id()).unwrap();
    station.sync_engine().run_pass().await.unwrap();

    let synced = station.store().get(record.id()).unwrap();
    assert_eq!(synced.remote_id(), Some(first_remote.as_str()));
    assert_eq!(harness.remote.entity_count(), 1);
    assert_eq!(harness.remote.payload_for(record.id()).unwrap().category, "Gir");
}

#[tokio::test]
async fn auto_sync_picks_up_commits() {
    let harness = TestHarness::new();
    let station = harness.open_with(harness.config().auto_sync(true).build());
    let handle = station.start_sync();

    let record = harness.committed_record(&station).await;
    wait_for_status(&station, record.id(), RecordStatus::Synced).await;

    handle.shutdown().await.unwrap();
}
