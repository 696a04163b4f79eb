//! Record store durability and write serialization.

mod common;

use std::sync::Arc;

use common::{png_bytes, TestHarness};

use herdscore::{RecordStatus, StoreError};

#[tokio::test]
async fn records_survive_restart() {
    let harness = TestHarness::new();
    let (draft_id, committed) = {
        let station = harness.open();
        let draft = station.workflow().capture(&png_bytes()).unwrap();
        let committed = harness.committed_record(&station).await;
        (draft.id().to_string(), committed)
    };

    let station = harness.open();
    assert_eq!(station.store().get(committed.id()).unwrap(), committed);
    assert_eq!(
        station.store().get(&draft_id).unwrap().status(),
        RecordStatus::Draft
    );

    // Ids keep counting after a restart.
    let next = station.workflow().capture(&png_bytes()).unwrap();
    assert!(next.id().starts_with("TEST01-000003-"));
}

#[test]
fn get_unknown_record() {
    let harness = TestHarness::new();
    let station = harness.open();
    assert!(matches!(
        station.store().get("TEST01-999999-20240101000000"),
        Err(StoreError::NotFound(_))
    ));
    assert!(station
        .store()
        .find("TEST01-999999-20240101000000")
        .unwrap()
        .is_none());
}

#[test]
fn update_reflects_exactly_the_mutation() {
    let harness = TestHarness::new();
    let station = harness.open();
    let draft = station.workflow().capture(&png_bytes()).unwrap();

    let updated = station
        .store()
        .update(draft.id(), |r| {
            r.animal_tag = Some("IN-0042".to_string());
            Ok::<(), StoreError>(())
        })
        .unwrap();

    assert_eq!(updated.animal_tag.as_deref(), Some("IN-0042"));
    assert_eq!(updated.notes, draft.notes);
    assert_eq!(updated.image_ref(), draft.image_ref());
    assert_eq!(updated.created_at(), draft.created_at());
    assert!(updated.updated_at() > draft.updated_at());
    assert_eq!(station.store().get(draft.id()).unwrap(), updated);
}

#[test]
fn concurrent_updates_do_not_lose_writes() {
    let harness = TestHarness::new();
    let station = harness.open();
    let draft = station.workflow().capture(&png_bytes()).unwrap();
    let store = Arc::new(station.store().clone());

    let writers: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            let id = draft.id().to_string();
            std::thread::spawn(move || {
                for j in 0..10 {
                    store
                        .update(&id, |r| {
                            let mut notes = r.notes.clone().unwrap_or_default();
                            notes.push_str(&format!("[{i}:{j}]"));
                            r.notes = Some(notes);
                            Ok::<(), StoreError>(())
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let notes = store.get(draft.id()).unwrap().notes.unwrap();
    for i in 0..8 {
        for j in 0..10 {
            assert!(notes.contains(&format!("[{i}:{j}]")), "lost write {i}:{j}");
        }
    }
}

#[tokio::test]
async fn status_changes_are_broadcast() {
    let harness = TestHarness::new();
    let station = harness.open();
    let mut events = station.store().subscribe();

    let record = harness.committed_record(&station).await;

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.record_id, record.id());
        statuses.push(event.status);
    }
    assert_eq!(statuses.first(), Some(&RecordStatus::Draft));
    assert_eq!(statuses.last(), Some(&RecordStatus::PendingSync));
}

#[test]
fn count_by_status() {
    let harness = TestHarness::new();
    let station = harness.open();
    for _ in 0..3 {
        station.workflow().capture(&png_bytes()).unwrap();
    }
    let counts = station.store().count_by_status().unwrap();
    assert_eq!(counts.get(&RecordStatus::Draft), Some(&3));
    assert_eq!(counts.get(&RecordStatus::Synced).copied().unwrap_or(0), 0);
}
