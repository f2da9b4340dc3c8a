//! Property tests for snapshot reconciliation
use proptest::prelude::*;
use std::collections::BTreeMap;

use transfer_monitor::application::{LocalState, reconcile};
use transfer_monitor::domain::{
    CompletedDownload, CompletedRegistry, ConcurrentDownload, FileId, ProgressSnapshot, RenderInstruction,
    SessionKind, SessionState,
};

fn fresh() -> LocalState {
    LocalState {
        session: SessionState::new(SessionKind::Batch),
        registry: CompletedRegistry::new(),
    }
}

fn file_id() -> impl Strategy<Value = FileId> {
    (0u8..12).prop_map(|n| FileId::new(format!("f{n}")))
}

prop_compose! {
    fn concurrent()(progress in 0u64..10_000, total in 0u64..10_000, retry in proptest::option::of(1u32..5))
        -> ConcurrentDownload {
        ConcurrentDownload {
            name: "file.bin".into(),
            progress,
            total,
            retry_attempt: retry,
            ..ConcurrentDownload::default()
        }
    }
}

prop_compose! {
    fn snapshot()(
        active in any::<bool>(),
        completed in proptest::collection::btree_set(file_id(), 0..6),
        running in proptest::collection::btree_map(file_id(), concurrent(), 0..6),
        total in 0u64..20,
    ) -> ProgressSnapshot {
        let completed_downloads: BTreeMap<FileId, CompletedDownload> = completed
            .into_iter()
            .map(|id| {
                let name = format!("{id}.bin");
                (id, CompletedDownload { name, ..CompletedDownload::default() })
            })
            .collect();
        ProgressSnapshot {
            active,
            progress: completed_downloads.len() as u64,
            total,
            completed_downloads,
            concurrent_downloads: running,
            ..ProgressSnapshot::idle()
        }
    }
}

proptest! {
    #[test]
    fn reapplying_a_snapshot_adds_nothing(snap in snapshot()) {
        let first = reconcile(fresh(), &snap);
        let second = reconcile(first.state.clone(), &snap);

        prop_assert!(second.newly_completed.is_empty());
        prop_assert_eq!(second.state.registry.len(), first.state.registry.len());
        let rendered_again = second
            .instructions
            .iter()
            .any(|i| matches!(i, RenderInstruction::RenderCompleted { .. }));
        prop_assert!(!rendered_again, "completed transfer rendered twice");
    }

    #[test]
    fn completed_ids_never_render_active_again(snaps in proptest::collection::vec(snapshot(), 1..8)) {
        let mut state = fresh();
        let mut seen_completed: Vec<FileId> = Vec::new();
        let mut announcements = 0;

        for snap in &snaps {
            let result = reconcile(state, snap);
            for instruction in &result.instructions {
                if let RenderInstruction::UpsertActive { entry } = instruction {
                    prop_assert!(!seen_completed.contains(&entry.file_id));
                }
            }
            for id in &result.newly_completed {
                prop_assert!(!seen_completed.contains(id));
            }
            seen_completed.extend(result.newly_completed.iter().cloned());
            if result.announcement.is_some() {
                announcements += 1;
            }
            state = result.state;
        }

        prop_assert!(announcements <= 1);
        prop_assert_eq!(state.registry.len(), seen_completed.len());
    }
}
