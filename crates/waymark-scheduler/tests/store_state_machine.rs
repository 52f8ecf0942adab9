//! Stateful property testing for the reminder store.
//!
//! Drives a real on-disk store and a plain map through the same sequence of
//! puts, removes, reopens and truncations, and checks after every step that
//! the file holds exactly what the map does.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest, prop_state_machine};
use tempfile::TempDir;
use tokio::runtime::Runtime;

use waymark_geo::{Coordinates, Place};
use waymark_scheduler::{DayOfWeek, ListenerRef, ReminderKind, ReminderRecord, ReminderStore, TimeOfDay};

/// Small id pool so puts, replaces and removes collide often.
const IDS: [&str; 5] = ["a", "b", "c", "d", "e"];

/// Operations on the store.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Insert or replace a time reminder.
    PutTime { id: String, day: DayOfWeek },
    /// Insert or replace a location reminder.
    PutLocation { id: String, day: DayOfWeek },
    /// Remove a reminder, present or not.
    Remove { id: String },
    /// Drop the store and open a fresh one on the same file.
    Reopen,
    /// Truncate the backing file to zero length.
    Truncate,
}

/// What the model remembers per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryModel {
    Time(DayOfWeek),
    Location(DayOfWeek),
}

/// Reference model: the mapping the store should hold.
#[derive(Clone, Debug, Default)]
pub struct StoreModel {
    pub entries: HashMap<String, EntryModel>,
}

fn id_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(IDS.to_vec()).prop_map(str::to_string)
}

fn day_strategy() -> impl Strategy<Value = DayOfWeek> {
    prop::sample::select(DayOfWeek::ALL.to_vec())
}

impl ReferenceStateMachine for StoreModel {
    type State = Self;
    type Transition = StoreOperation;

    fn init_state() -> BoxedStrategy<Self::State> {
        Just(Self::default()).boxed()
    }

    fn transitions(_state: &Self::State) -> BoxedStrategy<Self::Transition> {
        prop_oneof![
            4 => (id_strategy(), day_strategy())
                .prop_map(|(id, day)| StoreOperation::PutTime { id, day }),
            3 => (id_strategy(), day_strategy())
                .prop_map(|(id, day)| StoreOperation::PutLocation { id, day }),
            3 => id_strategy().prop_map(|id| StoreOperation::Remove { id }),
            1 => Just(StoreOperation::Reopen),
            1 => Just(StoreOperation::Truncate),
        ]
        .boxed()
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            StoreOperation::PutTime { id, day } => {
                state.entries.insert(id.clone(), EntryModel::Time(*day));
            }
            StoreOperation::PutLocation { id, day } => {
                state.entries.insert(id.clone(), EntryModel::Location(*day));
            }
            StoreOperation::Remove { id } => {
                state.entries.remove(id);
            }
            StoreOperation::Reopen => {}
            // An empty file reads as an empty mapping.
            StoreOperation::Truncate => state.entries.clear(),
        }
        state
    }
}

/// Test harness wrapping a real store in a temp dir.
pub struct StoreTestHarness {
    runtime: Runtime,
    dir: TempDir,
    store: Arc<ReminderStore>,
}

impl StoreTestHarness {
    fn new() -> Self {
        let runtime = Runtime::new().expect("Failed to create tokio runtime");
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = Arc::new(ReminderStore::open(dir.path().join("reminders.json")));
        Self {
            runtime,
            dir,
            store,
        }
    }

    fn record(id: &str, kind: ReminderKind) -> ReminderRecord {
        ReminderRecord::new(id, kind, ListenerRef::new("log"))
    }

    fn apply_operation(&mut self, op: &StoreOperation) {
        match op {
            StoreOperation::PutTime { id, day } => {
                let kind = ReminderKind::Time {
                    day: *day,
                    time: TimeOfDay::new(9, 30, 0).unwrap(),
                };
                self.runtime
                    .block_on(self.store.put(id, Self::record(id, kind)))
                    .unwrap();
            }
            StoreOperation::PutLocation { id, day } => {
                let kind = ReminderKind::Location {
                    day: *day,
                    place: Place::new(Coordinates::new(48.85, 2.35), "Somewhere"),
                };
                self.runtime
                    .block_on(self.store.put(id, Self::record(id, kind)))
                    .unwrap();
            }
            StoreOperation::Remove { id } => {
                self.runtime.block_on(self.store.remove(id)).unwrap();
            }
            StoreOperation::Reopen => {
                self.store = Arc::new(ReminderStore::open(self.dir.path().join("reminders.json")));
            }
            StoreOperation::Truncate => {
                std::fs::write(self.store.path(), "").unwrap();
            }
        }
    }

    fn verify_invariants(&self, model: &StoreModel) {
        let all = self.runtime.block_on(self.store.load_all()).unwrap();

        // Invariant 1: same key set
        let mut actual_ids: Vec<&String> = all.keys().collect();
        let mut model_ids: Vec<&String> = model.entries.keys().collect();
        actual_ids.sort();
        model_ids.sort();
        assert_eq!(actual_ids, model_ids, "Id mismatch");

        for (id, expected) in &model.entries {
            let record = &all[id];

            // Invariant 2: the key is the record's own id
            assert_eq!(&record.id, id);

            // Invariant 3: kind and day match the last put
            let actual = match record.kind {
                ReminderKind::Time { day, .. } => EntryModel::Time(day),
                ReminderKind::Location { day, .. } => EntryModel::Location(day),
                ReminderKind::TimeLocation { .. } => panic!("unexpected time-location record {id}"),
            };
            assert_eq!(&actual, expected, "Record mismatch for {id}");

            // Invariant 4: get agrees with load_all
            let single = self.runtime.block_on(self.store.get(id)).unwrap();
            assert_eq!(single.as_ref(), Some(record));
        }
    }
}

impl StateMachineTest for StoreTestHarness {
    type SystemUnderTest = Self;
    type Reference = StoreModel;

    fn init_test(
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        Self::new()
    }

    fn apply(
        mut state: Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        state.apply_operation(&transition);
        state.verify_invariants(ref_state);
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        state.verify_invariants(ref_state);
    }
}

prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 2000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn store_state_machine_test(sequential 1..40 => StoreTestHarness);
}

#[test]
fn test_reopen_after_remove_all() {
    let mut harness = StoreTestHarness::new();
    harness.apply_operation(&StoreOperation::PutTime {
        id: "a".to_string(),
        day: DayOfWeek::Monday,
    });
    harness.apply_operation(&StoreOperation::Remove {
        id: "a".to_string(),
    });
    harness.apply_operation(&StoreOperation::Reopen);

    harness.verify_invariants(&StoreModel::default());
}
