// tests/property_invariants.rs

//! Property test: for random mixes of providing, requiring, and failing
//! actions completed in random orders, the core always drains, never
//! exceeds the parallelism cap, and accounts for every action.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use common::{setup, RequireAction, SuffixFactory};

use flowbuild::driver::{
    ActionId, ActionReport, ActionState, DriverCommand, DriverEvent, Provision,
};
use flowbuild::entity::EntityId;
use flowbuild::fs::mock::MockFileSystem;
use flowbuild::fs::{FileHandle, FileSystem};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Succeed, providing entity `gen:<k>`.
    Provide(usize),
    /// Require entity `gen:<k>`; block until someone provides it.
    Require(usize),
    /// Fail outright.
    Fail,
}

fn behavior_strategy() -> impl Strategy<Value = Behavior> {
    prop_oneof![
        (0..4usize).prop_map(Behavior::Provide),
        (0..4usize).prop_map(Behavior::Require),
        Just(Behavior::Fail),
    ]
}

fn entity(k: usize) -> EntityId {
    EntityId::parse(&format!("gen:{k}"))
}

fn command_parts(command: &DriverCommand) -> (ActionId, usize) {
    match command {
        DriverCommand::StartAction { id, action, .. } => {
            let index = action
                .verb()
                .parse::<usize>()
                .expect("verb encodes the behavior index");
            (*id, index)
        }
    }
}

fn report_for(
    behavior: Behavior,
    mock: &MockFileSystem,
    entities: &HashMap<EntityId, FileHandle>,
) -> ActionReport {
    match behavior {
        Behavior::Provide(k) => ActionReport {
            state: ActionState::Succeeded,
            missing: HashMap::new(),
            provisions: vec![Provision {
                file: FileHandle::new(
                    Arc::new(mock.clone()) as Arc<dyn FileSystem>,
                    format!("tmp/e{k}"),
                ),
                entities: vec![entity(k)],
            }],
            outputs: Vec::new(),
        },
        Behavior::Require(k) => {
            if entities.contains_key(&entity(k)) {
                ActionReport {
                    state: ActionState::Succeeded,
                    missing: HashMap::new(),
                    provisions: Vec::new(),
                    outputs: Vec::new(),
                }
            } else {
                ActionReport {
                    state: ActionState::Failed,
                    missing: [(entity(k), format!("gen:{k}"))].into_iter().collect(),
                    provisions: Vec::new(),
                    outputs: Vec::new(),
                }
            }
        }
        Behavior::Fail => ActionReport {
            state: ActionState::Failed,
            missing: HashMap::new(),
            provisions: Vec::new(),
            outputs: Vec::new(),
        },
    }
}

proptest! {
    #[test]
    fn core_always_drains_and_respects_the_cap(
        behaviors in proptest::collection::vec(behavior_strategy(), 1..8),
        cap in 1..4usize,
        picks in proptest::collection::vec(any::<usize>(), 1..64),
    ) {
        let files: Vec<String> = (0..behaviors.len()).map(|i| format!("f{i}.task")).collect();
        let file_refs: Vec<&str> = files.iter().map(|s| s.as_str()).collect();
        let (mut core, _dashboard, mock) = setup(cap, &file_refs);

        core.add_action_factory(
            "sim",
            Arc::new(SuffixFactory::new(".task", |file| {
                let base = file.basename();
                let index = base
                    .strip_prefix('f')
                    .and_then(|s| s.strip_suffix(".task"))
                    .expect("simulated file name");
                Box::new(RequireAction::new(index, &[]))
            })),
        );

        let entity_map = core.entity_map();
        let mut inflight: Vec<(ActionId, usize)> =
            core.start().iter().map(command_parts).collect();

        let mut steps = 0usize;
        while !inflight.is_empty() {
            prop_assert!(steps < 10_000, "simulation did not drain");
            prop_assert!(core.active_count() <= cap);
            prop_assert!(inflight.len() <= cap);

            let pick = picks[steps % picks.len()] % inflight.len();
            let (id, index) = inflight.remove(pick);

            let report = {
                let snapshot = entity_map.read().unwrap();
                report_for(behaviors[index], &mock, &snapshot)
            };

            let step = core.step(DriverEvent::ActionReturned { id, report });
            inflight.extend(step.commands.iter().map(command_parts));
            steps += 1;
        }

        prop_assert!(core.is_idle());

        let summary = core.shutdown();
        prop_assert_eq!(
            summary.succeeded + summary.failed + summary.blocked,
            behaviors.len()
        );
        // Whatever ended up blocked must be a Require whose entity nobody
        // ever provided.
        let provided: Vec<usize> = behaviors
            .iter()
            .filter_map(|b| match b {
                Behavior::Provide(k) => Some(*k),
                _ => None,
            })
            .collect();
        if summary.blocked > 0 {
            let unprovidable = behaviors.iter().any(|b| {
                matches!(b, Behavior::Require(k) if !provided.contains(k))
            });
            prop_assert!(unprovidable);
        }
    }
}
