//! Property-based tests for the task list reducer and view helpers.
//!
//! Uses proptest to verify:
//! 1. Adding a valid task grows the list by one, at the end, open.
//! 2. Blank text or a duplicate id leaves the list unchanged.
//! 3. Toggling twice restores every task's completion state.
//! 4. Deleting an absent id is a no-op.
//! 5. Complete-all applied twice restores the original "all completed" flag.
//! 6. Clear-completed keeps exactly the open tasks, in order.
//! 7. Active and completed views partition the list.
//! 8. Unknown actions never change state.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;

use proptest::prelude::*;
use taskdeck::tasks::{Action, TaskListState, filtered_tasks, reduce, stats};
use taskdeck_proto::task::{Filter, Identity, Task, TaskId, Timestamp};
use uuid::Uuid;

// --- Strategies ---

fn arb_task_id() -> impl Strategy<Value = TaskId> {
    any::<u128>().prop_map(|n| TaskId::from_uuid(Uuid::from_u128(n)))
}

fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    (0u64..4_000_000_000_000).prop_map(Timestamp::from_millis)
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        arb_task_id(),
        "[a-z][a-z ]{0,30}",
        any::<bool>(),
        prop::option::of("[a-z]{1,8}"),
        arb_timestamp(),
    )
        .prop_map(|(id, text, completed, owner, at)| {
            let mut task = Task::new(id, text, owner.map(Identity::new), at);
            task.completed = completed;
            task
        })
}

fn arb_filter() -> impl Strategy<Value = Filter> {
    prop_oneof![
        Just(Filter::All),
        Just(Filter::Active),
        Just(Filter::Completed)
    ]
}

/// States with unique task ids.
fn arb_state() -> impl Strategy<Value = TaskListState> {
    (prop::collection::vec(arb_task(), 0..20), arb_filter()).prop_map(|(tasks, filter)| {
        let mut seen = HashSet::new();
        let tasks = tasks.into_iter().filter(|t| seen.insert(t.id)).collect();
        TaskListState { tasks, filter }
    })
}

fn completion(state: &TaskListState) -> Vec<(TaskId, bool)> {
    state.tasks.iter().map(|t| (t.id, t.completed)).collect()
}

// --- Properties ---

proptest! {
    #[test]
    fn add_appends_open_task(
        state in arb_state(),
        id in arb_task_id(),
        text in "[a-z]{1,40}",
        at in arb_timestamp(),
    ) {
        prop_assume!(state.get(id).is_none());
        let next = reduce(&state, &Action::Add { id, text: text.clone(), owner_id: None, at });

        prop_assert_eq!(next.tasks.len(), state.tasks.len() + 1);
        let added = next.tasks.last().unwrap();
        prop_assert_eq!(added.id, id);
        prop_assert_eq!(&added.text, &text);
        prop_assert!(!added.completed);
        prop_assert_eq!(added.created_at, at);
        prop_assert_eq!(&next.tasks[..state.tasks.len()], &state.tasks[..]);
    }

    #[test]
    fn add_blank_or_duplicate_is_noop(
        state in arb_state(),
        id in arb_task_id(),
        blank in "[ \t\n]{0,5}",
        at in arb_timestamp(),
    ) {
        let next = reduce(&state, &Action::Add { id, text: blank, owner_id: None, at });
        prop_assert_eq!(&next, &state);

        if let Some(existing) = state.tasks.first() {
            let dup = Action::Add { id: existing.id, text: "again".to_string(), owner_id: None, at };
            prop_assert_eq!(reduce(&state, &dup), state.clone());
        }
    }

    #[test]
    fn toggle_twice_restores_completion(
        state in arb_state(),
        pick in any::<prop::sample::Index>(),
        at in arb_timestamp(),
    ) {
        prop_assume!(!state.tasks.is_empty());
        let id = state.tasks[pick.index(state.tasks.len())].id;

        let once = reduce(&state, &Action::Toggle { id, at });
        prop_assert_eq!(
            once.get(id).unwrap().completed,
            !state.get(id).unwrap().completed
        );
        let twice = reduce(&once, &Action::Toggle { id, at });
        prop_assert_eq!(completion(&twice), completion(&state));
    }

    #[test]
    fn delete_absent_is_noop(state in arb_state(), id in arb_task_id()) {
        prop_assume!(state.get(id).is_none());
        prop_assert_eq!(reduce(&state, &Action::Delete { id }), state);
    }

    #[test]
    fn delete_present_removes_only_that_task(
        state in arb_state(),
        pick in any::<prop::sample::Index>(),
    ) {
        prop_assume!(!state.tasks.is_empty());
        let id = state.tasks[pick.index(state.tasks.len())].id;
        let next = reduce(&state, &Action::Delete { id });

        let expected: Vec<Task> = state.tasks.iter().filter(|t| t.id != id).cloned().collect();
        prop_assert_eq!(next.tasks, expected);
    }

    #[test]
    fn complete_all_twice_restores_flag(state in arb_state(), at in arb_timestamp()) {
        prop_assume!(!state.tasks.is_empty());
        let all = state.all_completed();

        let once = reduce(&state, &Action::CompleteAll { at });
        prop_assert!(once.tasks.iter().all(|t| t.completed != all));
        let twice = reduce(&once, &Action::CompleteAll { at });
        prop_assert!(twice.tasks.iter().all(|t| t.completed == all));
    }

    #[test]
    fn clear_completed_keeps_open_tasks_in_order(state in arb_state()) {
        let next = reduce(&state, &Action::ClearCompleted);
        let expected: Vec<Task> = state.tasks.iter().filter(|t| !t.completed).cloned().collect();
        prop_assert_eq!(next.tasks, expected);
        prop_assert_eq!(next.filter, state.filter);
    }

    #[test]
    fn active_and_completed_partition_the_list(state in arb_state()) {
        let with = |filter| {
            let s = reduce(&state, &Action::SetFilter { filter });
            filtered_tasks(&s)
        };
        let all = with(Filter::All);
        let active = with(Filter::Active);
        let completed = with(Filter::Completed);

        prop_assert_eq!(&all, &state.tasks);
        prop_assert_eq!(active.len() + completed.len(), all.len());
        prop_assert!(active.iter().all(|t| !t.completed));
        prop_assert!(completed.iter().all(|t| t.completed));

        let counts = stats(&state.tasks);
        prop_assert_eq!(counts.total, all.len());
        prop_assert_eq!(counts.active, active.len());
        prop_assert_eq!(counts.completed, completed.len());
        let percent = counts.percent_complete();
        prop_assert!((0.0..=100.0).contains(&percent));
    }

    #[test]
    fn unknown_action_is_identity(state in arb_state()) {
        prop_assert_eq!(reduce(&state, &Action::Unknown), state);
    }

    #[test]
    fn initialize_keeps_first_of_each_id(tasks in prop::collection::vec(arb_task(), 0..20)) {
        let mut doubled = tasks.clone();
        doubled.extend(tasks.iter().cloned());
        let next = reduce(&TaskListState::new(), &Action::Initialize { tasks: doubled });

        let ids: Vec<TaskId> = next.tasks.iter().map(|t| t.id).collect();
        let unique: HashSet<TaskId> = ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), unique.len());

        let mut seen = HashSet::new();
        let expected: Vec<Task> = tasks.into_iter().filter(|t| seen.insert(t.id)).collect();
        prop_assert_eq!(next.tasks, expected);
    }
}
