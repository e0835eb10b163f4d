// Test-specific lint overrides: property tests use unwrap freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Property-based serialization round-trip tests.
//!
//! Uses proptest to verify:
//! 1. Any valid `Task` survives encode → decode round-trip.
//! 2. Any valid `ServerEvent` and `ClientCommand` survive their
//!    postcard round-trips.
//! 3. Random bytes never cause a panic in decode (returns `Err` or a
//!    decoded value, never aborts).

use proptest::prelude::*;
use uuid::Uuid;

use dealboard_proto::event::{
    ClientCommand, ServerEvent, decode_command, decode_event, encode_command, encode_event,
};
use dealboard_proto::presence::{ConnId, PresenceEntry, PresenceStatus};
use dealboard_proto::task::{Priority, Task, TaskDraft, TaskId, TaskStatus};

// --- Strategies for protocol types ---

/// Strategy for generating arbitrary `TaskId` values.
fn arb_task_id() -> impl Strategy<Value = TaskId> {
    any::<u128>().prop_map(|n| TaskId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating arbitrary `ConnId` values.
fn arb_conn_id() -> impl Strategy<Value = ConnId> {
    any::<u128>().prop_map(|n| ConnId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating arbitrary `TaskStatus` values.
fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Negotiation),
        Just(TaskStatus::Done),
    ]
}

/// Strategy for generating arbitrary `Priority` values.
fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
        Just(Priority::Urgent),
    ]
}

/// Strategy for generating arbitrary due dates (or none).
fn arb_due_date() -> impl Strategy<Value = Option<chrono::NaiveDate>> {
    prop_oneof![
        Just(None),
        (2000i32..2100, 1u32..=12, 1u32..=28)
            .prop_map(|(y, m, d)| chrono::NaiveDate::from_ymd_opt(y, m, d)),
    ]
}

/// Strategy for generating arbitrary `Task` values.
fn arb_task() -> impl Strategy<Value = Task> {
    (
        arb_task_id(),
        "[^\x00]{1,64}",
        arb_status(),
        "[^\x00]{1,32}",
        "[a-z]{1,16}",
        arb_priority(),
        any::<u64>(),
        arb_due_date(),
        "[^\x00]{0,32}",
        any::<u64>(),
        any::<u64>(),
    )
        .prop_map(
            |(
                id,
                text,
                status,
                assignee,
                task_type,
                priority,
                deal_value,
                due_date,
                created_by,
                created_at,
                updated_at,
            )| Task {
                id,
                text,
                status,
                assignee,
                task_type,
                priority,
                deal_value,
                due_date,
                created_by,
                created_at,
                updated_at,
            },
        )
}

/// Strategy for generating arbitrary `TaskDraft` values.
fn arb_draft() -> impl Strategy<Value = TaskDraft> {
    (
        "[^\x00]{0,64}",
        "[^\x00]{0,32}",
        proptest::option::of("[a-z]{1,16}".prop_map(String::from)),
        proptest::option::of(arb_priority()),
        proptest::option::of(any::<u64>()),
        arb_due_date(),
        proptest::option::of("[^\x00]{1,32}".prop_map(String::from)),
    )
        .prop_map(
            |(text, assignee, task_type, priority, deal_value, due_date, created_by)| TaskDraft {
                text,
                assignee,
                task_type,
                priority,
                deal_value,
                due_date,
                created_by,
            },
        )
}

/// Strategy for generating arbitrary `PresenceEntry` values.
fn arb_presence_entry() -> impl Strategy<Value = PresenceEntry> {
    (arb_conn_id(), "[^\x00]{1,32}", any::<u64>()).prop_map(|(conn_id, name, joined_at)| {
        PresenceEntry {
            conn_id,
            name,
            status: PresenceStatus::Online,
            joined_at,
        }
    })
}

/// Strategy for generating arbitrary `ClientCommand` values.
fn arb_command() -> impl Strategy<Value = ClientCommand> {
    prop_oneof![
        "[^\x00]{1,32}".prop_map(|name| ClientCommand::Join { name }),
        (
            arb_draft(),
            proptest::option::of("[a-z0-9-]{1,24}".prop_map(String::from))
        )
            .prop_map(|(draft, operation_id)| ClientCommand::CreateTask {
                draft,
                operation_id
            }),
        (arb_task_id(), arb_status())
            .prop_map(|(task_id, status)| ClientCommand::MoveTask { task_id, status }),
        arb_task_id().prop_map(|task_id| ClientCommand::DeleteTask { task_id }),
        Just(ClientCommand::TypingStart),
        Just(ClientCommand::TypingStop),
    ]
}

/// Strategy for generating arbitrary `ServerEvent` values.
fn arb_event() -> impl Strategy<Value = ServerEvent> {
    prop_oneof![
        (arb_task(), "[^\x00]{1,32}", any::<u64>(), "[a-z0-9-]{1,24}").prop_map(
            |(task, user, timestamp, operation_id)| ServerEvent::TaskCreated {
                task,
                user,
                timestamp,
                operation_id,
            }
        ),
        (
            arb_task_id(),
            arb_status(),
            "[^\x00]{1,32}",
            any::<u64>(),
            any::<u64>()
        )
            .prop_map(|(task_id, new_status, moved_by, timestamp, version)| {
                ServerEvent::TaskMoved {
                    task_id,
                    new_status,
                    moved_by,
                    timestamp,
                    version,
                }
            }),
        (arb_task_id(), "[^\x00]{1,32}", any::<u64>()).prop_map(
            |(task_id, deleted_by, timestamp)| ServerEvent::TaskDeleted {
                task_id,
                deleted_by,
                timestamp,
            }
        ),
        proptest::collection::vec(arb_presence_entry(), 0..8)
            .prop_map(|users| ServerEvent::UsersUpdate { users }),
        ("[^\x00]{0,128}", any::<u64>())
            .prop_map(|(message, timestamp)| ServerEvent::Activity { message, timestamp }),
        proptest::collection::vec("[^\x00]{1,32}".prop_map(String::from), 0..8)
            .prop_map(|names| ServerEvent::TypingUpdate { names }),
        (
            "[^\x00]{0,128}",
            proptest::option::of("[a-z0-9-]{1,24}".prop_map(String::from))
        )
            .prop_map(|(message, operation_id)| ServerEvent::OperationFailed {
                message,
                operation_id,
            }),
    ]
}

// --- Properties ---

proptest! {
    #[test]
    fn task_round_trips_through_postcard(task in arb_task()) {
        let bytes = postcard::to_allocvec(&task).unwrap();
        let decoded: Task = postcard::from_bytes(&bytes).unwrap();
        prop_assert_eq!(task, decoded);
    }

    #[test]
    fn command_round_trips(cmd in arb_command()) {
        let bytes = encode_command(&cmd).unwrap();
        let decoded = decode_command(&bytes).unwrap();
        prop_assert_eq!(cmd, decoded);
    }

    #[test]
    fn event_round_trips(event in arb_event()) {
        let bytes = encode_event(&event).unwrap();
        let decoded = decode_event(&bytes).unwrap();
        prop_assert_eq!(event, decoded);
    }

    #[test]
    fn random_bytes_never_panic_decoders(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        // Must return, not abort; the result itself is irrelevant.
        let _ = decode_command(&bytes);
        let _ = decode_event(&bytes);
    }

    #[test]
    fn status_strings_round_trip(status in arb_status()) {
        let parsed: TaskStatus = status.to_string().parse().unwrap();
        prop_assert_eq!(status, parsed);
    }
}
