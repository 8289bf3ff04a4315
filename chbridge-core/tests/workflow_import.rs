//! Import path of the workflow state machine.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

mod common;

use chbridge_core::ChBridgeError;
use chbridge_core::backend::{ImportResponse, Operation};
use chbridge_core::models::{Delimiter, FilePayload, TransferDirection};
use chbridge_core::schema_cache::{Fetch, FileKey};
use chbridge_core::status::{FailureKind, StatusPhase};
use chbridge_core::workflow::{Action, Completion, ConnectionEdit, Effect, Workflow};
use common::schema;

fn import_workflow() -> Workflow {
    let mut workflow = Workflow::new();
    workflow
        .handle(Action::SetDirection(TransferDirection::FileToDatabase))
        .unwrap();
    workflow
}

fn file_key(effects: &[Effect]) -> FileKey {
    effects
        .iter()
        .find_map(|effect| match effect {
            Effect::DescribeFile { key, .. } => Some(*key),
            _ => None,
        })
        .expect("a file description")
}

fn users_csv() -> FilePayload {
    FilePayload::new("users.csv", b"a,b,c\n1,2,3\n".to_vec())
}

/// Import direction with `users.csv` described as columns `[a, b, c]`.
fn with_file_schema() -> Workflow {
    let mut workflow = import_workflow();
    let effects = workflow.handle(Action::LoadFile(users_csv())).unwrap();
    workflow.complete(Completion::FileDescribed {
        key: file_key(&effects),
        result: Ok(schema(&["a", "b", "c"])),
    });
    workflow
}

#[test]
fn test_workflow_identity_mapping_then_single_edit() {
    let mut workflow = with_file_schema();
    let before = workflow.snapshot().mapping.mapping().clone();

    let entries = before.entries();
    assert_eq!(entries.len(), 3);
    for entry in entries {
        assert_eq!(entry.source, entry.target);
    }

    workflow
        .handle(Action::SetMappingTarget {
            source: "b".to_string(),
            target: "b2".to_string(),
        })
        .unwrap();

    let snapshot = workflow.snapshot();
    let after = snapshot.mapping.mapping();
    assert_eq!(after.target("a"), Some("a"));
    assert_eq!(after.target("b"), Some("b2"));
    assert_eq!(after.target("c"), Some("c"));
    assert_eq!(after.entries()[0], before.entries()[0]);
    assert_eq!(after.entries()[2], before.entries()[2]);
}

#[test]
fn test_workflow_mapping_edit_unknown_column_rejected() {
    let mut workflow = with_file_schema();
    let result = workflow.handle(Action::SetMappingTarget {
        source: "ghost".to_string(),
        target: "x".to_string(),
    });
    assert!(matches!(result, Err(ChBridgeError::ActionRejected { .. })));
}

#[test]
fn test_workflow_empty_target_is_unmapped() {
    let mut workflow = with_file_schema();
    workflow
        .handle(Action::SetTargetTable("users".to_string()))
        .unwrap();

    for column in ["a", "b", "c"] {
        workflow
            .handle(Action::SetMappingTarget {
                source: column.to_string(),
                target: String::new(),
            })
            .unwrap();
    }

    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.mapping.mapping().len(), 3);
    assert_eq!(snapshot.blockers(), vec!["column mapping is empty"]);
    assert!(workflow.handle(Action::Execute).is_err());
}

#[test]
fn test_workflow_file_replacement_discards_edits_and_late_schema() {
    let mut workflow = with_file_schema();
    workflow
        .handle(Action::SetMappingTarget {
            source: "a".to_string(),
            target: "alpha".to_string(),
        })
        .unwrap();

    // Same name, new content: a new identity
    let first = workflow.snapshot().file_key().unwrap();
    let effects = workflow
        .handle(Action::LoadFile(FilePayload::new(
            "users.csv",
            b"x,y\n".to_vec(),
        )))
        .unwrap();
    let second = file_key(&effects);
    assert_ne!(first, second);

    let snapshot = workflow.snapshot();
    assert!(snapshot.schema().is_none());
    assert!(snapshot.mapping.mapping().is_empty());

    // A late answer for the replaced file is dropped
    workflow.complete(Completion::FileDescribed {
        key: first,
        result: Ok(schema(&["a", "b", "c"])),
    });
    assert!(workflow.snapshot().cache.schema().is_loading());

    workflow.complete(Completion::FileDescribed {
        key: second,
        result: Ok(schema(&["x", "y"])),
    });
    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.mapping.mapping().target("x"), Some("x"));
    assert_eq!(snapshot.mapping.mapping().target("a"), None);
}

#[test]
fn test_workflow_same_delimiter_is_noop() {
    let mut workflow = with_file_schema();
    let effects = workflow
        .handle(Action::SetDelimiter(Delimiter::Comma))
        .unwrap();

    assert!(effects.is_empty());
    assert!(workflow.snapshot().schema().is_some());
}

#[test]
fn test_workflow_delimiter_without_file_issues_nothing() {
    let mut workflow = import_workflow();
    let effects = workflow.handle(Action::SetDelimiter(Delimiter::Tab)).unwrap();

    assert!(effects.is_empty());
    assert_eq!(workflow.snapshot().import.delimiter, Delimiter::Tab);
}

#[test]
fn test_workflow_file_analysis_failure() {
    let mut workflow = import_workflow();
    let effects = workflow
        .handle(Action::LoadFile(FilePayload::new("empty.csv", Vec::new())))
        .unwrap();

    workflow.complete(Completion::FileDescribed {
        key: file_key(&effects),
        result: Err(ChBridgeError::service(
            Operation::DescribeFile,
            Some(500),
            Some("File schema error: No columns to parse from file".to_string()),
        )),
    });

    let snapshot = workflow.snapshot();
    assert_eq!(
        snapshot.cache.schema().failure(),
        Some("Failed to analyze file: File schema error: No columns to parse from file")
    );
    assert!(snapshot.import.file.is_some());
    assert_eq!(snapshot.status.transfer.phase, StatusPhase::Idle);
}

#[test]
fn test_workflow_connection_edit_keeps_file_schema() {
    let mut workflow = with_file_schema();

    workflow
        .handle(Action::EditConnection(ConnectionEdit::User(
            "loader".to_string(),
        )))
        .unwrap();

    let snapshot = workflow.snapshot();
    assert!(!snapshot.connection_verified);
    assert_eq!(snapshot.cache.databases(), &Fetch::Idle);
    assert!(snapshot.schema().is_some());
    assert_eq!(snapshot.mapping.mapping().len(), 3);
}

#[test]
fn test_workflow_execute_import() {
    let mut workflow = with_file_schema();
    workflow
        .handle(Action::SelectDatabase(Some("staging".to_string())))
        .unwrap();
    workflow
        .handle(Action::SetTargetTable("users".to_string()))
        .unwrap();
    workflow.handle(Action::SetCreateTable(false)).unwrap();
    workflow
        .handle(Action::SetMappingTarget {
            source: "c".to_string(),
            target: String::new(),
        })
        .unwrap();

    let effects = workflow.handle(Action::Execute).unwrap();

    let [Effect::Import { execution, request }] = effects.as_slice() else {
        unreachable!("expected one import effect, got {effects:?}");
    };
    assert_eq!(request.table, "users");
    assert_eq!(request.connection.database.as_deref(), Some("staging"));
    assert!(!request.create_table);
    assert_eq!(request.delimiter, Delimiter::Comma);
    assert_eq!(request.file.name, "users.csv");
    assert_eq!(request.mapping.mapped_count(), 2);
    assert_eq!(workflow.snapshot().status.transfer.message, "Importing data...");

    workflow.complete(Completion::Imported {
        execution: *execution,
        result: Ok(ImportResponse {
            message: "Successfully imported 1 rows into users".to_string(),
            rows_imported: Some(1),
        }),
    });

    let status = workflow.snapshot().status.transfer.clone();
    assert_eq!(status.phase, StatusPhase::Success);
    assert_eq!(status.message, "Successfully imported 1 rows into users");
}

#[test]
fn test_workflow_import_failure_message() {
    let mut workflow = with_file_schema();
    workflow
        .handle(Action::SetTargetTable("users".to_string()))
        .unwrap();
    let effects = workflow.handle(Action::Execute).unwrap();
    let [Effect::Import { execution, .. }] = effects.as_slice() else {
        unreachable!("expected one import effect");
    };

    workflow.complete(Completion::Imported {
        execution: *execution,
        result: Err(ChBridgeError::service(Operation::Import, None, None)),
    });

    let status = workflow.snapshot().status.transfer.clone();
    assert_eq!(status.failure, Some(FailureKind::Execution));
    assert_eq!(status.message, "Import failed: Request failed");
}

#[test]
fn test_workflow_load_file_rejected_for_export() {
    let mut workflow = Workflow::new();
    let result = workflow.handle(Action::LoadFile(users_csv()));
    assert!(result.is_err());
    assert!(workflow.snapshot().import.file.is_none());
}

#[test]
fn test_workflow_switch_back_to_export_drops_file() {
    let mut workflow = with_file_schema();
    workflow
        .handle(Action::SetDirection(TransferDirection::DatabaseToFile))
        .unwrap();

    let snapshot = workflow.snapshot();
    assert!(snapshot.import.file.is_none());
    assert!(snapshot.mapping.mapping().is_empty());
    assert!(snapshot.cache.schema_source().is_none());
}
