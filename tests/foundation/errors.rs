//! Integration tests for error construction and display

use wsmodel_foundation::{EntityId, EntityKind, Error, ErrorContext, ErrorKind, ModuleId, SymbolicId};

#[test]
fn duplicate_symbolic_id_names_the_existing_entity() {
    let existing = EntityId::new(EntityKind::Module, 2, 1);
    let err = Error::duplicate_symbolic_id(SymbolicId::Module(ModuleId::new("app")), existing);
    assert!(matches!(
        err.kind,
        ErrorKind::DuplicateSymbolicId { existing: e, .. } if e == existing
    ));
    assert!(err.to_string().contains("app"));
}

#[test]
fn context_is_attached() {
    let err = Error::inconsistent("child listed twice").with_context(
        ErrorContext::new()
            .with_description("Sync project")
            .with_version(7),
    );
    let context = err.context.as_ref().unwrap();
    assert_eq!(context.description.as_deref(), Some("Sync project"));
    assert_eq!(context.version, Some(7));
    assert!(matches!(err.kind, ErrorKind::InconsistentStorage(_)));
}

#[test]
fn reentrant_update_message_names_both_updates() {
    let err = Error::new(ErrorKind::ReentrantUpdate {
        description: "inner".to_string(),
        in_flight: "outer".to_string(),
        version: 3,
    });
    let message = err.to_string();
    assert!(message.contains("inner"));
    assert!(message.contains("outer"));
    assert!(message.contains('3'));
}
