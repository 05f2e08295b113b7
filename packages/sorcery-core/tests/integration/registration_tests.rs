//! Type and field registration rules.

use sorcery_core::fields::FieldKind;
use sorcery_core::{lens, ApplyResult, FieldSpec, SorceryError, TypeSpec};

use super::helpers::{widget_sorcery, Gizmo, Widget};

#[test]
fn test_duplicate_type_registration_is_refused() {
    let sorcery = widget_sorcery("registration_dup");
    let err = sorcery
        .register_type(TypeSpec::<Widget>::with_default("widget"))
        .unwrap_err();
    assert!(matches!(err, SorceryError::TypeAlreadyRegistered { .. }));
    // the original registration still works
    assert!(sorcery.is_field_registered("widget", "count"));
}

#[test]
fn test_field_on_unregistered_type_is_refused() {
    let sorcery = widget_sorcery("registration_unknown");
    let err = sorcery
        .register_field("sprocket", FieldSpec::new("size", FieldKind::uint(lens!(Gizmo, size))))
        .unwrap_err();
    assert!(matches!(err, SorceryError::TypeNotRegistered { .. }));
}

#[test]
fn test_mapping_unregistered_type_is_refused() {
    let sorcery = widget_sorcery("registration_mapping");
    assert!(matches!(
        sorcery.apply_default("sprocket", "memory", ""),
        Err(SorceryError::TypeNotRegistered { .. })
    ));
    assert!(matches!(
        sorcery.apply_mapping("sprocket", "memory", "", false),
        Err(SorceryError::TypeNotRegistered { .. })
    ));
    assert_eq!(
        sorcery.apply_default("gizmo", "memory", "").unwrap(),
        ApplyResult::Success
    );
}

#[test]
fn test_reserved_duplicate_and_invalid_fields_are_refused() {
    let sorcery = widget_sorcery("registration_fields");

    let id = sorcery.register_field("gizmo", FieldSpec::new("id", FieldKind::uint(lens!(Gizmo, size))));
    assert!(matches!(id, Err(SorceryError::FieldRegistration { .. })));

    let dup = sorcery.register_field("gizmo", FieldSpec::new("size", FieldKind::uint(lens!(Gizmo, size))));
    assert!(matches!(dup, Err(SorceryError::FieldRegistration { .. })));

    let bad_default = sorcery.register_field(
        "gizmo",
        FieldSpec::new("weight", FieldKind::uint(lens!(Gizmo, size))).default_value("heavy"),
    );
    assert!(matches!(bad_default, Err(SorceryError::FieldRegistration { .. })));
    assert!(!sorcery.is_field_registered("gizmo", "weight"));

    let bad_range = sorcery.register_field(
        "gizmo",
        FieldSpec::new("depth", FieldKind::uint_range(lens!(Gizmo, size), 10, 1)),
    );
    assert!(matches!(bad_range, Err(SorceryError::FieldRegistration { .. })));
}

#[test]
fn test_field_for_wrong_rust_type_is_refused() {
    let sorcery = widget_sorcery("registration_rust_type");
    let err = sorcery
        .register_field("widget", FieldSpec::new("size", FieldKind::uint(lens!(Gizmo, size))))
        .unwrap_err();
    assert!(matches!(err, SorceryError::TypeMismatch { .. }));
}

#[test]
fn test_is_field_registered_covers_exact_regex_and_extended() {
    let sorcery = widget_sorcery("registration_lookup");
    assert!(sorcery.is_field_registered("widget", "count"));
    assert!(sorcery.is_field_registered("widget", "x-color"));
    assert!(sorcery.is_field_registered("widget", "@anything"));
    assert!(!sorcery.is_field_registered("widget", "colour"));
    assert!(!sorcery.is_field_registered("sprocket", "count"));
}

#[test]
fn test_type_listing_skips_hidden_types() {
    let sorcery = widget_sorcery("registration_hidden");
    sorcery
        .register_type(TypeSpec::<Gizmo>::with_default("secret").hidden())
        .unwrap();
    assert_eq!(sorcery.type_names(false), vec!["gizmo", "widget"]);
    assert_eq!(sorcery.type_names(true), vec!["gizmo", "secret", "widget"]);
}
