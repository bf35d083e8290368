//! Property tests for the response processor.
//!
//! Definitions are generated in the messy shapes AI output arrives in:
//! optional ids, unslugged paths, bare condition values, loose operators
//! and coordinators that disagree with the item count.

use formgen_definition::{
    Component, Condition, ConditionItem, Coordinator, FormDefinition, FormIntegrityValidator,
    List, ListItem, Next, Page, ResponseProcessor,
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn opt_text() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        "[A-Za-z ]{1,10}".prop_map(Some),
    ]
}

fn path() -> impl Strategy<Value = String> {
    "[A-Za-z _/?-]{0,14}"
}

fn condition_value() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        "[a-z]{1,6}".prop_map(|s| Some(json!(s))),
        any::<i32>().prop_map(|n| Some(json!(n))),
        any::<bool>().prop_map(|b| Some(json!(b))),
        any::<bool>().prop_map(|b| Some(json!({ "value": b }))),
        Just(Some(json!({"type": "number", "value": 4}))),
        Just(Some(json!({"itemId": "a", "listId": "b"}))),
    ]
}

fn operator() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("==".to_string())),
        Just(Some(" is ".to_string())),
        Just(Some("!=".to_string())),
        Just(Some(">".to_string())),
        Just(Some("contains".to_string())),
    ]
}

fn condition_item() -> impl Strategy<Value = ConditionItem> {
    (opt_text(), opt_text(), operator(), condition_value(), opt_text()).prop_map(
        |(id, component_id, operator, value, condition_id)| ConditionItem {
            id,
            component_id,
            operator,
            value,
            condition_id,
            ..ConditionItem::default()
        },
    )
}

fn condition() -> impl Strategy<Value = Condition> {
    (
        opt_text(),
        opt_text(),
        prop_oneof![Just(None), Just(Some(Coordinator::And)), Just(Some(Coordinator::Or))],
        prop::collection::vec(condition_item(), 0..4),
    )
        .prop_map(|(id, display_name, coordinator, items)| Condition {
            id,
            display_name,
            coordinator,
            items,
            ..Condition::default()
        })
}

fn component() -> impl Strategy<Value = Component> {
    (
        opt_text(),
        prop_oneof![Just("TextField"), Just("Html"), Just("YesNoField")],
        opt_text(),
        opt_text(),
    )
        .prop_map(|(id, kind, name, title)| Component {
            id,
            kind: kind.to_string(),
            name,
            title,
            ..Component::default()
        })
}

fn page() -> impl Strategy<Value = Page> {
    (
        opt_text(),
        path(),
        "[A-Za-z ]{0,8}",
        prop::collection::vec(component(), 0..3),
        prop::collection::vec((path(), opt_text()), 0..2),
        opt_text(),
    )
        .prop_map(|(id, path, title, components, next, condition)| Page {
            id,
            path,
            title,
            components,
            next: next
                .into_iter()
                .map(|(path, condition)| Next { path, condition })
                .collect(),
            condition,
            ..Page::default()
        })
}

fn list() -> impl Strategy<Value = List> {
    (
        opt_text(),
        "[a-z]{0,6}",
        prop::collection::vec(("[A-Za-z]{0,6}", any::<bool>()), 0..3),
    )
        .prop_map(|(id, name, items)| List {
            id,
            name,
            items: items
                .into_iter()
                .map(|(text, with_value)| ListItem {
                    value: with_value.then(|| json!(text.to_lowercase())),
                    text,
                    ..ListItem::default()
                })
                .collect(),
            ..List::default()
        })
}

fn definition() -> impl Strategy<Value = FormDefinition> {
    (
        opt_text(),
        prop::option::of(path()),
        prop::collection::vec(page(), 0..4),
        prop::collection::vec(condition(), 0..4),
        prop::collection::vec(list(), 0..2),
    )
        .prop_map(|(name, start_page, pages, conditions, lists)| FormDefinition {
            name,
            start_page,
            pages,
            conditions,
            lists,
            ..FormDefinition::default()
        })
}

proptest! {
    #[test]
    fn processing_is_idempotent(mut def in definition()) {
        let processor = ResponseProcessor::new();
        processor.process(&mut def);
        let once = def.clone();

        let second = processor.process(&mut def);
        prop_assert!(second.is_clean(), "second pass repaired: {:?}", second.repairs);
        prop_assert_eq!(def, once);
    }

    #[test]
    fn each_step_is_idempotent(mut def in definition()) {
        let processor = ResponseProcessor::new();

        processor.fix_condition_structure(&mut def);
        let fixed = def.clone();
        processor.fix_condition_structure(&mut def);
        prop_assert_eq!(&def, &fixed);

        processor.ensure_required_fields(&mut def);
        let ensured = def.clone();
        processor.ensure_required_fields(&mut def);
        prop_assert_eq!(&def, &ensured);
    }

    #[test]
    fn validator_never_panics(def in definition()) {
        let report = FormIntegrityValidator::new().validate_form_integrity(&def);
        prop_assert_eq!(report.is_valid, report.errors.is_empty());
    }

    #[test]
    fn processed_definitions_have_required_fields(mut def in definition()) {
        ResponseProcessor::new().process(&mut def);
        prop_assert!(def.name.is_some());
        prop_assert!(def.engine.is_some());
        prop_assert!(def.schema.is_some());
        prop_assert!(def.pages.iter().all(|p| p.path.starts_with('/') && p.id.is_some()));
    }
}
