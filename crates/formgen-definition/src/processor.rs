//! Response processor
//!
//! Normalises the irregularities AI output is known to contain into the
//! canonical definition shape. Every repair fills in or rewrites a value
//! only when it is missing or non-canonical, and every derived value is a
//! pure function of the definition, so running the processor twice is the
//! same as running it once.

use crate::model::{
    Condition, ConditionItem, ConditionValueKind, Coordinator, Engine, FormDefinition,
};
use crate::DEFAULT_SCHEMA;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

/// Namespace for ids derived during repair
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x8c4f_2b1e_5a7d_4e0f_9b3c_1d2e_6f70_a1b2);

/// Name given to definitions that arrive without one
pub const DEFAULT_FORM_NAME: &str = "Untitled form";

/// What a single repair changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairKind {
    ConditionId,
    ConditionDisplayName,
    CoordinatorAdded,
    CoordinatorRemoved,
    ConditionItemId,
    ReferenceItemCleaned,
    OperatorNormalised,
    ValueEnveloped,
    ConditionReferenceRewritten,
    ComponentReferenceLinked,
    FormName,
    Engine,
    Schema,
    StartPage,
    PagePath,
    PageTitle,
    PageId,
    TransitionPath,
    ComponentId,
    ComponentName,
    ComponentTitle,
    ListId,
    ListName,
    ListTitle,
    ListType,
    ListItemId,
    ListItemValue,
    SectionName,
    SectionTitle,
}

/// One applied repair and where it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    pub kind: RepairKind,
    pub location: String,
}

impl Display for Repair {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {}", self.kind, self.location)
    }
}

/// Repairs applied by one processor pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub repairs: Vec<Repair>,
}

impl RepairSummary {
    /// Nothing was changed
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty()
    }

    /// Number of repairs
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.repairs.len()
    }

    /// Whether no repair was applied
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repairs.is_empty()
    }

    /// Count repairs of one kind
    #[must_use]
    pub fn count(&self, kind: RepairKind) -> usize {
        self.repairs.iter().filter(|r| r.kind == kind).count()
    }

    /// Merge another summary into this one
    pub fn extend(&mut self, other: RepairSummary) {
        self.repairs.extend(other.repairs);
    }

    fn push(&mut self, kind: RepairKind, location: impl Into<String>) {
        self.repairs.push(Repair {
            kind,
            location: location.into(),
        });
    }
}

/// Deterministic repair of raw AI-produced definitions
#[derive(Debug, Clone)]
pub struct ResponseProcessor {
    default_name: String,
}

impl ResponseProcessor {
    /// Create processor with the stock default form name
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_name: DEFAULT_FORM_NAME.to_string(),
        }
    }

    /// Use `name` for definitions that have none
    #[inline]
    #[must_use]
    pub fn with_default_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.default_name = name;
        }
        self
    }

    /// Run `fix_condition_structure` then `ensure_required_fields`
    pub fn process(&self, def: &mut FormDefinition) -> RepairSummary {
        let mut summary = self.fix_condition_structure(def);
        summary.extend(self.ensure_required_fields(def));

        if !summary.is_clean() {
            tracing::debug!(repairs = summary.len(), "repaired form definition");
        }
        summary
    }

    /// Bring every condition into canonical shape
    ///
    /// Fills ids and display names, fixes coordinators, envelopes bare
    /// values, canonicalises operators and rewrites references that use a
    /// condition's display name to use its id.
    pub fn fix_condition_structure(&self, def: &mut FormDefinition) -> RepairSummary {
        let mut summary = RepairSummary::default();

        for (index, condition) in def.conditions.iter_mut().enumerate() {
            fix_condition(index, condition, &mut summary);
        }
        rewrite_condition_references(def, &mut summary);

        summary
    }

    /// Fill every field the forms engine requires
    pub fn ensure_required_fields(&self, def: &mut FormDefinition) -> RepairSummary {
        let mut summary = RepairSummary::default();

        if is_blank(def.name.as_ref()) {
            def.name = Some(self.default_name.clone());
            summary.push(RepairKind::FormName, "name");
        }
        if def.engine.is_none() {
            def.engine = Some(Engine::V2);
            summary.push(RepairKind::Engine, "engine");
        }
        if def.schema.is_none() {
            def.schema = Some(DEFAULT_SCHEMA);
            summary.push(RepairKind::Schema, "schema");
        }

        ensure_pages(def, &mut summary);
        ensure_start_page(def, &mut summary);
        ensure_lists(def, &mut summary);
        ensure_sections(def, &mut summary);
        link_condition_components(def, &mut summary);

        summary
    }
}

impl Default for ResponseProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn fix_condition(index: usize, condition: &mut Condition, summary: &mut RepairSummary) {
    if is_blank(condition.display_name.as_ref()) {
        let name = match condition.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("condition{}", index + 1),
        };
        condition.display_name = Some(name);
        summary.push(RepairKind::ConditionDisplayName, format!("conditions[{index}]"));
    }
    let label = condition.display_name.clone().unwrap_or_default();

    if is_blank(condition.id.as_ref()) {
        condition.id = Some(derive_id("condition", &format!("{index}:{label}")));
        summary.push(RepairKind::ConditionId, format!("condition '{label}'"));
    }
    let condition_id = condition.id.clone().unwrap_or_default();

    for (position, item) in condition.items.iter_mut().enumerate() {
        let location = format!("condition '{label}' item {position}");
        fix_condition_item(&condition_id, position, item, &location, summary);
    }

    match condition.coordinator {
        None if condition.items.len() > 1 => {
            condition.coordinator = Some(Coordinator::And);
            summary.push(RepairKind::CoordinatorAdded, format!("condition '{label}'"));
        }
        Some(_) if condition.items.len() <= 1 => {
            condition.coordinator = None;
            summary.push(RepairKind::CoordinatorRemoved, format!("condition '{label}'"));
        }
        _ => {}
    }
}

fn fix_condition_item(
    condition_id: &str,
    position: usize,
    item: &mut ConditionItem,
    location: &str,
    summary: &mut RepairSummary,
) {
    if is_blank(item.id.as_ref()) {
        item.id = Some(derive_id("condition-item", &format!("{condition_id}:{position}")));
        summary.push(RepairKind::ConditionItemId, location);
    }

    if item.is_reference() {
        if item.operator.is_some() || item.value.is_some() {
            item.operator = None;
            item.value = None;
            summary.push(RepairKind::ReferenceItemCleaned, location);
        }
        return;
    }

    // A clause naming both a component and a condition is a field test.
    if item.component_id.is_some() && item.condition_id.is_some() {
        item.condition_id = None;
        summary.push(RepairKind::ReferenceItemCleaned, location);
    }

    if let Some(operator) = item.operator.as_deref() {
        let canonical = canonical_operator(operator);
        if canonical != operator {
            item.operator = Some(canonical);
            summary.push(RepairKind::OperatorNormalised, location);
        }
    }

    if let Some(value) = item.value.take() {
        let (value, changed) = envelope_value(value);
        item.value = Some(value);
        if changed {
            summary.push(RepairKind::ValueEnveloped, location);
        }
    }
}

fn canonical_operator(operator: &str) -> String {
    let trimmed = operator.trim();
    let canonical = match trimmed.to_ascii_lowercase().as_str() {
        "==" | "=" | "eq" | "equals" | "is" => "is",
        "!=" | "<>" | "ne" | "not equals" | "is not" => "is not",
        ">" | "gt" | "greater than" | "is more than" => "is more than",
        "<" | "lt" | "less than" | "is less than" => "is less than",
        ">=" | "gte" | "is at least" => "is at least",
        "<=" | "lte" | "is at most" => "is at most",
        _ => return trimmed.to_string(),
    };
    canonical.to_string()
}

/// Wrap a condition value into `{type, value}` form
fn envelope_value(value: Value) -> (Value, bool) {
    match value {
        Value::String(s) => (envelope(ConditionValueKind::StringValue, Value::String(s)), true),
        Value::Number(n) => (envelope(ConditionValueKind::NumberValue, Value::Number(n)), true),
        Value::Bool(b) => (envelope(ConditionValueKind::BooleanValue, Value::Bool(b)), true),
        Value::Object(mut map) => {
            let declared = map.get("type").and_then(Value::as_str).map(str::to_string);
            let changed = match declared {
                Some(declared) => match ConditionValueKind::parse_loose(&declared) {
                    Some(kind) if kind.as_str() != declared => {
                        map.insert("type".to_string(), kind.as_str().into());
                        true
                    }
                    _ => false,
                },
                None => match infer_kind(&map) {
                    Some(kind) => {
                        map.insert("type".to_string(), kind.as_str().into());
                        true
                    }
                    None => false,
                },
            };
            (Value::Object(map), changed)
        }
        other => (other, false),
    }
}

fn envelope(kind: ConditionValueKind, value: Value) -> Value {
    json!({ "type": kind.as_str(), "value": value })
}

fn infer_kind(map: &Map<String, Value>) -> Option<ConditionValueKind> {
    if map.contains_key("itemId") && map.contains_key("listId") {
        return Some(ConditionValueKind::ListItemRef);
    }
    if ["period", "unit", "direction"].iter().all(|k| map.contains_key(*k)) {
        return Some(ConditionValueKind::RelativeDate);
    }
    match map.get("value")? {
        Value::String(_) => Some(ConditionValueKind::StringValue),
        Value::Number(_) => Some(ConditionValueKind::NumberValue),
        Value::Bool(_) => Some(ConditionValueKind::BooleanValue),
        _ => None,
    }
}

/// Rewrite page, transition and nested references from display name to id
fn rewrite_condition_references(def: &mut FormDefinition, summary: &mut RepairSummary) {
    let ids: HashSet<String> = def.conditions.iter().filter_map(|c| c.id.clone()).collect();
    let by_name: HashMap<String, String> = def
        .conditions
        .iter()
        .filter_map(|c| Some((c.display_name.clone()?, c.id.clone()?)))
        .collect();

    let rewrite = |reference: &mut Option<String>, location: String, summary: &mut RepairSummary| {
        let Some(current) = reference.as_deref() else {
            return;
        };
        if ids.contains(current) {
            return;
        }
        if let Some(id) = by_name.get(current) {
            *reference = Some(id.clone());
            summary.push(RepairKind::ConditionReferenceRewritten, location);
        }
    };

    for page in &mut def.pages {
        rewrite(&mut page.condition, format!("page '{}'", page.path), summary);
        for next in &mut page.next {
            rewrite(
                &mut next.condition,
                format!("page '{}' next '{}'", page.path, next.path),
                summary,
            );
        }
    }
    for condition in &mut def.conditions {
        let label = condition.display_name.clone().unwrap_or_default();
        for item in condition.items.iter_mut().filter(|i| i.is_reference()) {
            rewrite(
                &mut item.condition_id,
                format!("condition '{label}'"),
                summary,
            );
        }
    }
}

fn ensure_pages(def: &mut FormDefinition, summary: &mut RepairSummary) {
    for (index, page) in def.pages.iter_mut().enumerate() {
        let normalised = normalise_path(&page.path)
            .or_else(|| normalise_path(&page.title))
            .unwrap_or_else(|| format!("/page-{}", index + 1));
        if normalised != page.path {
            summary.push(RepairKind::PagePath, format!("pages[{index}] '{}'", page.path));
            page.path = normalised;
        }

        if page.title.trim().is_empty() {
            page.title = humanise_path(&page.path);
            summary.push(RepairKind::PageTitle, format!("page '{}'", page.path));
        }
        if is_blank(page.id.as_ref()) {
            page.id = Some(derive_id("page", &page.path));
            summary.push(RepairKind::PageId, format!("page '{}'", page.path));
        }

        for next in &mut page.next {
            if let Some(target) = normalise_path(&next.path) {
                if target != next.path {
                    summary.push(
                        RepairKind::TransitionPath,
                        format!("page '{}' next '{}'", page.path, next.path),
                    );
                    next.path = target;
                }
            }
        }

        for (position, component) in page.components.iter_mut().enumerate() {
            let location = format!("page '{}' component {position}", page.path);
            if is_blank(component.id.as_ref()) {
                component.id = Some(derive_id("component", &format!("{}:{position}", page.path)));
                summary.push(RepairKind::ComponentId, location.clone());
            }
            if is_blank(component.name.as_ref()) {
                let compact: String = component
                    .id
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .take(8)
                    .collect();
                component.name = Some(format!("f{compact}"));
                summary.push(RepairKind::ComponentName, location.clone());
            }
            if !component.is_content() && is_blank(component.title.as_ref()) {
                component.title = Some(format!("Question {}", position + 1));
                summary.push(RepairKind::ComponentTitle, location);
            }
        }
    }
}

fn ensure_start_page(def: &mut FormDefinition, summary: &mut RepairSummary) {
    let normalised = def.start_page.as_deref().and_then(normalise_path);
    let target = normalised.or_else(|| def.pages.first().map(|p| p.path.clone()));
    if target != def.start_page {
        def.start_page = target;
        summary.push(RepairKind::StartPage, "startPage");
    }
}

fn ensure_lists(def: &mut FormDefinition, summary: &mut RepairSummary) {
    for (index, list) in def.lists.iter_mut().enumerate() {
        if list.name.trim().is_empty() {
            list.name = format!("list{}", index + 1);
            summary.push(RepairKind::ListName, format!("lists[{index}]"));
        }
        if is_blank(list.id.as_ref()) {
            list.id = Some(derive_id("list", &format!("{index}:{}", list.name)));
            summary.push(RepairKind::ListId, format!("list '{}'", list.name));
        }
        if list.title.trim().is_empty() {
            list.title = list.name.clone();
            summary.push(RepairKind::ListTitle, format!("list '{}'", list.name));
        }
        if list.kind.trim().is_empty() {
            list.kind = "string".to_string();
            summary.push(RepairKind::ListType, format!("list '{}'", list.name));
        }

        let list_id = list.id.clone().unwrap_or_default();
        for (position, item) in list.items.iter_mut().enumerate() {
            let location = format!("list '{}' item {position}", list.name);
            if is_blank(item.id.as_ref()) {
                item.id = Some(derive_id("list-item", &format!("{list_id}:{position}")));
                summary.push(RepairKind::ListItemId, location.clone());
            }
            if item.value.is_none() {
                item.value = Some(Value::String(item.text.clone()));
                summary.push(RepairKind::ListItemValue, location);
            }
        }
    }
}

fn ensure_sections(def: &mut FormDefinition, summary: &mut RepairSummary) {
    for (index, section) in def.sections.iter_mut().enumerate() {
        if section.name.trim().is_empty() {
            section.name = format!("section{}", index + 1);
            summary.push(RepairKind::SectionName, format!("sections[{index}]"));
        }
        if section.title.trim().is_empty() {
            section.title = section.name.clone();
            summary.push(RepairKind::SectionTitle, format!("section '{}'", section.name));
        }
    }
}

/// Point condition clauses that name a component at the component's id
fn link_condition_components(def: &mut FormDefinition, summary: &mut RepairSummary) {
    let ids: HashSet<String> = def.components().filter_map(|c| c.id.clone()).collect();
    let by_name: HashMap<String, String> = def
        .components()
        .filter_map(|c| Some((c.name.clone()?, c.id.clone()?)))
        .collect();

    for condition in &mut def.conditions {
        let label = condition.display_name.clone().unwrap_or_default();
        for item in &mut condition.items {
            let Some(current) = item.component_id.as_deref() else {
                continue;
            };
            if ids.contains(current) {
                continue;
            }
            if let Some(id) = by_name.get(current) {
                item.component_id = Some(id.clone());
                summary.push(RepairKind::ComponentReferenceLinked, format!("condition '{label}'"));
            }
        }
    }
}

fn is_blank(value: Option<&String>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}

fn derive_id(kind: &str, seed: &str) -> String {
    Uuid::new_v5(&ID_NAMESPACE, format!("{kind}:{seed}").as_bytes()).to_string()
}

/// Canonical page path: lowercase slug segments behind a single `/`
pub(crate) fn normalise_path(raw: &str) -> Option<String> {
    let segments: Vec<String> = raw
        .split('/')
        .map(slugify)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(format!("/{}", segments.join("/")))
    }
}

fn slugify(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut pending_dash = false;
    for c in segment.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash {
                out.push('-');
                pending_dash = false;
            }
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() {
            pending_dash = true;
        }
    }
    out
}

fn humanise_path(path: &str) -> String {
    let last = path.rsplit('/').next().unwrap_or(path).replace('-', " ");
    let mut chars = last.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw() -> FormDefinition {
        FormDefinition::from_json_str(
            r#"{
                "pages": [
                    {"path": "Applicant Details", "title": "", "components": [
                        {"type": "YesNoField", "name": "overEighteen", "title": "Are you over 18?"},
                        {"type": "Html", "options": {"content": "<p>hi</p>"}}
                    ], "next": [{"path": "/Summary", "condition": "isAdult"}]},
                    {"path": "/summary", "title": "Summary", "components": []}
                ],
                "conditions": [
                    {"name": "isAdult", "items": [
                        {"componentId": "overEighteen", "operator": "==", "value": true}
                    ], "coordinator": "and"},
                    {"items": [
                        {"conditionId": "isAdult", "operator": "is", "value": "x"},
                        {"componentId": "overEighteen", "operator": "is", "value": {"value": false}}
                    ]}
                ],
                "lists": [{"title": "Colours", "items": [{"text": "Red"}]}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn fills_top_level_fields() {
        let mut def = raw();
        ResponseProcessor::new().process(&mut def);

        assert_eq!(def.name.as_deref(), Some(DEFAULT_FORM_NAME));
        assert_eq!(def.engine, Some(Engine::V2));
        assert_eq!(def.schema, Some(DEFAULT_SCHEMA));
        assert_eq!(def.start_page.as_deref(), Some("/applicant-details"));
    }

    #[test]
    fn default_name_override() {
        let mut def = raw();
        ResponseProcessor::new()
            .with_default_name("Fishing licence")
            .process(&mut def);
        assert_eq!(def.name.as_deref(), Some("Fishing licence"));
    }

    #[test]
    fn normalises_paths_and_transitions() {
        let mut def = raw();
        ResponseProcessor::new().process(&mut def);

        assert_eq!(def.pages[0].path, "/applicant-details");
        assert_eq!(def.pages[0].title, "Applicant details");
        assert_eq!(def.pages[0].next[0].path, "/summary");
    }

    #[test]
    fn envelopes_values_and_canonicalises_operators() {
        let mut def = raw();
        ResponseProcessor::new().fix_condition_structure(&mut def);

        let item = &def.conditions[0].items[0];
        assert_eq!(item.operator.as_deref(), Some("is"));
        assert_eq!(
            item.value,
            Some(json!({"type": "BooleanValue", "value": true}))
        );

        let inferred = &def.conditions[1].items[1];
        assert_eq!(
            inferred.value,
            Some(json!({"type": "BooleanValue", "value": false}))
        );
    }

    #[test]
    fn fixes_coordinators() {
        let mut def = raw();
        ResponseProcessor::new().fix_condition_structure(&mut def);

        assert_eq!(def.conditions[0].coordinator, None);
        assert_eq!(def.conditions[1].coordinator, Some(Coordinator::And));
    }

    #[test]
    fn cleans_reference_items_and_rewrites_names_to_ids() {
        let mut def = raw();
        ResponseProcessor::new().fix_condition_structure(&mut def);

        let adult_id = def.conditions[0].id.clone().unwrap();
        let reference = &def.conditions[1].items[0];
        assert_eq!(reference.condition_id.as_deref(), Some(adult_id.as_str()));
        assert_eq!(reference.operator, None);
        assert_eq!(reference.value, None);
        assert_eq!(def.pages[0].next[0].condition.as_deref(), Some(adult_id.as_str()));
        assert_eq!(def.conditions[1].display_name.as_deref(), Some("condition2"));
    }

    #[test]
    fn links_component_names_to_ids() {
        let mut def = raw();
        ResponseProcessor::new().process(&mut def);

        let component_id = def.pages[0].components[0].id.clone().unwrap();
        assert_eq!(
            def.conditions[0].items[0].component_id.as_deref(),
            Some(component_id.as_str())
        );
    }

    #[test]
    fn content_components_keep_missing_title() {
        let mut def = raw();
        ResponseProcessor::new().process(&mut def);

        let html = &def.pages[0].components[1];
        assert!(html.title.is_none());
        assert!(html.name.as_deref().is_some_and(|n| n.starts_with('f')));
    }

    #[test]
    fn fills_lists() {
        let mut def = raw();
        ResponseProcessor::new().process(&mut def);

        let list = &def.lists[0];
        assert_eq!(list.name, "list1");
        assert_eq!(list.kind, "string");
        assert_eq!(list.items[0].value, Some(json!("Red")));
        assert!(list.items[0].id.is_some());
    }

    #[test]
    fn second_pass_is_clean() {
        let processor = ResponseProcessor::new();
        let mut def = raw();
        let first = processor.process(&mut def);
        assert!(!first.is_clean());

        let snapshot = def.clone();
        let second = processor.process(&mut def);
        assert!(second.is_clean(), "unexpected repairs: {:?}", second.repairs);
        assert_eq!(def, snapshot);
    }

    #[test]
    fn derived_ids_are_deterministic() {
        let mut a = raw();
        let mut b = raw();
        ResponseProcessor::new().process(&mut a);
        ResponseProcessor::new().process(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn operator_canonical_forms_are_fixed_points() {
        for op in ["is", "is not", "is more than", "is less than", "is at least", "is at most"] {
            assert_eq!(canonical_operator(op), op);
        }
        assert_eq!(canonical_operator(" contains "), "contains");
    }

    #[test]
    fn path_normalisation() {
        assert_eq!(normalise_path("//Your  Name//"), Some("/your-name".to_string()));
        assert_eq!(normalise_path("a/B_c"), Some("/a/b-c".to_string()));
        assert_eq!(normalise_path("  "), None);
        let once = normalise_path("What's your DOB?").unwrap();
        assert_eq!(normalise_path(&once), Some(once.clone()));
    }

    #[test]
    fn loose_type_names_are_canonicalised() {
        let (value, changed) = envelope_value(json!({"type": "string", "value": "a"}));
        assert!(changed);
        assert_eq!(value["type"], "StringValue");

        let (value, changed) = envelope_value(json!({"period": 3, "unit": "days", "direction": "past"}));
        assert!(changed);
        assert_eq!(value["type"], "RelativeDate");

        let (_, changed) = envelope_value(json!({"type": "Custom"}));
        assert!(!changed);
    }
}
