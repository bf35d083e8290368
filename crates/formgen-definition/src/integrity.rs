//! Structural validation of form definitions
//!
//! The validator inspects a definition and reports every problem it finds.
//! It never fails and never panics; the caller decides what an invalid
//! report means.

use crate::model::{ConditionValueKind, FormDefinition};
use std::collections::HashSet;

/// A structural problem found in a definition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    /// Required top-level field absent
    #[error("form definition is missing required field '{0}'")]
    MissingField(&'static str),

    /// Page without a path
    #[error("page {0} has no path")]
    MissingPagePath(usize),

    /// Two pages share a path
    #[error("duplicate page path '{0}'")]
    DuplicatePagePath(String),

    /// `startPage` names no page
    #[error("start page '{0}' does not match any page")]
    UnknownStartPage(String),

    /// Transition to a page that does not exist
    #[error("page '{page}' links to unknown page '{target}'")]
    UnknownTransitionTarget { page: String, target: String },

    /// Page or transition guarded by an undefined condition
    #[error("page '{page}' references unknown condition '{condition}'")]
    UnknownPageCondition { page: String, condition: String },

    /// Condition with no clauses
    #[error("condition '{0}' has no items")]
    EmptyCondition(String),

    /// Multi-clause condition without `and`/`or`
    #[error("condition '{0}' has several items but no coordinator")]
    MissingCoordinator(String),

    /// Clause naming a component that does not exist
    #[error("condition '{condition}' references unknown component '{component}'")]
    UnknownConditionComponent { condition: String, component: String },

    /// Clause naming a condition that does not exist
    #[error("condition '{condition}' references unknown condition '{reference}'")]
    UnknownConditionReference { condition: String, reference: String },

    /// Clause lacking a component, operator or typed value
    #[error("condition '{condition}' item {index} is missing {what}")]
    IncompleteConditionItem {
        condition: String,
        index: usize,
        what: &'static str,
    },

    /// Component bound to an undefined list
    #[error("component '{component}' on page '{page}' references unknown list '{list}'")]
    UnknownList {
        page: String,
        component: String,
        list: String,
    },
}

/// Outcome of validating a definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub errors: Vec<IntegrityError>,
}

impl IntegrityReport {
    fn from_errors(errors: Vec<IntegrityError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Error messages joined for display
    #[must_use]
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Structural validator
#[derive(Debug, Clone, Copy, Default)]
pub struct FormIntegrityValidator;

impl FormIntegrityValidator {
    /// Create new validator instance
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate a definition
    ///
    /// Checks required top-level fields, page path uniqueness, start page
    /// and transition targets, condition references from pages and
    /// transitions, condition clause completeness, and list references.
    #[must_use]
    pub fn validate_form_integrity(&self, def: &FormDefinition) -> IntegrityReport {
        let mut errors = Vec::new();

        check_required_fields(def, &mut errors);
        let paths = check_pages(def, &mut errors);
        check_transitions(def, &paths, &mut errors);
        check_conditions(def, &mut errors);
        check_lists(def, &mut errors);

        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "form definition failed integrity checks");
        }
        IntegrityReport::from_errors(errors)
    }
}

/// Validate with the default validator
#[must_use]
pub fn validate_form_integrity(def: &FormDefinition) -> IntegrityReport {
    FormIntegrityValidator::new().validate_form_integrity(def)
}

fn check_required_fields(def: &FormDefinition, errors: &mut Vec<IntegrityError>) {
    if def.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        errors.push(IntegrityError::MissingField("name"));
    }
    if def.engine.is_none() {
        errors.push(IntegrityError::MissingField("engine"));
    }
    if def.schema.is_none() {
        errors.push(IntegrityError::MissingField("schema"));
    }
    if def.pages.is_empty() {
        errors.push(IntegrityError::MissingField("pages"));
    }
}

fn check_pages<'a>(def: &'a FormDefinition, errors: &mut Vec<IntegrityError>) -> HashSet<&'a str> {
    let mut paths = HashSet::new();
    for (index, page) in def.pages.iter().enumerate() {
        if page.path.trim().is_empty() {
            errors.push(IntegrityError::MissingPagePath(index));
            continue;
        }
        if !paths.insert(page.path.as_str()) {
            errors.push(IntegrityError::DuplicatePagePath(page.path.clone()));
        }
    }

    if let Some(start) = def.start_page.as_deref() {
        if !paths.contains(start) {
            errors.push(IntegrityError::UnknownStartPage(start.to_string()));
        }
    }
    paths
}

fn check_transitions(def: &FormDefinition, paths: &HashSet<&str>, errors: &mut Vec<IntegrityError>) {
    for page in &def.pages {
        if let Some(condition) = page.condition.as_deref() {
            if def.condition(condition).is_none() {
                errors.push(IntegrityError::UnknownPageCondition {
                    page: page.path.clone(),
                    condition: condition.to_string(),
                });
            }
        }

        for next in &page.next {
            if !paths.contains(next.path.as_str()) {
                errors.push(IntegrityError::UnknownTransitionTarget {
                    page: page.path.clone(),
                    target: next.path.clone(),
                });
            }
            if let Some(condition) = next.condition.as_deref() {
                if def.condition(condition).is_none() {
                    errors.push(IntegrityError::UnknownPageCondition {
                        page: page.path.clone(),
                        condition: condition.to_string(),
                    });
                }
            }
        }
    }
}

fn check_conditions(def: &FormDefinition, errors: &mut Vec<IntegrityError>) {
    let component_ids: HashSet<&str> = def.components().filter_map(|c| c.id.as_deref()).collect();

    for (index, condition) in def.conditions.iter().enumerate() {
        let label = condition
            .display_name
            .clone()
            .or_else(|| condition.id.clone())
            .unwrap_or_else(|| format!("#{index}"));

        if condition.items.is_empty() {
            errors.push(IntegrityError::EmptyCondition(label));
            continue;
        }
        if condition.items.len() > 1 && condition.coordinator.is_none() {
            errors.push(IntegrityError::MissingCoordinator(label.clone()));
        }

        for (position, item) in condition.items.iter().enumerate() {
            if let Some(reference) = item.condition_id.as_deref().filter(|_| item.is_reference()) {
                if def.condition(reference).is_none() {
                    errors.push(IntegrityError::UnknownConditionReference {
                        condition: label.clone(),
                        reference: reference.to_string(),
                    });
                }
                continue;
            }

            let incomplete = |what| IntegrityError::IncompleteConditionItem {
                condition: label.clone(),
                index: position,
                what,
            };
            match item.component_id.as_deref() {
                None => errors.push(incomplete("a component or condition reference")),
                Some(component) if !component_ids.contains(component) => {
                    errors.push(IntegrityError::UnknownConditionComponent {
                        condition: label.clone(),
                        component: component.to_string(),
                    });
                }
                Some(_) => {}
            }
            if item.operator.as_deref().map_or(true, |o| o.trim().is_empty()) {
                errors.push(incomplete("an operator"));
            }
            if item
                .value
                .as_ref()
                .and_then(ConditionValueKind::of_envelope)
                .is_none()
            {
                errors.push(incomplete("a typed value"));
            }
        }
    }
}

fn check_lists(def: &FormDefinition, errors: &mut Vec<IntegrityError>) {
    for page in &def.pages {
        for component in &page.components {
            if let Some(list) = component.list.as_deref() {
                if def.list(list).is_none() {
                    errors.push(IntegrityError::UnknownList {
                        page: page.path.clone(),
                        component: component
                            .name
                            .clone()
                            .or_else(|| component.id.clone())
                            .unwrap_or_default(),
                        list: list.to_string(),
                    });
                }
            }
        }
    }
}
