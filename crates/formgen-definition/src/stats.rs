//! Summary counts shown alongside a definition under review

use crate::model::FormDefinition;
use serde::{Deserialize, Serialize};

/// Page, component, condition and list counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormStats {
    pub page_count: usize,
    pub component_count: usize,
    pub condition_count: usize,
    pub list_count: usize,
}

impl FormStats {
    /// Count a definition
    #[must_use]
    pub fn of(def: &FormDefinition) -> Self {
        Self {
            page_count: def.pages.len(),
            component_count: def.components().count(),
            condition_count: def.conditions.len(),
            list_count: def.lists.len(),
        }
    }
}
