//! Form definition model
//!
//! Every field that AI output is known to omit is optional here, so a raw
//! response deserialises before it is repaired. Unrecognised keys are kept
//! in `extra` and written back untouched.

use crate::error::DefinitionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Forms engine generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Engine {
    /// Legacy engine (page-to-page `next` links)
    #[serde(alias = "v1")]
    V1,
    /// Current engine
    #[serde(alias = "v2")]
    V2,
}

/// Top-level form definition
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<Engine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_page: Option<String>,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub lists: Vec<List>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FormDefinition {
    /// Parse a definition from JSON text
    ///
    /// # Errors
    /// Returns `DefinitionError::Malformed` if the text is not a definition
    pub fn from_json_str(json: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a definition from a JSON value
    ///
    /// # Errors
    /// Returns `DefinitionError::Malformed` if the value is not a definition
    pub fn from_value(value: Value) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Encode as a JSON value
    ///
    /// # Errors
    /// Returns error if a preserved extra field cannot be encoded
    pub fn to_value(&self) -> Result<Value, DefinitionError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Find a page by path
    #[must_use]
    pub fn page(&self, path: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.path == path)
    }

    /// Iterate every component on every page
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.pages.iter().flat_map(|p| p.components.iter())
    }

    /// Find a condition by id, falling back to display name
    #[must_use]
    pub fn condition(&self, reference: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.id.as_deref() == Some(reference))
            .or_else(|| {
                self.conditions
                    .iter()
                    .find(|c| c.display_name.as_deref() == Some(reference))
            })
    }

    /// Find a list by id or name
    #[must_use]
    pub fn list(&self, reference: &str) -> Option<&List> {
        self.lists
            .iter()
            .find(|l| l.id.as_deref() == Some(reference) || l.name == reference)
    }
}

/// A page of questions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<Next>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Page transition
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Next {
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// A field or content block on a page
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Component {
    /// Content components carry no answer and need no title
    #[must_use]
    pub fn is_content(&self) -> bool {
        matches!(
            self.kind.as_str(),
            "Html" | "Markdown" | "InsetText" | "Details" | "List"
        )
    }
}

/// Selectable list
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub items: Vec<ListItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// List entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ListItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Page grouping
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How the items of a multi-item condition combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coordinator {
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
}

/// Named condition guarding pages or transitions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<Coordinator>,
    #[serde(default)]
    pub items: Vec<ConditionItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One clause of a condition
///
/// Either a field test (`componentId`, `operator`, `value`) or a reference
/// to another condition (`conditionId`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConditionItem {
    /// Whether this clause points at another condition
    #[inline]
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.condition_id.is_some() && self.component_id.is_none()
    }
}

/// Discriminator carried by a canonical condition value envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionValueKind {
    StringValue,
    NumberValue,
    BooleanValue,
    ListItemRef,
    RelativeDate,
}

impl ConditionValueKind {
    /// All kinds
    pub const ALL: [Self; 5] = [
        Self::StringValue,
        Self::NumberValue,
        Self::BooleanValue,
        Self::ListItemRef,
        Self::RelativeDate,
    ];

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StringValue => "StringValue",
            Self::NumberValue => "NumberValue",
            Self::BooleanValue => "BooleanValue",
            Self::ListItemRef => "ListItemRef",
            Self::RelativeDate => "RelativeDate",
        }
    }

    /// Parse a wire name, accepting the loose spellings AI output uses
    #[must_use]
    pub fn parse_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stringvalue" | "string" | "text" => Some(Self::StringValue),
            "numbervalue" | "number" | "numeric" => Some(Self::NumberValue),
            "booleanvalue" | "boolean" | "bool" => Some(Self::BooleanValue),
            "listitemref" | "listitem" => Some(Self::ListItemRef),
            "relativedate" | "date" => Some(Self::RelativeDate),
            _ => None,
        }
    }

    /// Discriminator of an already-enveloped value, if canonical
    #[must_use]
    pub fn of_envelope(value: &Value) -> Option<Self> {
        let name = value.get("type")?.as_str()?;
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}
