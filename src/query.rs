//! Query specification: condition trees, sorting, and the pagination cursor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    IsNull,
    IsNotNull,
    Exists,
    NotExists,
    BeginsWith,
}

impl std::str::FromStr for Comparator {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let comparator = match s {
            "Equals" | "=" | "==" => Comparator::Equals,
            "NotEquals" | "!=" => Comparator::NotEquals,
            "GreaterThan" | ">" => Comparator::GreaterThan,
            "GreaterThanOrEqual" | ">=" => Comparator::GreaterThanOrEqual,
            "LessThan" | "<" => Comparator::LessThan,
            "LessThanOrEqual" | "<=" => Comparator::LessThanOrEqual,
            "Contains" => Comparator::Contains,
            "NotContains" => Comparator::NotContains,
            "IsNull" => Comparator::IsNull,
            "IsNotNull" => Comparator::IsNotNull,
            "Exists" => Comparator::Exists,
            "NotExists" => Comparator::NotExists,
            "BeginsWith" => Comparator::BeginsWith,
            other => {
                return Err(ApiError::InvalidRequest(format!(
                    "Unknown comparator: {}",
                    other
                )))
            }
        };
        Ok(comparator)
    }
}

/// Single `field <comparator> value` predicate. `field` may use dot notation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub comparator: Comparator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, comparator: Comparator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            comparator,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub operator: ConditionOperator,
    pub conditions: Vec<ConditionType>,
}

/// Either a leaf condition or a boolean group of nested conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionType {
    Group(ConditionGroup),
    Condition(Condition),
}

impl ConditionType {
    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ConditionType::Condition(c) => out.push(c.field.as_str()),
            ConditionType::Group(g) => {
                for child in &g.conditions {
                    child.collect_fields(out);
                }
            }
        }
    }
}

impl From<Condition> for ConditionType {
    fn from(c: Condition) -> Self {
        ConditionType::Condition(c)
    }
}

impl From<ConditionGroup> for ConditionType {
    fn from(g: ConditionGroup) -> Self {
        ConditionType::Group(g)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl std::str::FromStr for SortDirection {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascending" | "asc" => Ok(SortDirection::Ascending),
            "descending" | "desc" => Ok(SortDirection::Descending),
            other => Err(ApiError::InvalidRequest(format!(
                "Unknown sort direction: {} (expected ascending or descending)",
                other
            ))),
        }
    }
}

/// Query over records of one kind. `after` is advanced by the pagination loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpecification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_direction: Option<SortDirection>,
}

impl QuerySpecification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, condition: impl Into<ConditionType>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sorted_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_by = Some(field.into());
        self.sort_direction = Some(direction);
        self
    }

    /// Every field the query references: condition fields, then `sort_by`.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let Some(condition) = &self.condition {
            condition.collect_fields(&mut out);
        }
        if let Some(sort_by) = &self.sort_by {
            out.push(sort_by.as_str());
        }
        out
    }

    /// Check every referenced field against `known`, using only the first segment of
    /// dotted fields (so `metadata.foo` passes when `metadata` is known).
    pub fn validate_fields(&self, known: &[&str], entity: &str) -> Result<(), ApiError> {
        let unknown: BTreeSet<&str> = self
            .fields()
            .into_iter()
            .map(|field| field.split('.').next().unwrap_or(field))
            .filter(|top| !known.contains(top))
            .collect();

        if unknown.is_empty() {
            return Ok(());
        }

        let unknown: Vec<&str> = unknown.into_iter().collect();
        let mut known_sorted = known.to_vec();
        known_sorted.sort_unstable();
        let msg = if unknown.len() > 1 {
            format!("are not known attributes of {}", entity)
        } else {
            format!("is not a known attribute of {}", entity)
        };
        Err(ApiError::InvalidRequest(format!(
            "{:?} {}. Known attributes: {:?}",
            unknown, msg, known_sorted
        )))
    }
}
