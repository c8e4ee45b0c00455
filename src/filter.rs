//! Filter specifications and their translation to store queries.
//!
//! Only a few predicates are expressible natively by the document store
//! (field equality, null, array-contains-any). [`FilterSpec::to_native`]
//! keeps that mapping explicit; every other mode falls back to fetching a
//! snapshot and evaluating [`FilterSpec::matches`] per document. The preview
//! builder applies `matches` to everything it fetches, so native modes are
//! simply pre-narrowed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogDoc, NativeQuery};
use crate::tags::normalize_tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterField {
    Description,
    Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Exact,
    Iexact,
    Contains,
    Icontains,
    Regex,
    Empty,
    Missing,
    TagsAny,
    TagsAll,
}

/// A filter value off the wire: a string for description modes, a string
/// list for tag modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    pub field: FilterField,
    pub mode: FilterMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FilterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Error, Debug)]
#[error("Invalid filter: {0}")]
pub struct InvalidFilter(pub String);

impl FilterSpec {
    fn text_value(&self) -> Option<&str> {
        match &self.value {
            Some(FilterValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    fn list_value(&self) -> Option<&[String]> {
        match &self.value {
            Some(FilterValue::List(l)) => Some(l),
            _ => None,
        }
    }

    /// Reject shape mismatches before any query runs.
    pub fn validate(&self) -> Result<(), InvalidFilter> {
        match (self.field, self.mode) {
            (FilterField::Description, FilterMode::TagsAny | FilterMode::TagsAll) => {
                return Err(InvalidFilter(format!(
                    "mode {:?} requires field \"tags\"",
                    self.mode
                )));
            }
            (FilterField::Tags, mode)
                if !matches!(mode, FilterMode::TagsAny | FilterMode::TagsAll) =>
            {
                return Err(InvalidFilter(format!(
                    "mode {:?} requires field \"description\"",
                    mode
                )));
            }
            _ => {}
        }

        match self.mode {
            FilterMode::Empty | FilterMode::Missing => {}
            FilterMode::TagsAny | FilterMode::TagsAll => {
                let values = self
                    .list_value()
                    .ok_or_else(|| InvalidFilter("tag modes require a value list".to_string()))?;
                if normalize_tags(values).is_empty() {
                    return Err(InvalidFilter("tag value list is empty".to_string()));
                }
            }
            FilterMode::Regex => {
                let pattern = self
                    .text_value()
                    .ok_or_else(|| InvalidFilter("regex mode requires a pattern".to_string()))?;
                Regex::new(pattern)
                    .map_err(|e| InvalidFilter(format!("invalid regex pattern: {}", e)))?;
            }
            _ => {
                if self.text_value().is_none() {
                    return Err(InvalidFilter(format!(
                        "mode {:?} requires a string value",
                        self.mode
                    )));
                }
            }
        }
        Ok(())
    }

    /// Map to the narrowest query the store can run natively. Modes the
    /// store cannot express fetch the full collection and rely on
    /// [`matches`](Self::matches) after the fetch.
    pub fn to_native(&self) -> NativeQuery {
        match (self.field, self.mode) {
            (FilterField::Description, FilterMode::Exact) => NativeQuery::DescriptionEq(
                self.text_value().map(|v| v.to_string()),
            ),
            (FilterField::Description, FilterMode::Empty) => {
                NativeQuery::DescriptionEq(Some(String::new()))
            }
            (FilterField::Description, FilterMode::Missing) => NativeQuery::DescriptionEq(None),
            (FilterField::Tags, FilterMode::TagsAny) => {
                NativeQuery::TagsAny(normalize_tags(self.list_value().unwrap_or(&[])))
            }
            // contains / icontains / iexact / regex / tags_all have no
            // native equivalent
            _ => NativeQuery::All,
        }
    }

    /// Full predicate over a document in hand, mirroring the mode semantics
    /// of the query side. `contains` is case-insensitive, matching the
    /// preview builder's substring check.
    pub fn matches(&self, doc: &CatalogDoc) -> bool {
        match self.field {
            FilterField::Description => {
                let description = doc.description.as_deref();
                match self.mode {
                    FilterMode::Exact => description == self.text_value(),
                    FilterMode::Iexact => match (description, self.text_value()) {
                        (Some(d), Some(v)) => d.to_lowercase() == v.to_lowercase(),
                        _ => false,
                    },
                    FilterMode::Contains | FilterMode::Icontains => {
                        match (description, self.text_value()) {
                            (Some(d), Some(v)) => d.to_lowercase().contains(&v.to_lowercase()),
                            _ => false,
                        }
                    }
                    FilterMode::Regex => match (description, self.text_value()) {
                        (Some(d), Some(pattern)) => match Regex::new(pattern) {
                            Ok(re) => re.is_match(d),
                            Err(_) => false,
                        },
                        _ => false,
                    },
                    FilterMode::Empty => description == Some(""),
                    FilterMode::Missing => description.is_none(),
                    FilterMode::TagsAny | FilterMode::TagsAll => false,
                }
            }
            FilterField::Tags => {
                let doc_tags = normalize_tags(&doc.tags);
                let values = normalize_tags(self.list_value().unwrap_or(&[]));
                match self.mode {
                    FilterMode::TagsAny => values.iter().any(|v| doc_tags.contains(v)),
                    FilterMode::TagsAll => values.iter().all(|v| doc_tags.contains(v)),
                    _ => false,
                }
            }
        }
    }
}
