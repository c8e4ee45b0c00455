//! Operation engine: computes a proposed field patch from a document's
//! current state and a bulk-mutation descriptor.
//!
//! Pure and total: every declared operation produces a patch (possibly an
//! empty one) and user-supplied pattern syntax never causes an error here.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::catalog::RowState;
use crate::tags::normalize_tags;

/// A bulk mutation rule, applied uniformly to every selected document.
///
/// Wire shape: `{"type": "tags_remove", "payload": {"remove": ["stale"]}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Operation {
    DescriptionSet {
        #[serde(rename = "newText")]
        new_text: String,
    },
    DescriptionFindReplace {
        find: String,
        #[serde(default)]
        replace: Option<String>,
        #[serde(default)]
        regex: bool,
        #[serde(default, rename = "caseInsensitive")]
        case_insensitive: bool,
    },
    TagsAdd {
        add: Vec<String>,
    },
    TagsRemove {
        remove: Vec<String>,
    },
    TagsReplace {
        #[serde(rename = "newTags")]
        new_tags: Vec<String>,
    },
}

/// Compute the proposed patch for one document. Fields absent from the
/// returned state are unchanged.
pub fn apply_operation(current: &RowState, op: &Operation) -> RowState {
    match op {
        Operation::DescriptionSet { new_text } => RowState {
            description: Some(new_text.clone()),
            tags: None,
        },
        Operation::DescriptionFindReplace {
            find,
            replace,
            regex,
            case_insensitive,
        } => {
            if find.is_empty() {
                return RowState::default();
            }
            let text = current.description.clone().unwrap_or_default();
            let replace = replace.as_deref().unwrap_or("");
            let replaced = if *regex {
                match RegexBuilder::new(find)
                    .case_insensitive(*case_insensitive)
                    .build()
                {
                    Ok(re) => re.replace_all(&text, replace).into_owned(),
                    // Fail soft on an invalid user pattern: keep the text
                    Err(_) => text,
                }
            } else if *case_insensitive {
                match RegexBuilder::new(&regex::escape(find))
                    .case_insensitive(true)
                    .build()
                {
                    Ok(re) => re
                        .replace_all(&text, regex::NoExpand(replace))
                        .into_owned(),
                    Err(_) => text,
                }
            } else {
                // Literal replace hits every occurrence
                text.replace(find.as_str(), replace)
            };
            RowState {
                description: Some(replaced),
                tags: None,
            }
        }
        Operation::TagsAdd { add } => {
            let mut union: Vec<String> = current.tags.clone().unwrap_or_default();
            union.extend(normalize_tags(add));
            RowState {
                description: None,
                tags: Some(normalize_tags(&union)),
            }
        }
        Operation::TagsRemove { remove } => {
            let removing: HashSet<String> = normalize_tags(remove).into_iter().collect();
            let kept: Vec<String> = normalize_tags(&current.tags.clone().unwrap_or_default())
                .into_iter()
                .filter(|t| !removing.contains(t))
                .collect();
            RowState {
                description: None,
                tags: Some(kept),
            }
        }
        Operation::TagsReplace { new_tags } => RowState {
            description: None,
            tags: Some(normalize_tags(new_tags)),
        },
    }
}
