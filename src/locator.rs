//! Board locator: resolves symbolic board names to live document nodes.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::creative::DEVICE_PLACEHOLDER;
use crate::document::DocNode;
use crate::error::BuildResult;

/// How a board name is matched.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Any fragment is a substring of (or equal to) the name.
    Fragments(Vec<String>),
    /// The pattern matches the full name.
    Pattern(Regex),
}

impl Matcher {
    /// Matches exactly one literal name.
    pub fn exact(name: &str) -> BuildResult<Self> {
        Ok(Self::Pattern(Regex::new(&format!("^{}$", regex::escape(name)))?))
    }

    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fragments(fragments.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Fragments(fragments) => fragments
                .iter()
                .any(|fragment| name == fragment || name.contains(fragment.as_str())),
            Self::Pattern(pattern) => pattern.is_match(name),
        }
    }
}

/// Serializable matcher description, as found in action options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherSpec {
    Fragments(Vec<String>),
    Pattern(String),
}

impl MatcherSpec {
    pub fn compile(&self) -> BuildResult<Matcher> {
        match self {
            Self::Fragments(fragments) => Ok(Matcher::Fragments(fragments.clone())),
            Self::Pattern(pattern) => Ok(Matcher::Pattern(Regex::new(pattern)?)),
        }
    }

    /// Substitutes the `${device}` placeholder with a device abbreviation.
    pub fn for_device(&self, abbreviation: &str) -> MatcherSpec {
        let resolve = |s: &String| s.replace(DEVICE_PLACEHOLDER, abbreviation);
        match self {
            Self::Fragments(fragments) => Self::Fragments(fragments.iter().map(resolve).collect()),
            Self::Pattern(pattern) => Self::Pattern(resolve(pattern)),
        }
    }
}

impl fmt::Display for MatcherSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fragments(fragments) => f.write_str(&fragments.join("|")),
            Self::Pattern(pattern) => f.write_str(pattern),
        }
    }
}

/// Finds the boards whose names satisfy `matcher`.
///
/// Walks `candidates` top-level first, depth-first into children. A matching
/// container is returned without searching inside it. The node whose id is
/// `exclude` is never returned. An absent candidate set yields no matches.
pub fn find_boards<'a>(
    candidates: Option<&'a [DocNode]>,
    exclude: Option<&str>,
    matcher: &Matcher,
) -> Vec<&'a DocNode> {
    let mut found = Vec::new();
    if let Some(nodes) = candidates {
        collect(nodes, exclude, matcher, &mut found);
    }
    found
}

fn collect<'a>(
    nodes: &'a [DocNode],
    exclude: Option<&str>,
    matcher: &Matcher,
    found: &mut Vec<&'a DocNode>,
) {
    for node in nodes {
        let excluded = exclude == Some(node.id.as_str());
        if !excluded && matcher.matches(&node.name) {
            found.push(node);
        } else {
            collect(&node.children, exclude, matcher, found);
        }
    }
}

/// Returns the first board named exactly `name`, skipping `exclude`.
pub fn find_board_named<'a>(
    candidates: &'a [DocNode],
    exclude: Option<&str>,
    name: &str,
) -> BuildResult<Option<&'a DocNode>> {
    let matcher = Matcher::exact(name)?;
    Ok(find_boards(Some(candidates), exclude, &matcher).into_iter().next())
}
