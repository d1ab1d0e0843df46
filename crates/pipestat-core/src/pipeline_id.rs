//! Pipeline identifiers and canonical column ordering.
//!
//! Pipelines are named by a short textual tag with an embedded numeric
//! index (`p0`, `p2`, `p13`, ...). The index drives the fallback column
//! order so that `p13` sorts after `p2`, which a plain string sort would
//! get wrong.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one preprocessing pipeline variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    /// Create a pipeline identifier from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as written in the input table.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first run of ASCII digits in the identifier, if any.
    ///
    /// `"p12"` yields `Some(12)`, `"raw"` yields `None`.
    #[must_use]
    pub fn index(&self) -> Option<u64> {
        let start = self.0.find(|c: char| c.is_ascii_digit())?;
        let digits: &str = &self.0[start..];
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());
        digits[..end].parse().ok()
    }

    /// Whether the identifier is exactly `prefix` followed by one or more
    /// ASCII digits (the `p\d+` variant pattern for the default prefix).
    #[must_use]
    pub fn matches_variant(&self, prefix: &str) -> bool {
        self.0.strip_prefix(prefix).is_some_and(|rest| {
            !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
        })
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PipelineId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PipelineId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Order the `present` pipelines for reproducible output.
///
/// Pipelines listed in `hint` come first, in hint order, skipping any the
/// data does not contain. The rest follow sorted by embedded numeric index
/// ascending; identifiers without an index sort last, alphabetically.
/// Duplicates in either input are collapsed.
#[must_use]
pub fn canonical_order(present: &[PipelineId], hint: &[PipelineId]) -> Vec<PipelineId> {
    let mut ordered: Vec<PipelineId> = Vec::with_capacity(present.len());
    for id in hint {
        if present.contains(id) && !ordered.contains(id) {
            ordered.push(id.clone());
        }
    }

    let mut extra: Vec<PipelineId> = present
        .iter()
        .filter(|id| !ordered.contains(id))
        .cloned()
        .collect();
    extra.sort_by(|a, b| match (a.index(), b.index()) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    });
    extra.dedup();

    ordered.extend(extra);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<PipelineId> {
        names.iter().copied().map(PipelineId::from).collect()
    }

    #[test]
    fn index_parses_embedded_digits() {
        assert_eq!(PipelineId::from("p0").index(), Some(0));
        assert_eq!(PipelineId::from("p13").index(), Some(13));
        assert_eq!(PipelineId::from("v7b").index(), Some(7));
        assert_eq!(PipelineId::from("raw").index(), None);
    }

    #[test]
    fn variant_pattern_requires_prefix_and_digits() {
        assert!(PipelineId::from("p0").matches_variant("p"));
        assert!(PipelineId::from("p12").matches_variant("p"));
        assert!(!PipelineId::from("p").matches_variant("p"));
        assert!(!PipelineId::from("p1a").matches_variant("p"));
        assert!(!PipelineId::from("q3").matches_variant("p"));
        assert!(!PipelineId::from("P3").matches_variant("p"));
    }

    #[test]
    fn hint_order_then_numeric_index() {
        let present = ids(&["p13", "p9", "p2", "p0", "p10"]);
        let hint = ids(&["p0", "p2", "p5"]);
        let ordered = canonical_order(&present, &hint);
        assert_eq!(ordered, ids(&["p0", "p2", "p9", "p10", "p13"]));
    }

    #[test]
    fn empty_hint_sorts_numerically_not_lexically() {
        let present = ids(&["p12", "p2", "p13", "p5"]);
        let ordered = canonical_order(&present, &[]);
        assert_eq!(ordered, ids(&["p2", "p5", "p12", "p13"]));
    }

    #[test]
    fn unindexed_identifiers_sort_last() {
        let present = ids(&["raw", "p3", "base"]);
        let ordered = canonical_order(&present, &[]);
        assert_eq!(ordered, ids(&["p3", "base", "raw"]));
    }

    #[test]
    fn display_matches_input() {
        assert_eq!(PipelineId::from("p7").to_string(), "p7");
    }
}
