use crate::kind::{MetricKind, MetricKindMask};

/// Matches group or metric names.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Matcher {
    /// Matches the entire name.
    Full(String),
    /// Matches the beginning of the name.
    Prefix(String),
    /// Matches the end of the name.
    Suffix(String),
}

impl Matcher {
    /// Checks if the given name matches this matcher.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Matcher::Prefix(prefix) => name.starts_with(prefix),
            Matcher::Suffix(suffix) => name.ends_with(suffix),
            Matcher::Full(full) => name == full,
        }
    }
}

/// Selects which metrics a snapshot includes.
///
/// The default filter selects everything.  Group and name matchers are optional; when set, a
/// metric is only included if its group and its own name both match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotFilter {
    kinds: MetricKindMask,
    group: Option<Matcher>,
    name: Option<Matcher>,
}

impl SnapshotFilter {
    /// Only include metrics of the given kinds.
    pub fn with_kinds(mut self, kinds: MetricKindMask) -> Self {
        self.kinds = kinds;
        self
    }

    /// Only include groups whose name matches `matcher`.
    pub fn with_group(mut self, matcher: Matcher) -> Self {
        self.group = Some(matcher);
        self
    }

    /// Only include metrics whose name matches `matcher`.
    pub fn with_name(mut self, matcher: Matcher) -> Self {
        self.name = Some(matcher);
        self
    }

    /// Whether metrics in the given group may be included.
    pub fn matches_group(&self, group: &str) -> bool {
        self.group.as_ref().map_or(true, |m| m.matches(group))
    }

    /// Whether a metric with the given name and kind is included, ignoring its group.
    pub fn matches_metric(&self, name: &str, kind: MetricKind) -> bool {
        self.kinds.matches(kind) && self.name.as_ref().map_or(true, |m| m.matches(name))
    }
}
