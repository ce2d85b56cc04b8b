//! Stream version expectations for optimistic appends.

/// Expected stream version when appending events.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Append regardless of the current version.
    Any,
    /// Append only if the stream is exactly at this version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(&self, current: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => *v == current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_everything() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn exact_matches_only_its_version() {
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(2));
        assert!(!ExpectedVersion::Exact(3).matches(4));
    }
}
