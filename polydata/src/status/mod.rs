//! Install status of catalog entries.
//!
//! Items are checked against the filesystem; groups fold their children's
//! status with [`Status::combine`].

mod resolver;

use std::fmt;

pub use resolver::{compute_item_status, directory_size, StatusResolver};

/// Install status of an item or group in a download directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Nothing on disk.
    NotInstalled,
    /// Present and consistent with the catalog.
    Installed,
    /// Present but out of date or corrupt.
    Stale,
    /// A group where some members are installed and some are not.
    Partial,
}

impl Status {
    /// Merge two statuses.
    ///
    /// Commutative and associative: `Stale` absorbs everything, then
    /// `Partial`, and mixing `Installed` with `NotInstalled` gives `Partial`.
    pub fn combine(self, other: Status) -> Status {
        use Status::*;
        match (self, other) {
            (Stale, _) | (_, Stale) => Stale,
            (Partial, _) | (_, Partial) => Partial,
            (a, b) if a == b => a,
            _ => Partial,
        }
    }

    /// Status of a group whose children have the given statuses.
    ///
    /// A group with no children counts as installed.
    pub fn aggregate(statuses: impl IntoIterator<Item = Status>) -> Status {
        statuses
            .into_iter()
            .reduce(Status::combine)
            .unwrap_or(Status::Installed)
    }

    /// Short label used in listings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotInstalled => "not installed",
            Status::Installed => "installed",
            Status::Stale => "out of date",
            Status::Partial => "partial",
        }
    }

    /// One-character listing marker.
    pub fn marker(&self) -> char {
        match self {
            Status::Installed => '*',
            Status::Stale => '-',
            Status::Partial => 'P',
            Status::NotInstalled => ' ',
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = Status> {
        prop_oneof![
            Just(Status::NotInstalled),
            Just(Status::Installed),
            Just(Status::Stale),
            Just(Status::Partial),
        ]
    }

    #[test]
    fn test_aggregate_rules() {
        use Status::*;
        assert_eq!(Status::aggregate([Installed, NotInstalled]), Partial);
        assert_eq!(Status::aggregate([NotInstalled, NotInstalled]), NotInstalled);
        assert_eq!(Status::aggregate([Installed, Installed]), Installed);
        assert_eq!(Status::aggregate([Installed, Stale, NotInstalled]), Stale);
        assert_eq!(Status::aggregate([Installed, Partial]), Partial);
        assert_eq!(Status::aggregate([NotInstalled, Partial]), Partial);
    }

    #[test]
    fn test_empty_group_is_installed() {
        assert_eq!(Status::aggregate(Vec::new()), Status::Installed);
    }

    #[test]
    fn test_markers() {
        assert_eq!(Status::Installed.marker(), '*');
        assert_eq!(Status::Stale.marker(), '-');
        assert_eq!(Status::Partial.marker(), 'P');
        assert_eq!(Status::NotInstalled.marker(), ' ');
        assert_eq!(Status::Stale.to_string(), "out of date");
    }

    proptest! {
        #[test]
        fn prop_combine_commutative(a in any_status(), b in any_status()) {
            prop_assert_eq!(a.combine(b), b.combine(a));
        }

        #[test]
        fn prop_combine_associative(a in any_status(), b in any_status(), c in any_status()) {
            prop_assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
        }

        #[test]
        fn prop_aggregate_ignores_order(mut statuses in prop::collection::vec(any_status(), 0..12)) {
            let forward = Status::aggregate(statuses.clone());
            statuses.reverse();
            prop_assert_eq!(forward, Status::aggregate(statuses));
        }

        #[test]
        fn prop_stale_dominates(statuses in prop::collection::vec(any_status(), 0..12)) {
            let mut with_stale = statuses;
            with_stale.push(Status::Stale);
            prop_assert_eq!(Status::aggregate(with_stale), Status::Stale);
        }
    }
}
