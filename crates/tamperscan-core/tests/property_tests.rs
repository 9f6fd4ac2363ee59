//! Property-based tests for path normalization, exclusions and baselines.
//!
//! These tests use proptest to generate arbitrary inputs and verify the
//! comparison rules hold across a wide range of cases.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use tamperscan_core::Baseline;
use tamperscan_core::BaselinePolicy;
use tamperscan_core::ExclusionPolicy;
use tamperscan_core::changes::archive_changes;
use tamperscan_core::rpmdb::FileFlags;
use tamperscan_core::rpmdb::InstalledFile;
use tamperscan_core::rpmdb::PackageRecord;
use tamperscan_core::test_utils::TarTestBuilder;
use tamperscan_core::types::ChangeKind;
use tamperscan_core::types::NormalizedPath;

fn raw_path() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just(String::new()),
            Just(".".to_string()),
            Just("..".to_string()),
            "[a-z0-9_-]{1,8}",
        ],
        0..10,
    )
    .prop_map(|parts| parts.join("/"))
}

fn flags() -> impl Strategy<Value = FileFlags> {
    prop::sample::select(vec![0_u32, 1, 2, 4, 8, 16, 64, 128, 256, 8 | 16, 1 << 11])
        .prop_map(FileFlags::from_bits)
}

proptest! {
    /// Normalizing twice equals normalizing once.
    #[test]
    fn prop_normalize_idempotent(raw in raw_path(), anchored in any::<bool>()) {
        let raw = if anchored { format!("/{raw}") } else { raw };
        let once = NormalizedPath::new(&raw);
        let twice = NormalizedPath::new(once.as_str());
        prop_assert_eq!(once, twice);
    }

    /// Normalized paths never start with a separator and carry no redundant
    /// components, except for the root itself and the empty path `.`.
    #[test]
    fn prop_normalized_form(raw in raw_path()) {
        let path = NormalizedPath::new(&format!("/{raw}"));
        if !path.is_root() && path.as_str() != "." {
            prop_assert!(!path.as_str().starts_with('/'));
            for component in path.as_str().split('/') {
                prop_assert!(!component.is_empty());
                prop_assert!(component != "." && component != "..");
            }
        }
    }

    /// Anchored and relative spellings of a path normalize identically,
    /// unless the input is separators alone.
    #[test]
    fn prop_anchoring_does_not_change_form(raw in raw_path()) {
        let relative = NormalizedPath::new(&raw);
        let anchored = NormalizedPath::new(&format!("/{raw}"));
        if raw.bytes().all(|b| b == b'/') {
            prop_assert!(anchored.is_root());
        } else {
            prop_assert_eq!(anchored, relative);
        }
    }

    /// Leading separators do not change the normalized form.
    #[test]
    fn prop_leading_separators_stripped(
        components in prop::collection::vec("[a-z]{1,8}", 1..6),
        slashes in 1usize..4
    ) {
        let relative = components.join("/");
        let anchored = format!("{}{relative}", "/".repeat(slashes));
        let normalized = NormalizedPath::new(&anchored);
        prop_assert_eq!(normalized.as_str(), relative.as_str());
    }

    /// Paths at or below an excluded directory are excluded; siblings that
    /// only share a string prefix are not.
    #[test]
    fn prop_directory_exclusion_boundaries(
        dir in "[a-z]{1,6}",
        suffix in "[a-z]{1,6}",
        rest in prop::collection::vec("[a-z]{1,6}", 0..4)
    ) {
        let policy = ExclusionPolicy::empty().with_directory(&dir);

        let mut nested = dir.clone();
        for part in &rest {
            nested = format!("{nested}/{part}");
        }
        prop_assert!(policy.directory_excludes(&NormalizedPath::new(&nested)));

        let sibling = format!("{dir}{suffix}/x");
        prop_assert!(!policy.directory_excludes(&NormalizedPath::new(&sibling)));
    }

    /// Exact-path exclusion matches only the listed path.
    #[test]
    fn prop_path_exclusion_is_literal(
        path in "[a-z]{1,6}/[a-z]{1,6}",
        extra in "[a-z]{1,4}"
    ) {
        let policy = ExclusionPolicy::empty().with_path(&path);
        prop_assert!(policy.path_excludes(&NormalizedPath::new(&path)));
        let longer = format!("{path}{extra}");
        prop_assert!(!policy.path_excludes(&NormalizedPath::new(&longer)));
        let below = format!("{path}/{extra}");
        prop_assert!(!policy.path_excludes(&NormalizedPath::new(&below)));
    }

    /// Every path dropped by the flag-filtered policy carries at least one
    /// modifiable flag, and no path is added.
    #[test]
    fn prop_flag_filtered_subset_of_unfiltered(
        files in prop::collection::vec(("[a-z]{1,3}/[a-z]{1,3}", flags()), 1..20)
    ) {
        let package = PackageRecord {
            name: "pkg".to_string(),
            version: "1".to_string(),
            release: "1".to_string(),
            epoch: None,
            arch: None,
            files: files
                .iter()
                .map(|(path, flags)| InstalledFile {
                    path: format!("/{path}"),
                    flags: *flags,
                })
                .collect(),
        };
        let packages = [package];
        let unfiltered = Baseline::build(&packages, BaselinePolicy::Unfiltered);
        let filtered = Baseline::build(&packages, BaselinePolicy::FlagFiltered);

        for (path, _) in &filtered {
            prop_assert!(unfiltered.contains(path));
        }
        for (path, _) in &unfiltered {
            if filtered.contains(path) {
                continue;
            }
            let flagged = files.iter().any(|(raw, flags)| {
                NormalizedPath::new(raw) == *path && flags.intersects(FileFlags::MODIFIABLE)
            });
            prop_assert!(flagged, "{path} dropped without a modifiable flag");
        }
    }

    /// A whiteout entry reports the un-prefixed path.
    #[test]
    fn prop_whiteout_reports_unprefixed_path(
        dir in "[a-z]{1,6}",
        name in "[a-z]{1,8}"
    ) {
        let target = format!("{dir}/{name}");
        let tar = TarTestBuilder::new().add_whiteout(&target).build();
        let changes = archive_changes("sha256:layer", tar.as_slice()).unwrap();
        prop_assert_eq!(changes.changes.len(), 1);
        prop_assert_eq!(changes.changes[0].path.as_str(), target.as_str());
        prop_assert_eq!(changes.changes[0].kind, ChangeKind::Deleted);
    }
}
