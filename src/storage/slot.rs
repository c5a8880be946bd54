//! Slot addressing
//!
//! Maps a numeric id onto a sharded location below a store's base directory.
//! A slot layout such as `4-2-2` declares an id width of 8 digits; all but the
//! last segment become directory names, the last segment is the leaf name
//! (the full zero-padded id, wrapped in the store's prefix and suffix):
//!
//! ```text
//! id 10485, layout 4-2-2 -> 0001/04/<prefix>00010485<suffix>
//! ```
//!
//! Everything in here is pure; no I/O happens.

use crate::error::{Result, StoreError};
use std::fmt;
use std::str::FromStr;

/// Widest id the layout may declare; keeps `10^width - 1` inside `u64`.
pub const MAX_ID_WIDTH: usize = 18;

/// Ordered digit widths, one per directory level plus the leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    segments: Vec<usize>,
}

impl SlotLayout {
    pub fn new(segments: Vec<usize>) -> Result<Self> {
        if segments.is_empty() {
            return Err(StoreError::configuration("Slot layout must not be empty"));
        }
        if segments.iter().any(|&width| width == 0) {
            return Err(StoreError::configuration(format!(
                "Slot layout segments must be positive: {:?}",
                segments
            )));
        }
        let layout = Self { segments };
        if layout.id_width() > MAX_ID_WIDTH {
            return Err(StoreError::configuration(format!(
                "Slot layout declares {} digits, at most {} are supported",
                layout.id_width(),
                MAX_ID_WIDTH
            )));
        }
        Ok(layout)
    }

    pub fn segments(&self) -> &[usize] {
        &self.segments
    }

    /// Total number of digits of a padded id.
    pub fn id_width(&self) -> usize {
        self.segments.iter().sum()
    }

    /// Number of directory levels above the leaf.
    pub fn depth(&self) -> usize {
        self.segments.len() - 1
    }

    pub fn max_id(&self) -> u64 {
        10u64.pow(self.id_width() as u32) - 1
    }

    /// Zero-pads `id` to the layout width (no grouping, locale independent).
    pub fn pad(&self, id: u64) -> String {
        format!("{:0width$}", id, width = self.id_width())
    }

    /// Directory segments followed by the leaf name for `id`.
    pub fn slot_path(&self, id: u64, prefix: &str, suffix: &str) -> Result<Vec<String>> {
        if id == 0 || id > self.max_id() {
            return Err(StoreError::usage(format!(
                "Id {} is outside the range 1..={} of layout {}",
                id,
                self.max_id(),
                self
            )));
        }

        let padded = self.pad(id);
        let mut path = Vec::with_capacity(self.segments.len());
        let mut offset = 0;
        for width in &self.segments[..self.depth()] {
            path.push(padded[offset..offset + width].to_string());
            offset += width;
        }
        path.push(format!("{}{}{}", prefix, padded, suffix));
        Ok(path)
    }

    /// Recovers the id from a leaf name: strips `prefix`, parses the next
    /// `id_width` characters.
    pub fn id_from_slot_name(&self, name: &str, prefix: &str) -> Result<u64> {
        id_from_slot_name(name, prefix, self.id_width())
    }

    /// True when `name` is a plausible directory name at `level`.
    pub(crate) fn is_level_name(&self, level: usize, name: &str) -> bool {
        self.segments
            .get(level)
            .map(|&width| name.len() == width && name.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false)
    }
}

impl FromStr for SlotLayout {
    type Err = StoreError;

    fn from_str(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(StoreError::configuration("Slot layout must not be empty"));
        }
        if let Some(bad) = text.chars().find(|c| !c.is_ascii_digit() && *c != '-') {
            return Err(StoreError::configuration(format!(
                "Slot layout '{}' contains invalid character '{}'",
                text, bad
            )));
        }

        let mut segments = Vec::new();
        for part in text.split('-') {
            if part.is_empty() {
                return Err(StoreError::configuration(format!(
                    "Slot layout '{}' contains an empty segment",
                    text
                )));
            }
            let width = part.parse::<usize>().map_err(|e| {
                StoreError::configuration(format!("Slot layout '{}': {}", text, e))
            })?;
            segments.push(width);
        }
        Self::new(segments)
    }
}

impl fmt::Display for SlotLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(|w| w.to_string()).collect();
        write!(f, "{}", parts.join("-"))
    }
}

/// Computes the slot path segments for `id`.
pub fn compute_slot_path(
    id: u64,
    layout: &SlotLayout,
    prefix: &str,
    suffix: &str,
) -> Result<Vec<String>> {
    layout.slot_path(id, prefix, suffix)
}

/// Parses the id out of a slot leaf name.
pub fn id_from_slot_name(name: &str, prefix: &str, id_width: usize) -> Result<u64> {
    let rest = name.strip_prefix(prefix).ok_or_else(|| {
        StoreError::format(format!(
            "Slot name '{}' does not start with prefix '{}'",
            name, prefix
        ))
    })?;
    let digits = rest.get(..id_width).ok_or_else(|| {
        StoreError::format(format!(
            "Slot name '{}' is shorter than the id width {}",
            name, id_width
        ))
    })?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StoreError::format(format!(
            "Slot name '{}' does not carry a numeric id",
            name
        )));
    }
    digits
        .parse::<u64>()
        .map_err(|e| StoreError::format(format!("Slot name '{}': {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_known_slot_path() {
        let layout: SlotLayout = "4-2-2".parse().unwrap();
        assert_eq!(layout.id_width(), 8);
        let path = layout.slot_path(10485, "", "").unwrap();
        assert_eq!(path, vec!["0001", "04", "00010485"]);
    }

    #[test]
    fn test_prefix_and_suffix_only_on_leaf() {
        let layout: SlotLayout = "4-2-2".parse().unwrap();
        let path = compute_slot_path(10485, &layout, "docs_", ".xml").unwrap();
        assert_eq!(path, vec!["0001", "04", "docs_00010485.xml"]);
        assert_eq!(layout.id_from_slot_name(&path[2], "docs_").unwrap(), 10485);
    }

    #[test]
    fn test_single_segment_layout_has_no_directories() {
        let layout: SlotLayout = "6".parse().unwrap();
        assert_eq!(layout.depth(), 0);
        assert_eq!(layout.slot_path(7, "", "").unwrap(), vec!["000007"]);
    }

    #[rstest]
    #[case("")]
    #[case("-4-2")]
    #[case("4-2-")]
    #[case("4--2")]
    #[case("4-0-2")]
    #[case("4-a-2")]
    #[case("4_2")]
    #[case("10-10")]
    fn test_invalid_layouts_are_configuration_errors(#[case] layout: &str) {
        let result = layout.parse::<SlotLayout>();
        assert!(
            matches!(result, Err(StoreError::Configuration(_))),
            "layout '{}' should be rejected, got {:?}",
            layout,
            result
        );
    }

    #[rstest]
    #[case("4-2-2", 8)]
    #[case("2-2", 4)]
    #[case("8", 8)]
    #[case("3-3-3-3", 12)]
    fn test_layout_width(#[case] spec: &str, #[case] width: usize) {
        let layout: SlotLayout = spec.parse().unwrap();
        assert_eq!(layout.id_width(), width);
        assert_eq!(layout.to_string(), spec);
    }

    #[test]
    fn test_out_of_range_ids_are_rejected() {
        let layout: SlotLayout = "2-2".parse().unwrap();
        assert!(matches!(layout.slot_path(0, "", ""), Err(StoreError::Usage(_))));
        assert!(matches!(layout.slot_path(10000, "", ""), Err(StoreError::Usage(_))));
        assert!(layout.slot_path(9999, "", "").is_ok());
    }

    #[test]
    fn test_malformed_slot_names() {
        assert!(matches!(
            id_from_slot_name("docs_0001", "docs_", 8),
            Err(StoreError::Format(_))
        ));
        assert!(matches!(
            id_from_slot_name("docs_0001x485.xml", "docs_", 8),
            Err(StoreError::Format(_))
        ));
        assert!(matches!(
            id_from_slot_name("other_00010485", "docs_", 8),
            Err(StoreError::Format(_))
        ));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn layout_strategy() -> impl Strategy<Value = SlotLayout> {
            prop::collection::vec(1usize..=4, 1..=4)
                .prop_map(|segments| SlotLayout::new(segments).unwrap())
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn prop_slot_round_trip(layout in layout_strategy(), seed in any::<u64>(), prefix in "[a-z]{0,6}_?") {
                let id = seed % layout.max_id() + 1;
                let path = compute_slot_path(id, &layout, &prefix, ".xml").unwrap();

                prop_assert_eq!(path.len(), layout.segments().len());
                let leaf = path.last().unwrap();
                prop_assert_eq!(id_from_slot_name(leaf, &prefix, layout.id_width()).unwrap(), id);
            }

            #[test]
            fn prop_directory_segments_are_fixed_width(layout in layout_strategy(), seed in any::<u64>()) {
                let id = seed % layout.max_id() + 1;
                let path = layout.slot_path(id, "", "").unwrap();
                for (level, name) in path[..layout.depth()].iter().enumerate() {
                    prop_assert!(layout.is_level_name(level, name));
                }
            }
        }
    }
}
