use super::types::PartitionKey;

/// Partition for names that contain no letter.
pub const SENTINEL_PARTITION: &str = "#";

pub const PARTITION_COUNT: usize = 27;

/// Every partition of the catalog. The set is fixed, so the query engine never has to
/// discover it at runtime.
pub const PARTITION_KEYS: [&str; PARTITION_COUNT] = [
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r",
    "s", "t", "u", "v", "w", "x", "y", "z", SENTINEL_PARTITION,
];

/// First ASCII letter of an already folded name, skipping any leading non-letters.
pub fn first_letter(folded: &str) -> Option<char> {
    folded.chars().find(|c| c.is_ascii_lowercase())
}

/// Maps a folded name to its partition.
pub fn partition_for(folded: &str) -> PartitionKey {
    match first_letter(folded) {
        Some(letter) => PartitionKey(letter.to_string()),
        None => PartitionKey(SENTINEL_PARTITION.to_string()),
    }
}

/// Position of a partition in `PARTITION_KEYS`.
pub fn partition_index(key: &str) -> Option<usize> {
    PARTITION_KEYS.iter().position(|candidate| *candidate == key)
}

pub fn all_partitions() -> Vec<PartitionKey> {
    PARTITION_KEYS
        .iter()
        .map(|key| PartitionKey(key.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_deterministic() {
        let p1 = partition_for("arcane spellbook");
        let p2 = partition_for("arcane spellbook");
        assert_eq!(p1, p2);
        assert_eq!(p1.as_str(), "a");
    }

    #[test]
    fn test_partition_index_covers_every_key() {
        for (idx, key) in PARTITION_KEYS.iter().enumerate() {
            assert_eq!(partition_index(key), Some(idx));
        }
        assert_eq!(partition_index("aa"), None);
        assert_eq!(partition_index("A"), None);
    }
}
