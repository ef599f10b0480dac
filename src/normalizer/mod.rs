//! Normalizer Module
//!
//! Pure transformation from a raw bulk-data card object to the catalog's `CardRecord`.
//!
//! ## Responsibilities
//! - **Folding**: Case-folds card names and strips diacritics so "Lim-Dûl" and "lim-dul"
//!   land on the same key.
//! - **Keys**: Derives the partition key and the `name|set|collector_number` sort key.
//! - **Timestamps**: Picks the source-reported modification time used as the write watermark.
//! - **Matching**: Ranks a folded name against a folded query (prefix before substring).
//!
//! Every function here is deterministic. Re-normalizing the same raw record always produces
//! the same keys, which the catalog's idempotent upsert depends on.

pub mod normalize;
pub mod types;

pub use normalize::{fold_name, match_rank, normalize, sort_key, strip_leading_non_letters};
pub use types::{MatchRank, NormalizeError, RawCard};
