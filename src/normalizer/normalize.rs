use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use super::types::{MatchRank, NormalizeError, RawCard};
use crate::catalog::partitioner::partition_for;
use crate::catalog::types::CardRecord;

const SORT_KEY_SEPARATOR: char = '|';

/// Case-folds a name, strips diacritics and collapses whitespace.
///
/// Letters without a canonical decomposition (`æ`, `ø`, ...) are spelled out.
pub fn fold_name(name: &str) -> String {
    let mut folded = String::with_capacity(name.len());
    for c in name.nfkd().filter(|c| !is_combining_mark(*c)) {
        match c {
            'æ' | 'Æ' => folded.push_str("ae"),
            'œ' | 'Œ' => folded.push_str("oe"),
            'ø' | 'Ø' => folded.push('o'),
            'ß' => folded.push_str("ss"),
            'đ' | 'Đ' => folded.push('d'),
            'ł' | 'Ł' => folded.push('l'),
            _ => folded.extend(c.to_lowercase()),
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drops everything before the first ASCII letter of a folded name.
pub fn strip_leading_non_letters(folded: &str) -> &str {
    folded.trim_start_matches(|c: char| !c.is_ascii_lowercase())
}

/// `folded name|set|collector number`; keeps every printing of a card distinct.
pub fn sort_key(folded_name: &str, set_code: &str, collector_number: &str) -> String {
    let mut key =
        String::with_capacity(folded_name.len() + set_code.len() + collector_number.len() + 2);
    key.push_str(folded_name);
    key.push(SORT_KEY_SEPARATOR);
    key.push_str(&set_code.to_lowercase());
    key.push(SORT_KEY_SEPARATOR);
    key.push_str(collector_number);
    key
}

/// Ranks a folded card name against a folded, non-empty query.
///
/// A query that starts with a letter also prefix-matches names that only differ by leading
/// punctuation or digits ("mace" matches "+2 mace").
pub fn match_rank(search_name: &str, needle: &str) -> Option<MatchRank> {
    if needle.is_empty() {
        return None;
    }

    let letter_led = needle.starts_with(|c: char| c.is_ascii_lowercase());
    if search_name.starts_with(needle)
        || (letter_led && strip_leading_non_letters(search_name).starts_with(needle))
    {
        return Some(MatchRank::Prefix);
    }

    if search_name.contains(needle) {
        return Some(MatchRank::Substring);
    }

    None
}

/// Source-reported modification time: `updated_at` when present, else `released_at`.
pub fn source_timestamp(raw: &RawCard) -> Result<DateTime<Utc>, NormalizeError> {
    if let Some(value) = raw.str_field("updated_at") {
        return DateTime::parse_from_rfc3339(value)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| NormalizeError::InvalidTimestamp {
                field: "updated_at",
                value: value.to_string(),
            });
    }

    if let Some(value) = raw.str_field("released_at") {
        return NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|ts| ts.and_utc())
            .ok_or_else(|| NormalizeError::InvalidTimestamp {
                field: "released_at",
                value: value.to_string(),
            });
    }

    Err(NormalizeError::MissingField("updated_at"))
}

/// Turns a raw bulk record into the stored shape.
pub fn normalize(raw: &RawCard) -> Result<CardRecord, NormalizeError> {
    let card_id = raw
        .str_field("id")
        .ok_or(NormalizeError::MissingField("id"))?;
    let name = raw
        .str_field("name")
        .ok_or(NormalizeError::MissingField("name"))?;
    let updated_at = source_timestamp(raw)?;

    let search_name = fold_name(name);
    let partition_key = partition_for(&search_name);
    let sort_key = sort_key(
        &search_name,
        raw.str_field("set").unwrap_or_default(),
        raw.str_field("collector_number").unwrap_or_default(),
    );

    Ok(CardRecord {
        card_id: card_id.to_string(),
        name: name.to_string(),
        search_name,
        partition_key,
        sort_key,
        updated_at,
        attributes: Value::Object(raw.fields.clone()),
    })
}
