use serde_json::Value;

use crate::parse::numeric::{digits_to_int, first_digit_run, parse_price, words_to_int};
use crate::types::{ListingIdentity, ParsedListing, CARD_KEY};

/// Price field label marker: "per meter".
pub const PER_METER_MARKER: &str = "متری";
/// Chip marker for a newly built unit; means age 0.
pub const NEW_BUILD_MARKER: &str = "نوساز";
/// Chip marker for "year(s)".
pub const YEAR_MARKER: &str = "سال";
/// Chip labels that carry the unit area.
pub const AREA_KEYWORDS: &[&str] = &["متراژ", "مساحت", "متر", "زیربنا", "زیر بنا"];

const PRICE_FIELDS: &str = "price_fields";
const CHIPS: &str = "chips";

/// The display card of a listing, or the record itself when it is not nested.
pub fn card_of(record: &Value) -> &Value {
    record
        .get(CARD_KEY)
        .filter(|c| c.is_object())
        .unwrap_or(record)
}

fn entries<'a>(card: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    card.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|e| e.is_object())
}

fn str_field<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn chip_titles(card: &Value) -> impl Iterator<Item = &str> {
    entries(card, CHIPS).filter_map(|chip| str_field(chip, "title"))
}

pub fn extract_price_per_area(card: &Value) -> Option<i64> {
    let field = entries(card, PRICE_FIELDS).find(|f| {
        str_field(f, "title").is_some_and(|t| t.contains(PER_METER_MARKER))
    })?;
    parse_price(str_field(field, "value")?)
}

pub fn extract_age(card: &Value) -> Option<i64> {
    if chip_titles(card).any(|t| t.contains(NEW_BUILD_MARKER)) {
        return Some(0);
    }
    chip_titles(card)
        .filter(|t| t.contains(YEAR_MARKER))
        .find_map(|t| match first_digit_run(t) {
            Some(run) => digits_to_int(run),
            None => words_to_int(t),
        })
}

/// Only chips are consulted; the upstream does not put the area in
/// `price_fields` consistently enough to trust it.
pub fn extract_size(card: &Value) -> Option<i64> {
    chip_titles(card)
        .filter(|t| AREA_KEYWORDS.iter().any(|k| t.contains(k)))
        .find_map(|t| {
            digits_to_int(t)
                .filter(|n| *n != 0)
                .or_else(|| words_to_int(t))
        })
}

pub fn extract_listing(record: &Value) -> ParsedListing {
    let card = card_of(record);
    ParsedListing {
        identity: ListingIdentity::of(record),
        title: str_field(card, "title").map(str::to_string),
        price_per_sqm: extract_price_per_area(card),
        age: extract_age(card),
        size: extract_size(card),
    }
}
