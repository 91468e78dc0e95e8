//! Localized number parsing: Persian / Arabic-Indic digits and Persian
//! number words.

pub const MILLION_WORD: &str = "میلیون";
pub const BILLION_WORD: &str = "میلیارد";

/// Standalone connector between number words ("یک هزار و پانصد").
const CONNECTOR: &str = "و";

const NUMBER_WORDS: &[(&str, i64)] = &[
    ("صفر", 0),
    ("یک", 1),
    ("دو", 2),
    ("سه", 3),
    ("چهار", 4),
    ("پنج", 5),
    ("شش", 6),
    ("هفت", 7),
    ("هشت", 8),
    ("نه", 9),
    ("ده", 10),
    ("یازده", 11),
    ("دوازده", 12),
    ("سیزده", 13),
    ("چهارده", 14),
    ("پانزده", 15),
    ("شانزده", 16),
    ("هفده", 17),
    ("هجده", 18),
    ("نوزده", 19),
    ("بیست", 20),
    ("سی", 30),
    ("چهل", 40),
    ("پنجاه", 50),
    ("شصت", 60),
    ("هفتاد", 70),
    ("هشتاد", 80),
    ("نود", 90),
    ("صد", 100),
    ("یکصد", 100),
    ("دویست", 200),
    ("سیصد", 300),
    ("چهارصد", 400),
    ("پانصد", 500),
    ("ششصد", 600),
    ("هفتصد", 700),
    ("هشتصد", 800),
    ("نهصد", 900),
    ("هزار", 1_000),
    (MILLION_WORD, 1_000_000),
    (BILLION_WORD, 1_000_000_000),
];

/// Latin equivalent of a Latin, Persian (U+06F0..) or Arabic-Indic (U+0660..) digit.
pub fn latin_digit(c: char) -> Option<char> {
    match c {
        '0'..='9' => Some(c),
        '\u{06F0}'..='\u{06F9}' => char::from_digit(c as u32 - 0x06F0, 10),
        '\u{0660}'..='\u{0669}' => char::from_digit(c as u32 - 0x0660, 10),
        _ => None,
    }
}

/// Transliterates every digit to Latin, drops everything else and parses
/// the rest. `None` when no digit is present or the value overflows.
pub fn digits_to_int(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter_map(latin_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok()
}

/// The first contiguous run of digits (any supported digit set).
pub fn first_digit_run(text: &str) -> Option<&str> {
    let start = text.char_indices().find(|(_, c)| latin_digit(*c).is_some())?.0;
    let end = text[start..]
        .char_indices()
        .find(|(_, c)| latin_digit(*c).is_none())
        .map(|(i, _)| start + i)
        .unwrap_or(text.len());
    Some(&text[start..end])
}

/// Arabic-script variants the upstream mixes in for yeh and kaf.
fn normalize_letters(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{064A}' => '\u{06CC}',
            '\u{0643}' => '\u{06A9}',
            '-' | '\u{200C}' => ' ',
            other => other,
        })
        .collect()
}

fn word_value(token: &str) -> Option<i64> {
    NUMBER_WORDS.iter().find(|(w, _)| *w == token).map(|(_, v)| *v)
}

/// Spelled-out Persian number to integer.
///
/// Values below 1000 add into a pending sub-total; a scale word (>= 1000)
/// multiplies the pending sub-total (at least 1) and flushes it into the
/// total. Unknown tokens are ignored. A zero total is reported as `None`,
/// since it cannot be told apart from "nothing parsed".
pub fn words_to_int(text: &str) -> Option<i64> {
    let normalized = normalize_letters(text);
    let mut total: i64 = 0;
    let mut pending: i64 = 0;

    for token in normalized.split_whitespace() {
        if token == CONNECTOR {
            continue;
        }
        let Some(value) = word_value(token) else { continue };
        if value >= 1_000 {
            total = total.checked_add(pending.max(1).checked_mul(value)?)?;
            pending = 0;
        } else {
            pending = pending.checked_add(value)?;
        }
    }

    total = total.checked_add(pending)?;
    (total != 0).then_some(total)
}

/// Price text to integer: digits first, then words, then scaled by the
/// billion / million unit word if the text carries one.
pub fn parse_price(text: &str) -> Option<i64> {
    if text.trim().is_empty() {
        return None;
    }
    let base = digits_to_int(text).or_else(|| words_to_int(text))?;
    let scale = if text.contains(BILLION_WORD) {
        1_000_000_000
    } else if text.contains(MILLION_WORD) {
        1_000_000
    } else {
        1
    };
    base.checked_mul(scale)
}
