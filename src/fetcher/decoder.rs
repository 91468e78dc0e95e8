use serde_json::Value;

use crate::config::PaginationKeys;
use crate::json_walk::{find_first, is_truthy};

/// Opaque next-page token, written back into the request body verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor(pub Value);

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// Locates listings and the pagination cursor in a response without
/// assuming fixed key names. Neither operation fails: an unrecognized shape
/// yields no records and no cursor.
#[derive(Debug, Clone, Default)]
pub struct ResponsePageDecoder {
    keys: PaginationKeys,
}

impl ResponsePageDecoder {
    pub fn new(keys: PaginationKeys) -> Self {
        Self { keys }
    }

    /// First candidate top-level key holding an array (possibly empty), else
    /// the first array anywhere whose first element is an object.
    pub fn extract_records(&self, response: &Value) -> Vec<Value> {
        if let Some(list) = self
            .keys
            .record_keys
            .iter()
            .find_map(|k| response.get(k.as_str()).and_then(Value::as_array))
        {
            return list.clone();
        }

        find_first(response, |node| {
            node.as_array()
                .and_then(|a| a.first())
                .is_some_and(Value::is_object)
        })
        .and_then(|(_, node)| node.as_array().cloned())
        .unwrap_or_default()
    }

    pub fn extract_cursor(&self, response: &Value) -> Option<Cursor> {
        let top = response.as_object()?;

        let direct = self
            .keys
            .cursor_keys
            .iter()
            .find_map(|k| top.get(k.as_str()).and_then(|v| self.cursor_value(v)));
        if direct.is_some() {
            return direct;
        }

        let meta = self
            .keys
            .meta_containers
            .iter()
            .filter_map(|k| top.get(k.as_str()))
            .find(|v| is_truthy(v))?
            .as_object()?;

        self.keys
            .meta_cursor_keys
            .iter()
            .find_map(|k| meta.get(k.as_str()).and_then(|v| self.cursor_value(v)))
    }

    /// A non-empty scalar, or the first truthy `cursor`/`token` inside an object.
    fn cursor_value(&self, v: &Value) -> Option<Cursor> {
        match v {
            Value::String(_) | Value::Number(_) if is_truthy(v) => Some(Cursor(v.clone())),
            Value::Object(inner) => self
                .keys
                .cursor_subkeys
                .iter()
                .filter_map(|k| inner.get(k.as_str()))
                .find(|sub| is_truthy(sub))
                .map(|sub| Cursor(sub.clone())),
            _ => None,
        }
    }
}
