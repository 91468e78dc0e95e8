//! Generic traversal over `serde_json::Value` for schema-less payloads.
//!
//! Traversal order is pre-order depth-first: a node is tested before its
//! children, object entries are visited in insertion order and arrays in
//! index order.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonPath(Vec<PathSegment>);

impl JsonPath {
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Self {
        Self(keys.iter().map(|k| PathSegment::Key(k.as_ref().to_string())).collect())
    }
}

impl std::fmt::Display for JsonPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("$")?;
        for seg in &self.0 {
            match seg {
                PathSegment::Key(k) => write!(f, ".{k}")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

/// First node (root included) matching `pred`, with its path.
pub fn find_first<'a, P>(value: &'a Value, pred: P) -> Option<(JsonPath, &'a Value)>
where
    P: Fn(&Value) -> bool,
{
    let mut hits = Vec::new();
    walk(value, &mut Vec::new(), &pred, true, &mut hits);
    hits.into_iter().next()
}

/// Paths of every node matching `pred`, in traversal order.
pub fn find_all<P>(value: &Value, pred: P) -> Vec<JsonPath>
where
    P: Fn(&Value) -> bool,
{
    let mut hits = Vec::new();
    walk(value, &mut Vec::new(), &pred, false, &mut hits);
    hits.into_iter().map(|(path, _)| path).collect()
}

fn walk<'a>(
    value: &'a Value,
    path: &mut Vec<PathSegment>,
    pred: &dyn Fn(&Value) -> bool,
    first_only: bool,
    hits: &mut Vec<(JsonPath, &'a Value)>,
) {
    if pred(value) {
        hits.push((JsonPath(path.clone()), value));
        if first_only {
            return;
        }
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                path.push(PathSegment::Key(key.clone()));
                walk(child, path, pred, first_only, hits);
                path.pop();
                if first_only && !hits.is_empty() {
                    return;
                }
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                path.push(PathSegment::Index(idx));
                walk(child, path, pred, first_only, hits);
                path.pop();
                if first_only && !hits.is_empty() {
                    return;
                }
            }
        }
        _ => {}
    }
}

pub fn get_path<'a>(value: &'a Value, path: &JsonPath) -> Option<&'a Value> {
    path.0.iter().try_fold(value, |node, seg| match seg {
        PathSegment::Key(k) => node.get(k.as_str()),
        PathSegment::Index(i) => node.get(*i),
    })
}

pub fn get_path_mut<'a>(value: &'a mut Value, path: &JsonPath) -> Option<&'a mut Value> {
    path.0.iter().try_fold(value, |node, seg| match seg {
        PathSegment::Key(k) => node.get_mut(k.as_str()),
        PathSegment::Index(i) => node.get_mut(*i),
    })
}

/// Writes `key = value` into the first candidate container that exists and
/// is an object. Returns the container path used, or `None` when no
/// candidate resolves, in which case `body` is left untouched.
pub fn set_at_first_existing_path(
    body: &mut Value,
    candidates: &[JsonPath],
    key: &str,
    value: Value,
) -> Option<JsonPath> {
    let target = candidates
        .iter()
        .find(|path| get_path(body, path).is_some_and(Value::is_object))?
        .clone();
    let container = get_path_mut(body, &target)?.as_object_mut()?;
    container.insert(key.to_string(), value);
    Some(target)
}

/// Truthiness as the upstream payloads use it: null, false, 0, "" and empty
/// containers are all "absent".
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
