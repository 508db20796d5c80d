//! JSON Pointer and JSON Patch types
//!
//! Patches are ordered sequences of structural operations against the
//! dataset tree. Only three operations exist: `add`, `remove` and `replace`
//! (RFC 6902 semantics). Paths are RFC 6901 JSON Pointers.
//!
//! A patch is valid against a document exactly when applying its operations
//! in order succeeds without a structural error.

use crate::error::InvalidPatchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// JsonPointer
// =============================================================================

/// Error type for JSON Pointer parsing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PointerParseError {
    /// Non-empty pointer not starting with `/`
    #[error("pointer must be empty or start with '/': {0:?}")]
    MissingLeadingSlash(String),
    /// `~` not followed by `0` or `1`
    #[error("invalid escape in pointer token {0:?}")]
    InvalidEscape(String),
}

/// An RFC 6901 JSON Pointer
///
/// Stored as unescaped reference tokens; `~0`/`~1` escaping only exists in
/// the textual form.
///
/// ```
/// use periodo_core::json::JsonPointer;
///
/// let p: JsonPointer = "/authorities/a~1b/periods".parse().unwrap();
/// assert_eq!(p.tokens(), &["authorities", "a/b", "periods"]);
/// assert_eq!(p.to_string(), "/authorities/a~1b/periods");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JsonPointer {
    tokens: Vec<String>,
}

impl JsonPointer {
    /// The whole document
    pub fn root() -> Self {
        JsonPointer { tokens: Vec::new() }
    }

    /// Build from unescaped tokens
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        JsonPointer {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Unescaped reference tokens
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether this points at the whole document
    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Append a token
    pub fn push(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self
    }

    /// Pointer to the containing value, `None` for the root
    pub fn parent(&self) -> Option<JsonPointer> {
        if self.is_root() {
            return None;
        }
        Some(JsonPointer {
            tokens: self.tokens[..self.tokens.len() - 1].to_vec(),
        })
    }

    /// Last token, `None` for the root
    pub fn last(&self) -> Option<&str> {
        self.tokens.last().map(String::as_str)
    }

    /// Rewrite every token through `f`
    pub fn map_tokens(&self, mut f: impl FnMut(&str) -> String) -> JsonPointer {
        JsonPointer {
            tokens: self.tokens.iter().map(|t| f(t.as_str())).collect(),
        }
    }
}

fn unescape(token: &str) -> Result<String, PointerParseError> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return Err(PointerParseError::InvalidEscape(token.to_string())),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

impl FromStr for JsonPointer {
    type Err = PointerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(JsonPointer::root());
        }
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| PointerParseError::MissingLeadingSlash(s.to_string()))?;
        let tokens = rest.split('/').map(unescape).collect::<Result<_, _>>()?;
        Ok(JsonPointer { tokens })
    }
}

impl TryFrom<String> for JsonPointer {
    type Error = PointerParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JsonPointer> for String {
    fn from(value: JsonPointer) -> Self {
        value.to_string()
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", escape(token))?;
        }
        Ok(())
    }
}

// =============================================================================
// PatchOp
// =============================================================================

/// One structural operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert a value (object member, array element) or replace the root
    Add {
        /// Target location
        path: JsonPointer,
        /// Value to insert
        value: Value,
    },
    /// Remove an existing value
    Remove {
        /// Target location
        path: JsonPointer,
    },
    /// Replace an existing value
    Replace {
        /// Target location
        path: JsonPointer,
        /// Replacement value
        value: Value,
    },
}

impl PatchOp {
    /// Location this operation targets
    pub fn path(&self) -> &JsonPointer {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Remove { path } | PatchOp::Replace { path, .. } => {
                path
            }
        }
    }

    /// Value carried by `add`/`replace`
    pub fn value(&self) -> Option<&Value> {
        match self {
            PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => Some(value),
            PatchOp::Remove { .. } => None,
        }
    }

    /// Whether this is a `remove`
    pub fn is_remove(&self) -> bool {
        matches!(self, PatchOp::Remove { .. })
    }

    /// Apply to `doc` in place
    pub fn apply(&self, doc: &mut Value) -> Result<(), String> {
        match self {
            PatchOp::Add { path, value } => add_at(doc, path, value.clone()),
            PatchOp::Remove { path } => remove_at(doc, path).map(|_| ()),
            PatchOp::Replace { path, value } => replace_at(doc, path, value.clone()),
        }
    }
}

// =============================================================================
// Path Operations
// =============================================================================

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Array index token: decimal digits without leading zeros
fn parse_index(token: &str) -> Option<usize> {
    if token.is_empty() || (token.len() > 1 && token.starts_with('0')) {
        return None;
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Get value at pointer
pub fn get<'a>(doc: &'a Value, path: &JsonPointer) -> Option<&'a Value> {
    let mut current = doc;
    for token in path.tokens() {
        current = match current {
            Value::Object(map) => map.get(token)?,
            Value::Array(arr) => arr.get(parse_index(token)?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn get_mut<'a>(doc: &'a mut Value, tokens: &[String]) -> Result<&'a mut Value, String> {
    let mut current = doc;
    for token in tokens {
        current = match current {
            Value::Object(map) => map
                .get_mut(token)
                .ok_or_else(|| format!("member '{}' not found", token))?,
            Value::Array(arr) => {
                let len = arr.len();
                let idx = parse_index(token).ok_or_else(|| format!("invalid array index '{}'", token))?;
                arr.get_mut(idx)
                    .ok_or_else(|| format!("index {} out of bounds (len {})", idx, len))?
            }
            other => return Err(format!("cannot descend into {}", type_name(other))),
        };
    }
    Ok(current)
}

fn split_last(path: &JsonPointer) -> Option<(&[String], &str)> {
    let tokens = path.tokens();
    let (last, parent) = tokens.split_last()?;
    Some((parent, last.as_str()))
}

fn add_at(doc: &mut Value, path: &JsonPointer, value: Value) -> Result<(), String> {
    let Some((parent, last)) = split_last(path) else {
        *doc = value;
        return Ok(());
    };
    match get_mut(doc, parent)? {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(arr) => {
            if last == "-" {
                arr.push(value);
                return Ok(());
            }
            let idx = parse_index(last).ok_or_else(|| format!("invalid array index '{}'", last))?;
            if idx > arr.len() {
                return Err(format!("index {} out of bounds (len {})", idx, arr.len()));
            }
            arr.insert(idx, value);
            Ok(())
        }
        other => Err(format!("cannot add a member to {}", type_name(other))),
    }
}

fn remove_at(doc: &mut Value, path: &JsonPointer) -> Result<Value, String> {
    let Some((parent, last)) = split_last(path) else {
        return Err("cannot remove the document root".to_string());
    };
    match get_mut(doc, parent)? {
        Value::Object(map) => map
            .remove(last)
            .ok_or_else(|| format!("member '{}' not found", last)),
        Value::Array(arr) => {
            let idx = parse_index(last).ok_or_else(|| format!("invalid array index '{}'", last))?;
            if idx >= arr.len() {
                return Err(format!("index {} out of bounds (len {})", idx, arr.len()));
            }
            Ok(arr.remove(idx))
        }
        other => Err(format!("cannot remove a member of {}", type_name(other))),
    }
}

fn replace_at(doc: &mut Value, path: &JsonPointer, value: Value) -> Result<(), String> {
    let target = get_mut(doc, path.tokens())?;
    *target = value;
    Ok(())
}

// =============================================================================
// Patch
// =============================================================================

/// An ordered sequence of patch operations
///
/// Serializes as a JSON Patch document (a JSON array of operation objects).
///
/// ```
/// use periodo_core::json::Patch;
/// use serde_json::json;
///
/// let patch = Patch::parse(r#"[{"op": "add", "path": "/a", "value": 1}]"#).unwrap();
/// let doc = patch.apply(&json!({})).unwrap();
/// assert_eq!(doc, json!({"a": 1}));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Vec<PatchOp>);

impl Patch {
    /// Wrap operations
    pub fn new(ops: Vec<PatchOp>) -> Self {
        Patch(ops)
    }

    /// Parse patch text
    pub fn parse(text: &str) -> Result<Self, InvalidPatchError> {
        serde_json::from_str(text).map_err(|e| InvalidPatchError::Malformed(e.to_string()))
    }

    /// Parse an already-decoded JSON value
    pub fn from_value(value: Value) -> Result<Self, InvalidPatchError> {
        serde_json::from_value(value).map_err(|e| InvalidPatchError::Malformed(e.to_string()))
    }

    /// Operations in order
    pub fn ops(&self) -> &[PatchOp] {
        &self.0
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the patch has no operations
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical patch text
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    /// Apply every operation in order to `doc`
    ///
    /// Not atomic: on error `doc` may hold a partial result. Use [`Patch::apply`]
    /// to work on a copy.
    pub fn apply_in_place(&self, doc: &mut Value) -> Result<(), InvalidPatchError> {
        for (index, op) in self.0.iter().enumerate() {
            op.apply(doc).map_err(|reason| InvalidPatchError::DoesNotApply {
                index,
                path: op.path().to_string(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Apply to a deep copy of `doc`, leaving it untouched
    pub fn apply(&self, doc: &Value) -> Result<Value, InvalidPatchError> {
        let mut copy = doc.clone();
        self.apply_in_place(&mut copy)?;
        Ok(copy)
    }
}

impl IntoIterator for Patch {
    type Item = PatchOp;
    type IntoIter = std::vec::IntoIter<PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<PatchOp> for Patch {
    fn from_iter<T: IntoIterator<Item = PatchOp>>(iter: T) -> Self {
        Patch(iter.into_iter().collect())
    }
}
