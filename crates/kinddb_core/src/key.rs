//! Entity keys.
//!
//! A key names one stored entity: an app, a namespace and a path of
//! `(kind, id)` pairs from the root ancestor down to the entity itself.
//! Keys are plain values; the datastore mints ids for incomplete keys but
//! never changes a complete one.

use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use kinddb_codec::{CodecError, CodecResult, Decode, Encode, Value};
use std::fmt;

/// Longest kind or string id accepted, in bytes.
pub const MAX_KEY_PART_BYTES: usize = 1500;

/// Identifier of one path element.
///
/// Integer ids sort before string ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyId {
    /// Positive numeric id, usually allocated by the datastore.
    Int(i64),
    /// Application-chosen name.
    Name(String),
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        KeyId::Int(id)
    }
}

impl From<i32> for KeyId {
    fn from(id: i32) -> Self {
        KeyId::Int(i64::from(id))
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        KeyId::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        KeyId::Name(name)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Int(id) => write!(f, "{id}"),
            KeyId::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// One `(kind, id)` step of a key path. `id` is `None` only for the last
/// element of an incomplete key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathElement {
    kind: String,
    id: Option<KeyId>,
}

impl PathElement {
    /// Kind of this element.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Id of this element, if assigned.
    pub fn id(&self) -> Option<&KeyId> {
        self.id.as_ref()
    }

    fn validated(kind: String, id: Option<KeyId>) -> CoreResult<Self> {
        if kind.is_empty() {
            return Err(CoreError::bad_argument("key kind must not be empty"));
        }
        if kind.len() > MAX_KEY_PART_BYTES {
            return Err(CoreError::bad_argument(format!(
                "key kind longer than {MAX_KEY_PART_BYTES} bytes"
            )));
        }
        match &id {
            Some(KeyId::Int(n)) if *n <= 0 => {
                return Err(CoreError::bad_argument(format!(
                    "integer key id must be positive, got {n}"
                )));
            }
            Some(KeyId::Name(name)) if name.is_empty() => {
                return Err(CoreError::bad_argument("key name must not be empty"));
            }
            Some(KeyId::Name(name)) if name.len() > MAX_KEY_PART_BYTES => {
                return Err(CoreError::bad_argument(format!(
                    "key name longer than {MAX_KEY_PART_BYTES} bytes"
                )));
            }
            _ => {}
        }
        Ok(Self { kind, id })
    }
}

/// Identifier for a stored entity.
///
/// Ordering is by app, namespace, then path element by element, so a
/// parent sorts directly before its descendants.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    app: String,
    namespace: String,
    path: Vec<PathElement>,
}

impl Key {
    /// Creates a root key.
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> CoreResult<Self> {
        Ok(Self {
            app: String::new(),
            namespace: String::new(),
            path: vec![PathElement::validated(kind.into(), Some(id.into()))?],
        })
    }

    /// Creates a key under `parent`.
    pub fn with_parent(
        kind: impl Into<String>,
        id: impl Into<KeyId>,
        parent: &Key,
    ) -> CoreResult<Self> {
        parent.child(PathElement::validated(kind.into(), Some(id.into()))?)
    }

    /// Creates a key with no id yet, optionally under `parent`.
    ///
    /// The datastore assigns a numeric id when an entity with this key is
    /// put.
    pub fn incomplete(kind: impl Into<String>, parent: Option<&Key>) -> CoreResult<Self> {
        let element = PathElement::validated(kind.into(), None)?;
        match parent {
            Some(parent) => parent.child(element),
            None => Ok(Self {
                app: String::new(),
                namespace: String::new(),
                path: vec![element],
            }),
        }
    }

    /// Creates a key from a flat list of `(kind, id)` pairs, root first.
    ///
    /// ```
    /// use kinddb_core::Key;
    ///
    /// let flat = Key::from_pairs([("Account", "sandy@example.com".into()), ("Message", 123.into())]).unwrap();
    /// let nested = Key::with_parent("Message", 123, &Key::new("Account", "sandy@example.com").unwrap()).unwrap();
    /// assert_eq!(flat, nested);
    /// ```
    pub fn from_pairs<K: Into<String>>(
        pairs: impl IntoIterator<Item = (K, KeyId)>,
    ) -> CoreResult<Self> {
        let path = pairs
            .into_iter()
            .map(|(kind, id)| PathElement::validated(kind.into(), Some(id)))
            .collect::<CoreResult<Vec<_>>>()?;
        if path.is_empty() {
            return Err(CoreError::bad_argument("key path must not be empty"));
        }
        Ok(Self {
            app: String::new(),
            namespace: String::new(),
            path,
        })
    }

    /// Returns this key placed in `app`.
    #[must_use]
    pub fn in_app(mut self, app: impl Into<String>) -> Self {
        self.app = app.into();
        self
    }

    /// Returns this key placed in `namespace`.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn child(&self, element: PathElement) -> CoreResult<Self> {
        if !self.is_complete() {
            return Err(CoreError::bad_argument(format!(
                "parent key {self} is incomplete"
            )));
        }
        let mut path = self.path.clone();
        path.push(element);
        Ok(Self {
            app: self.app.clone(),
            namespace: self.namespace.clone(),
            path,
        })
    }

    /// Completes an incomplete key with `id`.
    pub fn with_id(&self, id: impl Into<KeyId>) -> CoreResult<Self> {
        let mut key = self.clone();
        let last = key.last_mut();
        *last = PathElement::validated(last.kind.clone(), Some(id.into()))?;
        Ok(key)
    }

    fn last(&self) -> &PathElement {
        // Path is non-empty by construction.
        &self.path[self.path.len() - 1]
    }

    fn last_mut(&mut self) -> &mut PathElement {
        let idx = self.path.len() - 1;
        &mut self.path[idx]
    }

    /// App the key belongs to.
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Namespace the key belongs to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Kind of the entity this key names.
    pub fn kind(&self) -> &str {
        &self.last().kind
    }

    /// Id of the entity, if assigned.
    pub fn id(&self) -> Option<&KeyId> {
        self.last().id.as_ref()
    }

    /// Numeric id, if the id is an integer.
    pub fn integer_id(&self) -> Option<i64> {
        match self.id() {
            Some(KeyId::Int(n)) => Some(*n),
            _ => None,
        }
    }

    /// String id, if the id is a name.
    pub fn string_id(&self) -> Option<&str> {
        match self.id() {
            Some(KeyId::Name(name)) => Some(name),
            _ => None,
        }
    }

    /// Path from root to this key.
    pub fn pairs(&self) -> &[PathElement] {
        &self.path
    }

    /// Whether the last element has an id.
    pub fn is_complete(&self) -> bool {
        self.last().id.is_some()
    }

    /// Parent key, or `None` for a root key.
    pub fn parent(&self) -> Option<Key> {
        (self.path.len() > 1).then(|| Key {
            app: self.app.clone(),
            namespace: self.namespace.clone(),
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    /// Root ancestor (the key itself for a root key).
    pub fn root(&self) -> Key {
        Key {
            app: self.app.clone(),
            namespace: self.namespace.clone(),
            path: vec![self.path[0].clone()],
        }
    }

    /// True when `other` is this key or one of its descendants.
    pub fn is_ancestor_of(&self, other: &Key) -> bool {
        self.app == other.app
            && self.namespace == other.namespace
            && other.path.len() >= self.path.len()
            && other.path[..self.path.len()] == self.path[..]
    }

    /// Canonical binary form of the key.
    pub fn serialized(&self) -> Vec<u8> {
        self.encode()
    }

    /// Parses the canonical binary form.
    pub fn from_serialized(bytes: &[u8]) -> CoreResult<Self> {
        let key = Self::decode(bytes)?;
        key.check_path()?;
        Ok(key)
    }

    /// Portable string form: URL-safe base64 of `serialized()`, no padding.
    pub fn urlsafe(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.serialized())
    }

    /// Parses a string produced by [`Key::urlsafe`]. Trailing `=` padding is
    /// accepted.
    pub fn from_urlsafe(urlsafe: &str) -> CoreResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(urlsafe.trim_end_matches('='))
            .map_err(|e| CoreError::bad_argument(format!("invalid urlsafe key: {e}")))?;
        Self::from_serialized(&bytes)
    }

    fn check_path(&self) -> CoreResult<()> {
        if self.path.is_empty() {
            return Err(CoreError::bad_argument("key path must not be empty"));
        }
        let inner = &self.path[..self.path.len() - 1];
        if inner.iter().any(|e| e.id.is_none()) {
            return Err(CoreError::bad_argument(
                "only the last key element may be incomplete",
            ));
        }
        for element in &self.path {
            PathElement::validated(element.kind.clone(), element.id.clone())?;
        }
        Ok(())
    }
}

impl Encode for Key {
    fn to_value(&self) -> Value {
        let path = self
            .path
            .iter()
            .map(|e| {
                let id = match &e.id {
                    Some(KeyId::Int(n)) => Value::Integer(*n),
                    Some(KeyId::Name(name)) => Value::Text(name.clone()),
                    None => Value::Null,
                };
                Value::Array(vec![Value::Text(e.kind.clone()), id])
            })
            .collect();
        Value::text_map([
            ("app", Value::Text(self.app.clone())),
            ("ns", Value::Text(self.namespace.clone())),
            ("path", Value::Array(path)),
        ])
    }
}

impl Decode for Key {
    fn from_value(value: &Value) -> CodecResult<Self> {
        let path = value
            .array_field("path")?
            .iter()
            .map(|element| match element.as_array() {
                Some([Value::Text(kind), id]) => {
                    let id = match id {
                        Value::Integer(n) => Some(KeyId::Int(*n)),
                        Value::Text(name) => Some(KeyId::Name(name.clone())),
                        Value::Null => None,
                        _ => return Err(CodecError::unexpected_shape("path id", "int, text or null")),
                    };
                    Ok(PathElement {
                        kind: kind.clone(),
                        id,
                    })
                }
                _ => Err(CodecError::unexpected_shape("path", "[kind, id] pairs")),
            })
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(Self {
            app: value.text_field("app")?.to_string(),
            namespace: value.text_field("ns")?.to_string(),
            path,
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(")?;
        for (i, element) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{}', ", element.kind)?;
            match &element.id {
                Some(id) => write!(f, "{id}")?,
                None => write!(f, "None")?,
            }
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
