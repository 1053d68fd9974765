//! Cache Key Module
//!
//! Heterogeneous keys: plain strings compared by value, opaque tokens and
//! object identities compared by identity only.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, Result};

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

// == Key Kind ==
/// Category of a key. Decides which liveness mechanism an entry gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Plain,
    Token,
    Object,
}

// == Token ==
/// An opaque unique token. Equal only to itself and its clones.
#[derive(Clone)]
pub struct Token {
    id: u64,
    description: Option<Arc<str>>,
}

impl Token {
    /// Creates a fresh token, distinct from every other token.
    pub fn new() -> Self {
        Self {
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
            description: None,
        }
    }

    /// Creates a fresh token carrying a description for debugging.
    ///
    /// Two tokens with the same description are still distinct.
    pub fn with_description(description: impl Into<Arc<str>>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::new()
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "Token({description})"),
            None => write!(f, "Token(#{})", self.id),
        }
    }
}

// == Object Key ==
/// An object identity key. Clones share the identity; two separately
/// allocated objects never compare equal, whatever their contents.
#[derive(Clone)]
pub struct ObjectKey(Arc<dyn Any + Send + Sync>);

impl ObjectKey {
    /// Allocates a new object and uses its identity as the key.
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self(Arc::new(object))
    }

    /// Uses the identity of an existing shared object as the key.
    pub fn from_arc<T: Any + Send + Sync>(object: Arc<T>) -> Self {
        Self(object)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for ObjectKey {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for ObjectKey {}

impl Hash for ObjectKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({:#x})", self.addr())
    }
}

// == Cache Key ==
/// A key of any supported category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Plain(Arc<str>),
    Token(Token),
    Object(ObjectKey),
}

impl CacheKey {
    // == Classify ==
    /// Returns the category of this key. Never changes for a given key.
    pub fn kind(&self) -> KeyKind {
        match self {
            CacheKey::Plain(_) => KeyKind::Plain,
            CacheKey::Token(_) => KeyKind::Token,
            CacheKey::Object(_) => KeyKind::Object,
        }
    }

    // == Validate ==
    /// Rejects plain keys that are empty or longer than [`MAX_KEY_LENGTH`].
    pub fn validate(&self) -> Result<()> {
        if let CacheKey::Plain(key) = self {
            if key.is_empty() {
                return Err(CacheError::InvalidKey("Key must not be empty".to_string()));
            }
            if key.len() > MAX_KEY_LENGTH {
                return Err(CacheError::InvalidKey(format!(
                    "Key exceeds maximum length of {} bytes",
                    MAX_KEY_LENGTH
                )));
            }
        }
        Ok(())
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey::Plain(Arc::from(key))
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey::Plain(Arc::from(key))
    }
}

impl From<Token> for CacheKey {
    fn from(token: Token) -> Self {
        CacheKey::Token(token)
    }
}

impl From<&Token> for CacheKey {
    fn from(token: &Token) -> Self {
        CacheKey::Token(token.clone())
    }
}

impl From<ObjectKey> for CacheKey {
    fn from(key: ObjectKey) -> Self {
        CacheKey::Object(key)
    }
}

impl From<&ObjectKey> for CacheKey {
    fn from(key: &ObjectKey) -> Self {
        CacheKey::Object(key.clone())
    }
}

impl From<&CacheKey> for CacheKey {
    fn from(key: &CacheKey) -> Self {
        key.clone()
    }
}
