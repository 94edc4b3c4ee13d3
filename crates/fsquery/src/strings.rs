//! Reference-counted name and path strings.
//!
//! Directory and file names repeat heavily across a watched tree
//! ("Cargo.toml", ".gitignore"), and full paths are copied into pending
//! items, watcher registrations and query results. `StringRef` makes those
//! copies a refcount bump: clone is cheap, equality and hashing are by
//! content.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A cheaply copyable, content-equal byte-string reference.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StringRef(Arc<str>);

impl StringRef {
    #[inline]
    pub fn new(value: &str) -> Self {
        Self(Arc::from(value))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the lowercase substring after the final `.` in this name.
    ///
    /// Names with no dot, or nothing after the dot, have no suffix.
    pub fn suffix(&self) -> Option<StringRef> {
        let name = self.as_str();
        let dot = name.rfind('.')?;
        let tail = &name[dot + 1..];
        if tail.is_empty() {
            return None;
        }
        Some(StringRef(Arc::from(tail.to_ascii_lowercase())))
    }
}

impl Deref for StringRef {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for StringRef {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StringRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StringRef {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for StringRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StringRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl serde::Serialize for StringRef {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for StringRef {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from(value))
    }
}

impl PartialEq<str> for StringRef {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for StringRef {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
