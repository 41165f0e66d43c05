//! Keyword - interned symbolic identifier
//!
//! Attributes and idents are named by keywords such as `:person/name` or
//! `:db/add`. A keyword has an optional namespace and a name; the textual
//! form always starts with a colon.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Symbolic identifier with an optional namespace.
///
/// Ordering is namespace-first, then name, both lexicographic.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Keyword {
    /// Namespace part, e.g. `person` in `:person/name`
    pub ns: Option<String>,
    /// Name part, e.g. `name` in `:person/name`
    pub name: String,
}

impl Keyword {
    /// Create a namespaced keyword
    pub fn new(ns: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ns: Some(ns.into()),
            name: name.into(),
        }
    }

    /// Create a plain (un-namespaced) keyword
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            ns: None,
            name: name.into(),
        }
    }

    /// Parse a keyword literal, with or without the leading colon.
    pub fn parse(s: &str) -> Result<Self> {
        let body = s.strip_prefix(':').unwrap_or(s);
        if body.is_empty() || body.starts_with('/') || body.ends_with('/') {
            return Err(Error::InvalidKeyword(s.to_string()));
        }
        match body.split_once('/') {
            Some((ns, name)) => {
                if name.contains('/') {
                    return Err(Error::InvalidKeyword(s.to_string()));
                }
                Ok(Keyword::new(ns, name))
            }
            None => Ok(Keyword::plain(body)),
        }
    }

    /// Reverse-reference form: `:person/_friend` navigates incoming refs.
    ///
    /// Returns the forward keyword if this is a reverse ref, None otherwise.
    pub fn forward(&self) -> Option<Keyword> {
        self.name.strip_prefix('_').map(|fwd| Keyword {
            ns: self.ns.clone(),
            name: fwd.to_string(),
        })
    }

    /// True if this keyword is a reverse reference (`:ns/_name`)
    pub fn is_reverse(&self) -> bool {
        self.name.starts_with('_')
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, ":{}/{}", ns, self.name),
            None => write!(f, ":{}", self.name),
        }
    }
}

impl FromStr for Keyword {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Keyword::parse(s)
    }
}

/// Shorthand constructor used throughout tests and call sites.
pub fn kw(s: &str) -> Keyword {
    Keyword::parse(s).expect("invalid keyword literal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let k = kw(":person/name");
        assert_eq!(k.ns.as_deref(), Some("person"));
        assert_eq!(k.name, "name");
        assert_eq!(k.to_string(), ":person/name");

        let p = kw(":age");
        assert!(p.ns.is_none());
        assert_eq!(p.to_string(), ":age");
    }

    #[test]
    fn test_reverse_ref() {
        let rev = kw(":person/_friend");
        assert!(rev.is_reverse());
        assert_eq!(rev.forward().unwrap(), kw(":person/friend"));
        assert!(!kw(":person/friend").is_reverse());
    }

    #[test]
    fn test_invalid() {
        assert!(Keyword::parse(":").is_err());
        assert!(Keyword::parse(":/name").is_err());
        assert!(Keyword::parse(":a/b/c").is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(kw(":a/x") < kw(":b/x"));
        assert!(kw(":a/x") < kw(":a/y"));
        assert!(kw(":x") < kw(":a/x")); // None namespace sorts first
    }
}
