//! Capability Registry
//!
//! A registry maps declarative patterns to constructors. It is used twice:
//!
//! - **Sensor drivers**, keyed on an [`IdentityPattern`] (manufacturer + model regexes)
//!   matched against an [`EquipmentRecord`].
//! - **Validators**, keyed on a [`NamePattern`] (exact, case-insensitive name)
//!   matched against the name given in the configuration.
//!
//! # Resolution rules
//!
//! - Entries are tried in registration order and the first match wins.
//! - Only the matching entry's constructor runs.
//! - A query nothing matches fails with [`LoggerError::NoMatch`]; there is no fallback.
//!
//! Registries are built once by explicit initialization functions
//! (`sensors::builtin_registry`, `validators::builtin_registry`) and are never mutated
//! after startup. New instrument types or policies are added by calling
//! [`Registry::register`] during that initialization, without touching the polling loop.
//!
//! # Example
//!
//! ```
//! use lab_logger::registry::{NamePattern, Registry};
//!
//! let mut registry: Registry<str, (), &'static str> = Registry::new("greeting");
//! registry.register(NamePattern::new("hello"), |_, _| Ok("hi"));
//!
//! assert_eq!(registry.resolve("HELLO", &()).unwrap(), "hi");
//! assert!(registry.resolve("goodbye", &()).is_err());
//! ```

use crate::error::{AppResult, LoggerError};
use crate::identity::EquipmentRecord;
use regex::{Regex, RegexBuilder};
use std::fmt;

/// Decides whether a registry entry applies to a query
pub trait Pattern<Q: ?Sized>: fmt::Display + Send + Sync {
    /// Whether `query` is a match
    fn matches(&self, query: &Q) -> bool;
}

struct Entry<Q: ?Sized, A, T> {
    pattern: Box<dyn Pattern<Q>>,
    constructor: Box<dyn Fn(&Q, &A) -> AppResult<T> + Send + Sync>,
}

/// Ordered pattern → constructor table
///
/// * `Q` - the query type patterns are matched against
/// * `A` - extra construction arguments handed to the constructor
/// * `T` - the constructed instance
pub struct Registry<Q: ?Sized, A, T> {
    kind: &'static str,
    entries: Vec<Entry<Q, A, T>>,
}

impl<Q, A, T> Registry<Q, A, T>
where
    Q: ?Sized + fmt::Display,
{
    /// Create an empty registry; `kind` names what it builds in error messages
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Append an entry. Later entries only win when no earlier entry matches.
    pub fn register<P, F>(&mut self, pattern: P, constructor: F)
    where
        P: Pattern<Q> + 'static,
        F: Fn(&Q, &A) -> AppResult<T> + Send + Sync + 'static,
    {
        self.entries.push(Entry {
            pattern: Box::new(pattern),
            constructor: Box::new(constructor),
        });
    }

    /// Build the instance for the first entry whose pattern matches `query`.
    ///
    /// # Errors
    /// - [`LoggerError::NoMatch`] if no pattern matches (nothing is constructed)
    /// - whatever the matching constructor returns
    pub fn resolve(&self, query: &Q, args: &A) -> AppResult<T> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.pattern.matches(query))
            .ok_or_else(|| LoggerError::NoMatch {
                kind: self.kind,
                query: query.to_string(),
            })?;
        (entry.constructor)(query, args)
    }

    /// Whether some entry matches `query`
    pub fn contains(&self, query: &Q) -> bool {
        self.entries.iter().any(|entry| entry.pattern.matches(query))
    }

    /// Pattern descriptions in registration order
    pub fn patterns(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.pattern.to_string()).collect()
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Identity Patterns
// =============================================================================

/// Manufacturer/model matcher for sensor drivers
///
/// Each sub-pattern is a regular expression searched anywhere in the corresponding
/// record field. Case-insensitive unless built otherwise. A pattern with neither
/// sub-pattern never matches, so an entry cannot become an accidental catch-all.
#[derive(Debug, Clone)]
pub struct IdentityPattern {
    manufacturer: Option<Regex>,
    model: Option<Regex>,
}

impl IdentityPattern {
    /// Start building a pattern
    pub fn builder() -> IdentityPatternBuilder {
        IdentityPatternBuilder {
            manufacturer: None,
            model: None,
            case_insensitive: true,
        }
    }
}

impl Pattern<EquipmentRecord> for IdentityPattern {
    fn matches(&self, record: &EquipmentRecord) -> bool {
        if self.manufacturer.is_none() && self.model.is_none() {
            return false;
        }
        if let Some(re) = &self.manufacturer {
            if !re.is_match(&record.manufacturer) {
                return false;
            }
        }
        if let Some(re) = &self.model {
            if !re.is_match(&record.model) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for IdentityPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |re: &Option<Regex>| re.as_ref().map_or("*".to_string(), |r| r.as_str().to_string());
        write!(f, "manufacturer={} model={}", part(&self.manufacturer), part(&self.model))
    }
}

/// Builder for [`IdentityPattern`]
#[derive(Debug, Clone)]
pub struct IdentityPatternBuilder {
    manufacturer: Option<String>,
    model: Option<String>,
    case_insensitive: bool,
}

impl IdentityPatternBuilder {
    /// Regex the manufacturer must contain a match for
    pub fn manufacturer(mut self, pattern: &str) -> Self {
        self.manufacturer = Some(pattern.to_string());
        self
    }

    /// Regex the model number must contain a match for
    pub fn model(mut self, pattern: &str) -> Self {
        self.model = Some(pattern.to_string());
        self
    }

    /// Toggle case-insensitive matching (default: on)
    pub fn case_insensitive(mut self, enabled: bool) -> Self {
        self.case_insensitive = enabled;
        self
    }

    /// Compile the sub-patterns
    ///
    /// # Errors
    /// Returns `Configuration` if a sub-pattern is not a valid regex
    pub fn build(self) -> AppResult<IdentityPattern> {
        let compile = |pattern: Option<String>| -> AppResult<Option<Regex>> {
            pattern
                .map(|p| {
                    RegexBuilder::new(&p)
                        .case_insensitive(self.case_insensitive)
                        .build()
                        .map_err(|e| LoggerError::Configuration(format!("invalid pattern '{p}': {e}")))
                })
                .transpose()
        };
        Ok(IdentityPattern {
            manufacturer: compile(self.manufacturer.clone())?,
            model: compile(self.model.clone())?,
        })
    }
}

// =============================================================================
// Name Patterns
// =============================================================================

/// Exact, case-insensitive name match (validator lookup)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern(String);

impl NamePattern {
    /// Match `name` regardless of case
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }
}

impl Pattern<str> for NamePattern {
    fn matches(&self, name: &str) -> bool {
        name.to_lowercase() == self.0
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
