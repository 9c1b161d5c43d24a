// src/options/mod.rs

//! Recipe options
//!
//! Options are recipe-declared toggles or enumerated choices such as
//! `shared`, `fPIC` or `header_only`. A recipe declares each option's legal
//! domain and default; profiles and the command line may override values.
//! Options are mutable only until the configure phase completes, at which
//! point they are frozen and every later mutation fails.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single option value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Str(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Str(s) => parse_bool(s),
        }
    }

    /// Loose equality: `true` matches `"True"`, strings compare exactly
    pub fn matches(&self, other: &OptionValue) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bool(b), Self::Str(s)) | (Self::Str(s), Self::Bool(b)) => {
                parse_bool(s) == Some(*b)
            }
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Legal values of one option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionDomain {
    /// `values = "ANY"`
    Any(AnyMarker),
    /// `values = [true, false]` or `values = ["fast", "safe"]`
    Values(Vec<OptionValue>),
}

/// The literal string `ANY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnyMarker {
    #[serde(rename = "ANY")]
    Any,
}

impl OptionDomain {
    pub fn any() -> Self {
        Self::Any(AnyMarker::Any)
    }

    pub fn boolean() -> Self {
        Self::Values(vec![OptionValue::Bool(true), OptionValue::Bool(false)])
    }

    pub fn contains(&self, value: &OptionValue) -> bool {
        match self {
            Self::Any(_) => true,
            Self::Values(values) => values.iter().any(|v| v.matches(value)),
        }
    }

    pub fn is_boolean(&self) -> bool {
        match self {
            Self::Any(_) => false,
            Self::Values(values) => {
                !values.is_empty() && values.iter().all(|v| matches!(v, OptionValue::Bool(_)))
            }
        }
    }

    /// Normalize a value into the domain's own representation
    ///
    /// Booleans given as strings (from the command line) become booleans
    /// when the domain is boolean.
    fn normalize(&self, value: OptionValue) -> OptionValue {
        if self.is_boolean() {
            if let Some(b) = value.as_bool() {
                return OptionValue::Bool(b);
            }
        }
        if let Self::Values(values) = self {
            if let Some(found) = values.iter().find(|v| v.matches(&value)) {
                return found.clone();
            }
        }
        value
    }
}

impl fmt::Display for OptionDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any(_) => f.write_str("ANY"),
            Self::Values(values) => {
                let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", values.join(", "))
            }
        }
    }
}

/// Declaration of one option in a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionDef {
    pub values: OptionDomain,
    pub default: OptionValue,
}

impl OptionDef {
    pub fn boolean(default: bool) -> Self {
        Self {
            values: OptionDomain::boolean(),
            default: OptionValue::Bool(default),
        }
    }

    /// Check that the default lies inside the domain
    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.values.contains(&self.default) {
            return Err(Error::ParseError(format!(
                "Default '{}' of option '{}' is not one of {}",
                self.default, name, self.values
            )));
        }
        Ok(())
    }
}

/// Option values of one cook
#[derive(Debug, Clone, Default)]
pub struct Options {
    domains: BTreeMap<String, OptionDomain>,
    values: BTreeMap<String, OptionValue>,
    frozen: bool,
}

impl Options {
    /// Options at their declared defaults
    pub fn from_schema(schema: &BTreeMap<String, OptionDef>) -> Result<Self> {
        let mut options = Self::default();
        for (name, def) in schema {
            def.validate(name)?;
            options.domains.insert(name.clone(), def.values.clone());
            options
                .values
                .insert(name.clone(), def.values.normalize(def.default.clone()));
        }
        Ok(options)
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(OptionValue::as_bool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.values.iter()
    }

    /// Set an option value
    pub fn set(&mut self, name: &str, value: OptionValue) -> Result<()> {
        self.ensure_mutable(name)?;
        let domain = self.domains.get(name).ok_or_else(|| {
            Error::Configuration(format!("Recipe has no option named '{}'", name))
        })?;
        if !self.values.contains_key(name) {
            return Err(Error::Configuration(format!(
                "Option '{}' was removed for this configuration",
                name
            )));
        }
        if !domain.contains(&value) {
            return Err(Error::Configuration(format!(
                "'{}' is not a legal value for option '{}' (expected one of {})",
                value, name, domain
            )));
        }
        let value = domain.normalize(value);
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Parse and set a `name=value` assignment from the command line
    pub fn set_assignment(&mut self, assignment: &str) -> Result<()> {
        let (name, value) = assignment.split_once('=').ok_or_else(|| {
            Error::Configuration(format!(
                "Option assignment '{}' must have the form name=value",
                assignment
            ))
        })?;
        self.set(name.trim(), OptionValue::Str(value.trim().to_string()))
    }

    /// Remove an option that does not apply to the current settings
    ///
    /// Removing an option that is already absent is not an error.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.ensure_mutable(name)?;
        self.values.remove(name);
        Ok(())
    }

    /// Freeze the options; every later mutation fails
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Flattened `name -> value` view
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }

    fn ensure_mutable(&self, name: &str) -> Result<()> {
        if self.frozen {
            return Err(Error::Configuration(format!(
                "Options are frozen after configure; cannot change '{}'",
                name
            )));
        }
        Ok(())
    }
}
