//! # Parameter store
//!
//! String-keyed hyperparameters declared by a trainer. Each parameter carries
//! its type, default value and an optional validator; values arrive as raw
//! strings and are coerced when set.

use std::fmt;

use crate::error::{Result, SeqlearnError};

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    Bool,
    Str,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Bool => "bool",
            ParamKind::Str => "string",
        };
        write!(f, "{}", s)
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Str(_) => ParamKind::Str,
        }
    }

    fn parse(kind: ParamKind, raw: &str) -> std::result::Result<Self, String> {
        let trimmed = raw.trim();
        match kind {
            ParamKind::Int => trimmed
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|e| format!("expected an integer ({})", e)),
            ParamKind::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(ParamValue::Float)
                .ok_or_else(|| "expected a finite number".to_string()),
            ParamKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Ok(ParamValue::Bool(true)),
                "0" | "false" | "no" => Ok(ParamValue::Bool(false)),
                _ => Err("expected a boolean (1/0, true/false, yes/no)".to_string()),
            },
            ParamKind::Str => Ok(ParamValue::Str(raw.to_string())),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", u8::from(*v)),
            ParamValue::Str(v) => write!(f, "{}", v),
        }
    }
}

/// Validator attached to a [`ParamSpec`].
pub type Validator = fn(&ParamValue) -> std::result::Result<(), String>;

/// Declaration of one parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: ParamValue,
    pub help: &'static str,
    pub validate: Option<Validator>,
}

impl ParamSpec {
    pub fn int(name: &'static str, default: i64, help: &'static str) -> Self {
        Self::new(name, ParamValue::Int(default), help)
    }

    pub fn float(name: &'static str, default: f64, help: &'static str) -> Self {
        Self::new(name, ParamValue::Float(default), help)
    }

    pub fn bool(name: &'static str, default: bool, help: &'static str) -> Self {
        Self::new(name, ParamValue::Bool(default), help)
    }

    pub fn string(name: &'static str, default: &str, help: &'static str) -> Self {
        Self::new(name, ParamValue::Str(default.to_string()), help)
    }

    fn new(name: &'static str, default: ParamValue, help: &'static str) -> Self {
        Self {
            name,
            default,
            help,
            validate: None,
        }
    }

    /// Attach a validator run on every value set.
    pub fn with_validator(mut self, validate: Validator) -> Self {
        self.validate = Some(validate);
        self
    }

    pub fn kind(&self) -> ParamKind {
        self.default.kind()
    }
}

/// Rejects negative numbers.
pub fn non_negative(value: &ParamValue) -> std::result::Result<(), String> {
    match value {
        ParamValue::Int(v) if *v < 0 => Err("must be >= 0".to_string()),
        ParamValue::Float(v) if *v < 0.0 => Err("must be >= 0".to_string()),
        _ => Ok(()),
    }
}

/// Rejects zero and negative numbers.
pub fn positive(value: &ParamValue) -> std::result::Result<(), String> {
    match value {
        ParamValue::Int(v) if *v <= 0 => Err("must be > 0".to_string()),
        ParamValue::Float(v) if *v <= 0.0 => Err("must be > 0".to_string()),
        _ => Ok(()),
    }
}

/// Parameter values of one trainer, keyed by name.
#[derive(Debug, Clone)]
pub struct ParamStore {
    entries: Vec<(ParamSpec, ParamValue)>,
}

impl ParamStore {
    /// Create a store holding every declared parameter at its default.
    pub fn new(specs: Vec<ParamSpec>) -> Self {
        let entries = specs
            .into_iter()
            .map(|spec| {
                let value = spec.default.clone();
                (spec, value)
            })
            .collect();
        Self { entries }
    }

    /// Set `name` from its raw string form.
    ///
    /// An empty value restores the declared default. Unknown names are an
    /// error.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let (spec, slot) = self
            .entries
            .iter_mut()
            .find(|(spec, _)| spec.name == name)
            .ok_or_else(|| SeqlearnError::UnknownParameter {
                name: name.to_string(),
            })?;

        if value.is_empty() && spec.kind() != ParamKind::Str {
            *slot = spec.default.clone();
            return Ok(());
        }

        let invalid = |reason: String| SeqlearnError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason,
        };

        let parsed = ParamValue::parse(spec.kind(), value).map_err(invalid)?;
        if let Some(validate) = spec.validate {
            validate(&parsed).map_err(invalid)?;
        }
        *slot = parsed;
        Ok(())
    }

    fn value(&self, name: &str) -> Result<&ParamValue> {
        self.entries
            .iter()
            .find(|(spec, _)| spec.name == name)
            .map(|(_, value)| value)
            .ok_or_else(|| SeqlearnError::UnknownParameter {
                name: name.to_string(),
            })
    }

    fn mismatch(name: &str, value: &ParamValue, wanted: ParamKind) -> SeqlearnError {
        SeqlearnError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: format!("declared as {}, read as {}", value.kind(), wanted),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        match self.value(name)? {
            ParamValue::Int(v) => Ok(*v),
            other => Err(Self::mismatch(name, other, ParamKind::Int)),
        }
    }

    pub fn get_float(&self, name: &str) -> Result<f64> {
        match self.value(name)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(Self::mismatch(name, other, ParamKind::Float)),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.value(name)? {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(Self::mismatch(name, other, ParamKind::Bool)),
        }
    }

    pub fn get_str(&self, name: &str) -> Result<&str> {
        match self.value(name)? {
            ParamValue::Str(v) => Ok(v),
            other => Err(Self::mismatch(name, other, ParamKind::Str)),
        }
    }

    /// Current value of `name` in string form.
    pub fn get(&self, name: &str) -> Option<String> {
        self.value(name).ok().map(ToString::to_string)
    }

    pub fn specs(&self) -> impl Iterator<Item = &ParamSpec> {
        self.entries.iter().map(|(spec, _)| spec)
    }

    /// Human-readable listing of every parameter.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (spec, value) in &self.entries {
            out.push_str(&format!(
                "{}: {} = {} (default {})\n    {}\n",
                spec.name,
                spec.kind(),
                value,
                spec.default,
                spec.help
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ParamStore {
        ParamStore::new(vec![
            ParamSpec::float("c2", 1.0, "L2 coefficient").with_validator(non_negative),
            ParamSpec::int("maxiterations", 100, "Iteration limit").with_validator(positive),
            ParamSpec::bool("feature.possible_states", false, "All state features"),
            ParamSpec::string("note", "", "Free text"),
        ])
    }

    #[test]
    fn test_defaults() {
        let params = store();
        assert_eq!(params.get_float("c2").unwrap(), 1.0);
        assert_eq!(params.get_int("maxiterations").unwrap(), 100);
        assert!(!params.get_bool("feature.possible_states").unwrap());
        assert_eq!(params.get_str("note").unwrap(), "");
    }

    #[test]
    fn test_set_overwrites_and_later_wins() {
        let mut params = store();
        params.set("maxiterations", "5").unwrap();
        assert_eq!(params.get_int("maxiterations").unwrap(), 5);
        params.set("maxiterations", "7").unwrap();
        assert_eq!(params.get_int("maxiterations").unwrap(), 7);
        assert_eq!(params.get("maxiterations").as_deref(), Some("7"));
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let mut params = store();
        let err = params.set("bogus", "1").unwrap_err();
        assert!(matches!(err, SeqlearnError::UnknownParameter { ref name } if name == "bogus"));
        assert!(params.get("bogus").is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut params = store();
        assert!(matches!(
            params.set("maxiterations", "ten"),
            Err(SeqlearnError::InvalidParameter { .. })
        ));
        assert!(matches!(
            params.set("maxiterations", "0"),
            Err(SeqlearnError::InvalidParameter { .. })
        ));
        assert!(matches!(
            params.set("c2", "NaN"),
            Err(SeqlearnError::InvalidParameter { .. })
        ));
        assert_eq!(params.get_int("maxiterations").unwrap(), 100);
    }

    #[test]
    fn test_empty_value_restores_default() {
        let mut params = store();
        params.set("c2", "0.25").unwrap();
        params.set("c2", "").unwrap();
        assert_eq!(params.get_float("c2").unwrap(), 1.0);

        params.set("note", "x=y").unwrap();
        params.set("note", "").unwrap();
        assert_eq!(params.get_str("note").unwrap(), "");
    }

    #[test]
    fn test_bool_spellings() {
        let mut params = store();
        for (raw, expected) in [("1", true), ("no", false), ("TRUE", true), ("0", false)] {
            params.set("feature.possible_states", raw).unwrap();
            assert_eq!(params.get_bool("feature.possible_states").unwrap(), expected);
        }
    }

    #[test]
    fn test_int_readable_as_float() {
        let params = store();
        assert_eq!(params.get_float("maxiterations").unwrap(), 100.0);
        assert!(params.get_int("c2").is_err());
    }

    #[test]
    fn test_describe_lists_every_parameter() {
        let text = store().describe();
        assert!(text.contains("c2: float = 1"));
        assert!(text.contains("maxiterations: int = 100"));
        assert!(text.contains("Iteration limit"));
    }
}
