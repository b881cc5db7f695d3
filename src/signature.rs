//! Signature normalization and cache-key derivation (§4.1).
//!
//! A [`Signature`] is the caller's structural description of the thing they want
//! discovered. [`normalize`] turns it into a [`NormalizedSignature`] with
//! deterministic method/property ordering, suitable for keying the two-tier cache.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde_json::Value;

use crate::error::DiscoveryError;

/// The kind of entity a signature targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    Class,
    Function,
    Object,
    Module,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Class => "class",
            TargetType::Function => "function",
            TargetType::Object => "object",
            TargetType::Module => "module",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "class" => Some(TargetType::Class),
            "function" => Some(TargetType::Function),
            "object" => Some(TargetType::Object),
            "module" => Some(TargetType::Module),
            _ => None,
        }
    }
}

/// A name requirement: either an exact/substring-matchable literal or a regex.
#[derive(Debug, Clone)]
pub enum NameMatch {
    Literal(String),
    Regex(Regex),
}

impl NameMatch {
    pub fn is_regex(&self) -> bool {
        matches!(self, NameMatch::Regex(_))
    }

    /// Case-insensitive exact match.
    pub fn matches_exact(&self, candidate: &str) -> bool {
        match self {
            NameMatch::Literal(s) => s.eq_ignore_ascii_case(candidate),
            NameMatch::Regex(r) => r.is_match(candidate),
        }
    }
}

impl PartialEq for NameMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NameMatch::Literal(a), NameMatch::Literal(b)) => a == b,
            (NameMatch::Regex(a), NameMatch::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for NameMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameMatch::Literal(s) => write!(f, "{s}"),
            NameMatch::Regex(r) => write!(f, "/{}/", r.as_str()),
        }
    }
}

/// The caller-supplied structural description of a target.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub name: Option<NameMatch>,
    pub target_type: Option<TargetType>,
    pub exports: Option<String>,
    pub methods: Vec<String>,
    pub properties: Vec<String>,
    /// Base class name. Static analysis only — a live class handle can't be
    /// expressed without an embedded runtime, so this is string-only (see
    /// DESIGN.md's resolution of the `extends` Open Question).
    pub extends: Option<String>,
    pub instanceof: Option<String>,
    /// Forward-compatible bag for fields a custom scorer may inspect.
    pub custom: serde_json::Map<String, Value>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(NameMatch::Literal(name.into()));
        self
    }

    pub fn with_name_regex(mut self, regex: Regex) -> Self {
        self.name = Some(NameMatch::Regex(regex));
        self
    }

    pub fn with_type(mut self, t: TargetType) -> Self {
        self.target_type = Some(t);
        self
    }

    pub fn with_methods<I: IntoIterator<Item = S>, S: Into<String>>(mut self, methods: I) -> Self {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_properties<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        properties: I,
    ) -> Self {
        self.properties = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extends(mut self, base: impl Into<String>) -> Self {
        self.extends = Some(base.into());
        self
    }

    pub fn with_instanceof(mut self, target: impl Into<String>) -> Self {
        self.instanceof = Some(target.into());
        self
    }

    /// Build a signature from a loosely-typed JSON value — the dynamic-input path
    /// mentioned in §4.1's contract ("Input: user signature object"). Fails with
    /// `InvalidSignature` when `value` is not a JSON object.
    pub fn try_from_value(value: &Value) -> Result<Self, DiscoveryError> {
        let obj = value.as_object().ok_or_else(|| {
            DiscoveryError::invalid_signature("signature must be an object/associative structure")
        })?;

        let mut sig = Signature::new();

        if let Some(name_val) = obj.get("name") {
            sig.name = Some(parse_name_field(name_val)?);
        }
        if let Some(t) = obj.get("type").and_then(Value::as_str) {
            sig.target_type = Some(TargetType::parse(t).ok_or_else(|| {
                DiscoveryError::invalid_signature(format!("unknown type hint `{t}`"))
            })?);
        }
        if let Some(e) = obj.get("exports").and_then(Value::as_str) {
            sig.exports = Some(e.to_string());
        }
        if let Some(methods) = obj.get("methods").and_then(Value::as_array) {
            sig.methods = methods.iter().filter_map(Value::as_str).map(String::from).collect();
        }
        if let Some(props) = obj.get("properties").and_then(Value::as_array) {
            sig.properties = props.iter().filter_map(Value::as_str).map(String::from).collect();
        }
        if let Some(e) = obj.get("extends").and_then(Value::as_str) {
            sig.extends = Some(e.to_string());
        }
        if let Some(e) = obj.get("instanceof").and_then(Value::as_str) {
            sig.instanceof = Some(e.to_string());
        }

        let known = ["name", "type", "exports", "methods", "properties", "extends", "instanceof"];
        for (k, v) in obj {
            if !known.contains(&k.as_str()) {
                sig.custom.insert(k.clone(), v.clone());
            }
        }

        Ok(sig)
    }

    /// Short human-readable rendering for diagnostics.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(n) = &self.name {
            parts.push(format!("name={n}"));
        }
        if let Some(t) = self.target_type {
            parts.push(format!("type={}", t.as_str()));
        }
        if let Some(e) = &self.exports {
            parts.push(format!("exports={e}"));
        }
        if !self.methods.is_empty() {
            parts.push(format!("methods=[{}]", self.methods.join(",")));
        }
        if !self.properties.is_empty() {
            parts.push(format!("properties=[{}]", self.properties.join(",")));
        }
        if let Some(e) = &self.extends {
            parts.push(format!("extends={e}"));
        }
        if parts.is_empty() {
            "{}".to_string()
        } else {
            format!("{{ {} }}", parts.join(", "))
        }
    }
}

fn parse_name_field(value: &Value) -> Result<NameMatch, DiscoveryError> {
    if let Some(s) = value.as_str() {
        return Ok(NameMatch::Literal(s.to_string()));
    }
    if let Some(obj) = value.as_object() {
        if let Some(source) = obj.get("source").and_then(Value::as_str) {
            let re = Regex::new(source).map_err(|e| {
                DiscoveryError::invalid_signature(format!("invalid name regex: {e}"))
            })?;
            return Ok(NameMatch::Regex(re));
        }
    }
    Err(DiscoveryError::invalid_signature(
        "`name` must be a string or a { source, flags } regex descriptor",
    ))
}

/// A [`Signature`] with method/property lists deduped and sorted, plus the
/// original preserved for error reporting (§3 invariant).
#[derive(Debug, Clone)]
pub struct NormalizedSignature {
    pub name: Option<NameMatch>,
    pub target_type: Option<TargetType>,
    pub exports: Option<String>,
    pub methods: Vec<String>,
    pub properties: Vec<String>,
    pub extends: Option<String>,
    pub instanceof: Option<String>,
    pub custom: serde_json::Map<String, Value>,
    pub original: Signature,
}

/// Normalize a caller signature: dedupe+sort methods/properties, preserve the
/// original verbatim. Idempotent: `normalize(normalize(s).original) == normalize(s)`.
pub fn normalize(signature: Signature) -> NormalizedSignature {
    let mut methods = signature.methods.clone();
    methods.sort();
    methods.dedup();

    let mut properties = signature.properties.clone();
    properties.sort();
    properties.dedup();

    NormalizedSignature {
        name: signature.name.clone(),
        target_type: signature.target_type,
        exports: signature.exports.clone(),
        methods,
        properties,
        extends: signature.extends.clone(),
        instanceof: signature.instanceof.clone(),
        custom: signature.custom.clone(),
        original: signature,
    }
}

/// Produce a stable cache key for a normalized signature. Regex name matchers
/// are serialized as `{kind: "regex", source}`; everything else is a sorted
/// `BTreeMap` projection so key order never depends on insertion order.
pub fn cache_key(sig: &NormalizedSignature) -> String {
    let mut map: BTreeMap<&'static str, Value> = BTreeMap::new();

    if let Some(name) = &sig.name {
        let v = match name {
            NameMatch::Literal(s) => Value::String(s.clone()),
            NameMatch::Regex(r) => {
                let mut m = serde_json::Map::new();
                m.insert("kind".into(), Value::String("regex".into()));
                m.insert("source".into(), Value::String(r.as_str().to_string()));
                Value::Object(m)
            }
        };
        map.insert("name", v);
    }
    if let Some(t) = sig.target_type {
        map.insert("type", Value::String(t.as_str().to_string()));
    }
    if let Some(e) = &sig.exports {
        map.insert("exports", Value::String(e.clone()));
    }
    if !sig.methods.is_empty() {
        map.insert("methods", Value::Array(sig.methods.iter().cloned().map(Value::String).collect()));
    }
    if !sig.properties.is_empty() {
        map.insert(
            "properties",
            Value::Array(sig.properties.iter().cloned().map(Value::String).collect()),
        );
    }
    if let Some(e) = &sig.extends {
        map.insert("extends", Value::String(e.clone()));
    }
    if let Some(i) = &sig.instanceof {
        map.insert("instanceof", Value::String(i.clone()));
    }
    if !sig.custom.is_empty() {
        let sorted: BTreeMap<String, Value> =
            sig.custom.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        map.insert("custom", serde_json::to_value(sorted).unwrap_or(Value::Null));
    }

    serde_json::to_string(&map).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_sorts_and_dedupes() {
        let sig = Signature::new()
            .with_name("UserService")
            .with_methods(["logout", "login", "login"])
            .with_properties(["b", "a"]);
        let norm = normalize(sig);
        assert_eq!(norm.methods, vec!["login", "logout"]);
        assert_eq!(norm.properties, vec!["a", "b"]);
    }

    #[test]
    fn cache_key_insensitive_to_input_order() {
        let a = normalize(Signature::new().with_methods(["login", "logout"]));
        let b = normalize(Signature::new().with_methods(["logout", "login"]));
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn cache_key_stable_across_runs() {
        let sig = Signature::new().with_name("Foo").with_methods(["bar"]);
        let a = cache_key(&normalize(sig.clone()));
        let b = cache_key(&normalize(sig));
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_idempotent() {
        let sig = Signature::new().with_methods(["z", "a"]);
        let once = normalize(sig);
        let twice = normalize(once.original.clone());
        assert_eq!(once.methods, twice.methods);
        assert_eq!(cache_key(&once), cache_key(&twice));
    }

    #[test]
    fn try_from_value_rejects_non_object() {
        let v = Value::String("not an object".into());
        let err = Signature::try_from_value(&v).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidSignature { .. }));
    }

    #[test]
    fn try_from_value_parses_fields() {
        let v = serde_json::json!({
            "name": "UserService",
            "type": "class",
            "methods": ["login", "logout"],
        });
        let sig = Signature::try_from_value(&v).unwrap();
        assert_eq!(sig.name, Some(NameMatch::Literal("UserService".into())));
        assert_eq!(sig.target_type, Some(TargetType::Class));
        assert_eq!(sig.methods, vec!["login", "logout"]);
    }

    #[test]
    fn try_from_value_regex_name() {
        let v = serde_json::json!({ "name": { "source": ".*Service$" } });
        let sig = Signature::try_from_value(&v).unwrap();
        assert!(sig.name.unwrap().is_regex());
    }
}
