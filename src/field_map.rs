//! Declarative field maps
//!
//! A [`FieldMap`] is an ordered, name-unique mapping from output field names
//! to [`FieldSpec`]s. Nested maps mirror the shape of the record produced by
//! extraction. Maps are usually loaded from JSON:
//!
//! ```json
//! {
//!   "Nome": "emit/xNome",
//!   "Valor": { "path": "vPrest/vTPrest", "transform": "number" },
//!   "Emitente": { "anchor": "emit", "fields": { "CNPJ": "CNPJ" } },
//!   "Cargas": { "each": "infCTeNorm/infCarga/infQ", "fields": { "Qtd": "qCarga" } }
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FieldMapError;
use crate::path::FieldPath;

/// Post-processing applied to a trimmed scalar value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    #[default]
    Trim,
    Lowercase,
    Uppercase,
    /// Keep ASCII digits only (document numbers such as CNPJ/CPF)
    Digits,
    /// Normalise a price-like string ("R$ 1.234,56") to "1234.56"
    Number,
}

impl Transform {
    /// Apply to an already trimmed value. `None` means the value could not
    /// be produced and the field is recorded as absent.
    pub fn apply(self, value: &str) -> Option<String> {
        match self {
            Transform::Trim => Some(value.to_string()),
            Transform::Lowercase => Some(value.to_lowercase()),
            Transform::Uppercase => Some(value.to_uppercase()),
            Transform::Digits => {
                let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
                if digits.is_empty() {
                    None
                } else {
                    Some(digits)
                }
            }
            Transform::Number => normalize_number(value),
        }
    }
}

impl FromStr for Transform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trim" => Ok(Transform::Trim),
            "lowercase" => Ok(Transform::Lowercase),
            "uppercase" => Ok(Transform::Uppercase),
            "digits" => Ok(Transform::Digits),
            "number" => Ok(Transform::Number),
            other => Err(other.to_string()),
        }
    }
}

/// Decimal separator is the last of '.'/',' when both occur; a single kind
/// occurring once is decimal, occurring repeatedly is a thousands separator.
fn normalize_number(value: &str) -> Option<String> {
    let last_dot = value.rfind('.');
    let last_comma = value.rfind(',');
    let decimal = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(d.max(c)),
        (Some(d), None) if value.matches('.').count() == 1 => Some(d),
        (None, Some(c)) if value.matches(',').count() == 1 => Some(c),
        _ => None,
    };

    let mut out = String::new();
    let mut has_digit = false;
    for (i, c) in value.char_indices() {
        if c.is_ascii_digit() {
            out.push(c);
            has_digit = true;
        } else if Some(i) == decimal {
            out.push('.');
        } else if c == '-' && !has_digit && !out.starts_with('-') {
            out.push('-');
        }
    }

    if !has_digit {
        return None;
    }
    if out.ends_with('.') {
        out.pop();
    }
    if out.starts_with("-.") || out.starts_with('.') {
        out.insert(out.find('.').unwrap_or(0), '0');
    }
    Some(out)
}

/// How one output field is obtained
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    /// Scalar text or attribute value
    Value { path: FieldPath, transform: Transform },
    /// Nested record scoped to a single anchor node (or the current scope)
    Group {
        anchor: Option<FieldPath>,
        fields: FieldMap,
    },
    /// One nested record per anchor match, in document order
    Each { anchor: FieldPath, fields: FieldMap },
}

impl FieldSpec {
    fn nested(&self) -> Option<&FieldMap> {
        match self {
            FieldSpec::Value { .. } => None,
            FieldSpec::Group { fields, .. } | FieldSpec::Each { fields, .. } => Some(fields),
        }
    }
}

/// Ordered mapping from field name to [`FieldSpec`]; names are unique
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: IndexMap<String, FieldSpec>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Fails on a duplicate or unusable name, or an empty
    /// nested map.
    pub fn insert(&mut self, name: impl Into<String>, spec: FieldSpec) -> Result<(), FieldMapError> {
        let name = name.into();
        check_name(&name, &name)?;
        if self.entries.contains_key(&name) {
            return Err(FieldMapError::DuplicateField(name));
        }
        if spec.nested().is_some_and(FieldMap::is_empty) {
            return Err(FieldMapError::EmptyNested(name));
        }
        self.entries.insert(name, spec);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert) for a plain path
    pub fn with_value(self, name: &str, path: &str) -> Result<Self, FieldMapError> {
        self.with_transformed(name, path, Transform::Trim)
    }

    pub fn with_transformed(
        mut self,
        name: &str,
        path: &str,
        transform: Transform,
    ) -> Result<Self, FieldMapError> {
        let path = parse_for(name, path)?;
        self.insert(name, FieldSpec::Value { path, transform })?;
        Ok(self)
    }

    pub fn with_group(
        mut self,
        name: &str,
        anchor: Option<&str>,
        fields: FieldMap,
    ) -> Result<Self, FieldMapError> {
        let anchor = anchor.map(|a| parse_for(name, a)).transpose()?;
        self.insert(name, FieldSpec::Group { anchor, fields })?;
        Ok(self)
    }

    pub fn with_each(mut self, name: &str, anchor: &str, fields: FieldMap) -> Result<Self, FieldMapError> {
        let anchor = parse_for(name, anchor)?;
        self.insert(name, FieldSpec::Each { anchor, fields })?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.entries.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn from_json(json: &str) -> Result<Self, FieldMapError> {
        let raw: RawFields = serde_json::from_str(json)?;
        let map = build_map(raw, None)?;
        if map.is_empty() {
            return Err(FieldMapError::Empty);
        }
        Ok(map)
    }

    pub fn to_json_pretty(&self) -> Result<String, FieldMapError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Names become dotted table columns (`Emit.CNPJ`, `Cargas[2].Qtd`), so
/// they may not carry the separators themselves
fn check_name(name: &str, full: &str) -> Result<(), FieldMapError> {
    if name.is_empty() || name.contains(['.', '[', ']']) {
        return Err(FieldMapError::InvalidName(full.to_string()));
    }
    Ok(())
}

fn parse_for(name: &str, path: &str) -> Result<FieldPath, FieldMapError> {
    FieldPath::parse(path).map_err(|source| FieldMapError::Path {
        field: name.to_string(),
        source,
    })
}

/* ---------------- Serialization ---------------- */

impl Serialize for FieldSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldSpec::Value {
                path,
                transform: Transform::Trim,
            } => path.serialize(serializer),
            FieldSpec::Value { path, transform } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("path", path)?;
                map.serialize_entry("transform", transform)?;
                map.end()
            }
            FieldSpec::Group { anchor, fields } => {
                let mut map = serializer.serialize_map(None)?;
                if let Some(anchor) = anchor {
                    map.serialize_entry("anchor", anchor)?;
                }
                map.serialize_entry("fields", fields)?;
                map.end()
            }
            FieldSpec::Each { anchor, fields } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("each", anchor)?;
                map.serialize_entry("fields", fields)?;
                map.end()
            }
        }
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, spec) in &self.entries {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawFields::deserialize(deserializer)?;
        let map = build_map(raw, None).map_err(de::Error::custom)?;
        if map.is_empty() {
            return Err(de::Error::custom(FieldMapError::Empty));
        }
        Ok(map)
    }
}

/// JSON object kept in source order, rejecting duplicate keys
struct RawFields(Vec<(String, RawSpec)>);

enum RawSpec {
    Path(String),
    Object(RawObject),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawObject {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    transform: Option<String>,
    #[serde(default)]
    anchor: Option<String>,
    #[serde(default)]
    each: Option<String>,
    #[serde(default)]
    fields: Option<RawFields>,
}

impl<'de> Deserialize<'de> for RawFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = RawFields;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping field names to paths or nested maps")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawFields, A::Error> {
                let mut entries: Vec<(String, RawSpec)> = Vec::new();
                while let Some((name, spec)) = access.next_entry::<String, RawSpec>()? {
                    if entries.iter().any(|(existing, _)| *existing == name) {
                        return Err(de::Error::custom(FieldMapError::DuplicateField(name)));
                    }
                    entries.push((name, spec));
                }
                Ok(RawFields(entries))
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

impl<'de> Deserialize<'de> for RawSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = RawSpec;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a path string or an object with 'path' or 'fields'")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<RawSpec, E> {
                Ok(RawSpec::Path(value.to_string()))
            }

            fn visit_map<A: MapAccess<'de>>(self, access: A) -> Result<RawSpec, A::Error> {
                RawObject::deserialize(de::value::MapAccessDeserializer::new(access)).map(RawSpec::Object)
            }
        }

        deserializer.deserialize_any(SpecVisitor)
    }
}

fn build_map(raw: RawFields, parent: Option<&str>) -> Result<FieldMap, FieldMapError> {
    let mut map = FieldMap::new();

    for (name, spec) in raw.0 {
        let full = match parent {
            Some(parent) => format!("{parent}.{name}"),
            None => name.clone(),
        };
        check_name(&name, &full)?;

        let spec = match spec {
            RawSpec::Path(path) => FieldSpec::Value {
                path: parse_for(&full, &path)?,
                transform: Transform::Trim,
            },
            RawSpec::Object(obj) => build_spec(obj, &full)?,
        };

        if map.entries.contains_key(&name) {
            return Err(FieldMapError::DuplicateField(full));
        }
        if spec.nested().is_some_and(FieldMap::is_empty) {
            return Err(FieldMapError::EmptyNested(full));
        }
        map.entries.insert(name, spec);
    }

    Ok(map)
}

fn build_spec(obj: RawObject, full: &str) -> Result<FieldSpec, FieldMapError> {
    let invalid = |reason: &'static str| FieldMapError::InvalidSpec {
        field: full.to_string(),
        reason,
    };

    match (obj.path, obj.fields) {
        (Some(path), None) => {
            if obj.anchor.is_some() || obj.each.is_some() {
                return Err(invalid("'anchor' and 'each' require 'fields'"));
            }
            let transform = match obj.transform {
                Some(name) => name.parse::<Transform>().map_err(|transform| FieldMapError::UnknownTransform {
                    field: full.to_string(),
                    transform,
                })?,
                None => Transform::Trim,
            };
            Ok(FieldSpec::Value {
                path: parse_for(full, &path)?,
                transform,
            })
        }
        (None, Some(fields)) => {
            if obj.transform.is_some() {
                return Err(invalid("'transform' applies to scalar fields only"));
            }
            let nested = build_map(fields, Some(full))?;
            match (obj.anchor, obj.each) {
                (Some(_), Some(_)) => Err(FieldMapError::ConflictingAnchor(full.to_string())),
                (None, Some(each)) => Ok(FieldSpec::Each {
                    anchor: parse_for(full, &each)?,
                    fields: nested,
                }),
                (anchor, None) => Ok(FieldSpec::Group {
                    anchor: anchor.map(|a| parse_for(full, &a)).transpose()?,
                    fields: nested,
                }),
            }
        }
        (Some(_), Some(_)) => Err(invalid("'path' cannot be combined with 'fields'")),
        (None, None) => Err(invalid("needs either 'path' or 'fields'")),
    }
}
