//! Field extraction
//!
//! Walks a [`FieldMap`] in declaration order against a [`Document`] and
//! produces a [`Record`] with exactly the map's shape. Missing fields are
//! recorded as [`FieldValue::Absent`]; only an unusable document, an empty
//! map or (under [`AmbiguityPolicy::Reject`]) an ambiguous match abort the
//! call.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::field_map::{FieldMap, FieldSpec, Transform};
use crate::path::{FieldPath, Target};
use crate::tree::{Document, NodeId};

/// What to do when a scalar path or group anchor matches several nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguityPolicy {
    /// Take the first match in document order
    #[default]
    First,
    /// Fail with [`ExtractError::AmbiguousField`]
    Reject,
}

/// Extractor options, loadable from JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub ambiguity: AmbiguityPolicy,
}

/// Value of one output field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    /// Declared but not found; serialises as `null`
    Absent,
    Group(Record),
    Sequence(Vec<Record>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }
}

/// Extraction result: field name to value, in field map order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Text of a scalar field; `None` if absent, nested or undeclared
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name)?.as_text()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Dotted names of absent leaves (`Emit.CNPJ`, `Cargas[2].Qtd`)
    pub fn absent_fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_absent("", &mut out);
        out
    }

    fn collect_absent(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, value) in &self.fields {
            let full = qualify(prefix, name);
            match value {
                FieldValue::Absent => out.push(full),
                FieldValue::Text(_) => {}
                FieldValue::Group(inner) => inner.collect_absent(&full, out),
                FieldValue::Sequence(items) => {
                    for (i, item) in items.iter().enumerate() {
                        item.collect_absent(&format!("{}[{}]", full, i + 1), out);
                    }
                }
            }
        }
    }

    /// True if the record has exactly the names and nesting of `map`
    pub fn conforms_to(&self, map: &FieldMap) -> bool {
        self.fields.len() == map.len()
            && self
                .fields
                .iter()
                .zip(map.iter())
                .all(|((name, value), (declared, spec))| {
                    name == declared
                        && match (spec, value) {
                            (FieldSpec::Value { .. }, FieldValue::Text(_) | FieldValue::Absent) => true,
                            (FieldSpec::Group { fields, .. }, FieldValue::Group(inner)) => {
                                inner.conforms_to(fields)
                            }
                            (FieldSpec::Each { fields, .. }, FieldValue::Sequence(items)) => {
                                items.iter().all(|item| item.conforms_to(fields))
                            }
                            _ => false,
                        }
                })
    }
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Resolves field maps against documents. Holds no per-call state and may
/// be shared across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldExtractor {
    policy: AmbiguityPolicy,
}

impl FieldExtractor {
    pub fn new(policy: AmbiguityPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.ambiguity)
    }

    pub fn policy(&self) -> AmbiguityPolicy {
        self.policy
    }

    pub fn extract(&self, doc: &Document, map: &FieldMap) -> Result<Record, ExtractError> {
        if doc.is_empty() {
            return Err(ExtractError::MalformedDocument);
        }
        if map.is_empty() {
            return Err(ExtractError::EmptyFieldMap);
        }

        let record = self.extract_scope(doc, Some(doc.root()), map, "")?;
        tracing::debug!(
            fields = map.len(),
            absent = record.absent_fields().len(),
            "extraction complete"
        );
        Ok(record)
    }

    /// `scope == None` means the enclosing group anchor was not found:
    /// every field is absent but the shape is kept.
    fn extract_scope(
        &self,
        doc: &Document,
        scope: Option<NodeId>,
        map: &FieldMap,
        prefix: &str,
    ) -> Result<Record, ExtractError> {
        let mut fields = IndexMap::with_capacity(map.len());

        for (name, spec) in map.iter() {
            let full = qualify(prefix, name);

            let value = match spec {
                FieldSpec::Value { path, transform } => match scope {
                    Some(node) => self.scalar(doc, node, path, *transform, &full)?,
                    None => FieldValue::Absent,
                },
                FieldSpec::Group { anchor, fields: nested } => {
                    let inner = match (scope, anchor) {
                        (Some(node), Some(anchor)) => {
                            let target = self.single(doc, node, anchor, &full)?;
                            if target.is_none() {
                                tracing::debug!(field = %full, anchor = %anchor, "group anchor not found");
                            }
                            target.map(|t| t.node())
                        }
                        (scope, None) => scope,
                        (None, Some(_)) => None,
                    };
                    FieldValue::Group(self.extract_scope(doc, inner, nested, &full)?)
                }
                FieldSpec::Each { anchor, fields: nested } => {
                    let nodes = scope
                        .map(|node| anchor.resolve_nodes(doc, node))
                        .unwrap_or_default();
                    tracing::debug!(field = %full, matches = nodes.len(), "repeated anchor");

                    let items = nodes
                        .into_iter()
                        .enumerate()
                        .map(|(i, node)| {
                            let item_prefix = format!("{}[{}]", full, i + 1);
                            self.extract_scope(doc, Some(node), nested, &item_prefix)
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    FieldValue::Sequence(items)
                }
            };

            fields.insert(name.to_string(), value);
        }

        Ok(Record { fields })
    }

    /// Zero-or-one target, applying the ambiguity policy
    fn single<'d>(
        &self,
        doc: &'d Document,
        scope: NodeId,
        path: &FieldPath,
        field: &str,
    ) -> Result<Option<Target<'d>>, ExtractError> {
        let found = path.resolve(doc, scope);
        if found.len() > 1 {
            match self.policy {
                AmbiguityPolicy::First => {
                    tracing::warn!(field, path = %path, matches = found.len(), "ambiguous field, using first match");
                }
                AmbiguityPolicy::Reject => {
                    return Err(ExtractError::AmbiguousField {
                        field: field.to_string(),
                        matches: found.len(),
                    });
                }
            }
        }
        Ok(found.first().copied())
    }

    fn scalar(
        &self,
        doc: &Document,
        scope: NodeId,
        path: &FieldPath,
        transform: Transform,
        field: &str,
    ) -> Result<FieldValue, ExtractError> {
        let Some(target) = self.single(doc, scope, path, field)? else {
            tracing::debug!(field, path = %path, "field absent");
            return Ok(FieldValue::Absent);
        };

        let raw = target.value(doc);
        let raw = raw.trim();
        match transform.apply(raw) {
            Some(value) => Ok(FieldValue::Text(value)),
            // The node exists, so keep what it holds
            None => {
                tracing::debug!(field, ?transform, raw = %raw, "transform produced no value, keeping text");
                Ok(FieldValue::Text(raw.to_string()))
            }
        }
    }
}

/// Extract with the default (first-match) policy
pub fn extract(doc: &Document, map: &FieldMap) -> Result<Record, ExtractError> {
    FieldExtractor::default().extract(doc, map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xml(text: &str) -> Document {
        Document::parse_xml(text).unwrap()
    }

    #[test]
    fn test_single_field() {
        let doc = xml("<emit><xNome>ACME</xNome></emit>");
        let map = FieldMap::new().with_value("Nome", "emit/xNome").unwrap();

        let record = extract(&doc, &map).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.text("Nome"), Some("ACME"));
        assert_eq!(serde_json::to_value(&record).unwrap(), serde_json::json!({"Nome": "ACME"}));
    }

    #[test]
    fn test_missing_field_is_absent() {
        let doc = xml("<emit><xNome>ACME</xNome></emit>");
        let map = FieldMap::new()
            .with_value("Nome", "emit/xNome")
            .unwrap()
            .with_value("CNPJ", "emit/CNPJ")
            .unwrap();

        let record = extract(&doc, &map).unwrap();
        assert_eq!(record.text("Nome"), Some("ACME"));
        assert_eq!(record.get("CNPJ"), Some(&FieldValue::Absent));
        assert_eq!(record.absent_fields(), vec!["CNPJ"]);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            serde_json::json!({"Nome": "ACME", "CNPJ": null})
        );
    }

    #[test]
    fn test_repeated_structure_in_document_order() {
        let doc = xml(
            "<infCarga>\
               <infQ><tpMed>PESO BRUTO</tpMed><qCarga>10</qCarga></infQ>\
               <infQ><tpMed>VOLUMES</tpMed><qCarga>2</qCarga></infQ>\
               <infQ><tpMed>M3</tpMed></infQ>\
             </infCarga>",
        );
        let item = FieldMap::new()
            .with_value("Medida", "tpMed")
            .unwrap()
            .with_value("Qtd", "qCarga")
            .unwrap();
        let map = FieldMap::new().with_each("Cargas", "infCarga/infQ", item).unwrap();

        let record = extract(&doc, &map).unwrap();
        let Some(FieldValue::Sequence(items)) = record.get("Cargas") else {
            panic!("expected sequence");
        };
        assert_eq!(items.len(), 3);
        let medidas: Vec<_> = items.iter().map(|r| r.text("Medida").unwrap()).collect();
        assert_eq!(medidas, vec!["PESO BRUTO", "VOLUMES", "M3"]);
        assert!(items[2].get("Qtd").unwrap().is_absent());
        assert_eq!(record.absent_fields(), vec!["Cargas[3].Qtd"]);
        assert!(record.conforms_to(&map));
    }

    #[test]
    fn test_empty_document_is_malformed() {
        let map = FieldMap::new().with_value("Nome", "emit/xNome").unwrap();
        assert_eq!(extract(&Document::empty(), &map), Err(ExtractError::MalformedDocument));
        assert_eq!(
            extract(&Document::parse_html(""), &map),
            Err(ExtractError::MalformedDocument)
        );
    }

    #[test]
    fn test_empty_field_map_rejected() {
        let doc = xml("<a/>");
        assert_eq!(extract(&doc, &FieldMap::new()), Err(ExtractError::EmptyFieldMap));
    }

    #[test]
    fn test_partial_result_keeps_every_field() {
        let doc = xml("<r><f1>1</f1><f2>2</f2><f3>3</f3><f4>4</f4><f5>5</f5><f6>6</f6><f7>7</f7></r>");
        let mut map = FieldMap::new();
        for i in 1..=10 {
            map = map.with_value(&format!("F{}", i), &format!("r/f{}", i)).unwrap();
        }

        let record = extract(&doc, &map).unwrap();
        assert_eq!(record.len(), 10);
        let present = record.iter().filter(|(_, v)| v.as_text().is_some()).count();
        assert_eq!(present, 7);
        assert_eq!(record.absent_fields(), vec!["F8", "F9", "F10"]);
        assert!(record.conforms_to(&map));
    }

    #[test]
    fn test_empty_text_is_present_not_absent() {
        let doc = xml("<r><blank>   </blank><empty/></r>");
        let map = FieldMap::new()
            .with_value("Blank", "r/blank")
            .unwrap()
            .with_value("Empty", "r/empty")
            .unwrap();

        let record = extract(&doc, &map).unwrap();
        assert_eq!(record.get("Blank"), Some(&FieldValue::Text(String::new())));
        assert_eq!(record.get("Empty"), Some(&FieldValue::Text(String::new())));
    }

    #[test]
    fn test_values_are_trimmed() {
        let doc = xml("<r><v>\n   Rua das Flores, 10  \n</v></r>");
        let map = FieldMap::new().with_value("V", "r/v").unwrap();
        assert_eq!(extract(&doc, &map).unwrap().text("V"), Some("Rua das Flores, 10"));
    }

    #[test]
    fn test_group_with_missing_anchor_keeps_shape() {
        let doc = xml("<CTe><emit><CNPJ>1</CNPJ></emit></CTe>");
        let inner = FieldMap::new()
            .with_value("CNPJ", "CNPJ")
            .unwrap()
            .with_value("Nome", "xNome")
            .unwrap();
        let map = FieldMap::new()
            .with_group("Emitente", Some("CTe/emit"), inner.clone())
            .unwrap()
            .with_group("Destinatario", Some("CTe/dest"), inner)
            .unwrap();

        let record = extract(&doc, &map).unwrap();
        assert!(record.conforms_to(&map));
        assert_eq!(
            record.absent_fields(),
            vec!["Emitente.Nome", "Destinatario.CNPJ", "Destinatario.Nome"]
        );
        let Some(FieldValue::Group(emit)) = record.get("Emitente") else {
            panic!("expected group");
        };
        assert_eq!(emit.text("CNPJ"), Some("1"));
    }

    #[test]
    fn test_group_without_anchor_uses_current_scope() {
        let doc = xml("<a><b>1</b></a>");
        let map = FieldMap::new()
            .with_group("G", None, FieldMap::new().with_value("B", "a/b").unwrap())
            .unwrap();
        let record = extract(&doc, &map).unwrap();
        let Some(FieldValue::Group(g)) = record.get("G") else {
            panic!("expected group");
        };
        assert_eq!(g.text("B"), Some("1"));
    }

    #[test]
    fn test_ambiguity_policies() {
        let doc = xml("<r><n>first</n><n>second</n></r>");
        let map = FieldMap::new().with_value("N", "r/n").unwrap();

        let record = FieldExtractor::new(AmbiguityPolicy::First).extract(&doc, &map).unwrap();
        assert_eq!(record.text("N"), Some("first"));

        let err = FieldExtractor::new(AmbiguityPolicy::Reject)
            .extract(&doc, &map)
            .unwrap_err();
        assert_eq!(
            err,
            ExtractError::AmbiguousField {
                field: "N".to_string(),
                matches: 2
            }
        );
    }

    #[test]
    fn test_reject_policy_never_applies_to_each() {
        let doc = xml("<r><n>1</n><n>2</n></r>");
        let map = FieldMap::new()
            .with_each("Ns", "r/n", FieldMap::new().with_value("V", ".").unwrap())
            .unwrap();
        let record = FieldExtractor::new(AmbiguityPolicy::Reject)
            .extract(&doc, &map)
            .unwrap();
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            serde_json::json!({"Ns": [{"V": "1"}, {"V": "2"}]})
        );
    }

    #[test]
    fn test_transform_failure_keeps_found_text() {
        let doc = xml("<r><v>R$ 1.500,00</v><w> ISENTO </w></r>");
        let map = FieldMap::new()
            .with_transformed("V", "r/v", Transform::Number)
            .unwrap()
            .with_transformed("W", "r/w", Transform::Number)
            .unwrap()
            .with_transformed("X", "r/x", Transform::Number)
            .unwrap();
        let record = extract(&doc, &map).unwrap();
        assert_eq!(record.text("V"), Some("1500.00"));
        assert_eq!(record.get("W"), Some(&FieldValue::Text("ISENTO".to_string())));
        assert_eq!(record.absent_fields(), vec!["X"]);
    }

    #[test]
    fn test_mixed_content_keeps_inner_spacing() {
        let doc = Document::parse_html("<table><tr><td><span>Sao</span> <span>Paulo</span></td></tr></table>");
        let map = FieldMap::new().with_value("Cidade", "//td").unwrap();
        assert_eq!(extract(&doc, &map).unwrap().text("Cidade"), Some("Sao Paulo"));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let doc = xml("<r><a>1</a><b x='y'/></r>");
        let map = FieldMap::new()
            .with_value("A", "r/a")
            .unwrap()
            .with_value("X", "r/b/@x")
            .unwrap()
            .with_value("C", "r/c")
            .unwrap();
        let extractor = FieldExtractor::default();
        assert_eq!(
            extractor.extract(&doc, &map).unwrap(),
            extractor.extract(&doc, &map).unwrap()
        );
    }

    #[test]
    fn test_config_from_json() {
        let config: ExtractorConfig = serde_json::from_str(r#"{"ambiguity": "reject"}"#).unwrap();
        assert_eq!(FieldExtractor::from_config(&config).policy(), AmbiguityPolicy::Reject);

        let config: ExtractorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.ambiguity, AmbiguityPolicy::First);
    }
}
