//! Field paths
//!
//! Syntax: `alt ('|' alt)*` where each alternative is a `/`-separated list of
//! steps, `//` switching to the descendant axis:
//!
//! - `emit/xNome` - child `xNome` of child `emit`
//! - `//infQ` - every `infQ` below the context node
//! - `{http://www.portalfiscal.inf.br/cte}emit` - namespace-qualified step
//! - `tr/td[2]` - second `td` of each `tr`
//! - `infCte/@Id` - attribute `Id` of `infCte`; `@Id` alone reads the context node
//! - `dest/CNPJ|dest/CPF` - first alternative that matches anything wins
//! - `.` - the context node, `*` - any element

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PathError;
use crate::tree::{Document, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    SelfNode,
    Any,
    Name {
        local: String,
        namespace: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    /// 1-based position among the candidates of one context node
    position: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Alternative {
    steps: Vec<Step>,
    attribute: Option<String>,
}

/// Declarative locator of a value within a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    alternatives: Vec<Alternative>,
}

/// A node reached by a path, or one of its attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Node(NodeId),
    Attribute(NodeId, &'a str),
}

impl Target<'_> {
    pub fn node(&self) -> NodeId {
        match self {
            Target::Node(id) | Target::Attribute(id, _) => *id,
        }
    }

    /// Untrimmed string value: element text or attribute value
    pub fn value(&self, doc: &Document) -> String {
        match self {
            Target::Node(id) => doc.text(*id),
            Target::Attribute(_, value) => value.to_string(),
        }
    }
}

impl FieldPath {
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(PathError::Empty);
        }

        let alternatives = split_outside_braces(raw, '|', raw)?
            .into_iter()
            .map(|alt| parse_alternative(alt.trim(), raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    /// The path text as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// All targets of the first alternative that matches anything,
    /// deduplicated and in document order
    pub fn resolve<'d>(&self, doc: &'d Document, context: NodeId) -> Vec<Target<'d>> {
        for alt in &self.alternatives {
            let found = resolve_alternative(alt, doc, context);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Matching nodes; attribute paths yield the owning elements
    pub fn resolve_nodes(&self, doc: &Document, context: NodeId) -> Vec<NodeId> {
        self.resolve(doc, context).iter().map(Target::node).collect()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FieldPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Split on `sep` except inside `{...}` namespace braces
fn split_outside_braces<'a>(input: &'a str, sep: char, path: &str) -> Result<Vec<&'a str>, PathError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if depth > 0 {
        return Err(PathError::Unterminated {
            path: path.to_string(),
            delimiter: '{',
        });
    }
    parts.push(&input[start..]);
    Ok(parts)
}

fn parse_alternative(alt: &str, path: &str) -> Result<Alternative, PathError> {
    if alt.is_empty() {
        return Err(PathError::EmptyStep(path.to_string()));
    }

    let (mut axis, body) = match alt.strip_prefix("//") {
        Some(rest) => (Axis::Descendant, rest),
        None => (Axis::Child, alt.strip_prefix('/').unwrap_or(alt)),
    };

    let segments = split_outside_braces(body, '/', path)?;
    let mut steps = Vec::new();
    let mut attribute = None;
    let last = segments.len() - 1;

    for (i, segment) in segments.iter().enumerate() {
        let segment = segment.trim();

        if segment.is_empty() {
            // `a//b`: the empty segment switches `b` to the descendant axis
            if i == 0 || i == last || axis == Axis::Descendant {
                return Err(PathError::EmptyStep(path.to_string()));
            }
            axis = Axis::Descendant;
            continue;
        }

        if let Some(name) = segment.strip_prefix('@') {
            if i != last || axis == Axis::Descendant {
                return Err(PathError::MisplacedAttribute(path.to_string()));
            }
            if name.is_empty() {
                return Err(PathError::EmptyStep(path.to_string()));
            }
            attribute = Some(name.to_string());
            continue;
        }

        steps.push(parse_step(segment, axis, path)?);
        axis = Axis::Child;
    }

    Ok(Alternative { steps, attribute })
}

fn parse_step(segment: &str, axis: Axis, path: &str) -> Result<Step, PathError> {
    let (name_part, position) = match segment.find('[') {
        Some(open) => {
            let close = segment.rfind(']').filter(|close| *close > open).ok_or_else(|| {
                PathError::Unterminated {
                    path: path.to_string(),
                    delimiter: '[',
                }
            })?;
            // `td[1]x`: nothing may follow the position
            if close + 1 != segment.len() {
                return Err(PathError::InvalidIndex {
                    path: path.to_string(),
                    index: segment[open + 1..].to_string(),
                });
            }
            let index = &segment[open + 1..close];
            let position = index
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| PathError::InvalidIndex {
                    path: path.to_string(),
                    index: index.to_string(),
                })?;
            (&segment[..open], Some(position))
        }
        None => (segment, None),
    };

    let test = match name_part {
        "." => NameTest::SelfNode,
        "*" => NameTest::Any,
        "" => return Err(PathError::EmptyStep(path.to_string())),
        qualified => {
            let (namespace, local) = match qualified.strip_prefix('{') {
                Some(rest) => {
                    let close = rest.find('}').ok_or_else(|| PathError::Unterminated {
                        path: path.to_string(),
                        delimiter: '{',
                    })?;
                    (Some(rest[..close].to_string()), &rest[close + 1..])
                }
                None => (None, qualified),
            };
            if local.is_empty() {
                return Err(PathError::EmptyStep(path.to_string()));
            }
            NameTest::Name {
                local: local.to_string(),
                namespace,
            }
        }
    };

    Ok(Step {
        axis,
        test,
        position,
    })
}

fn matches(doc: &Document, id: NodeId, test: &NameTest) -> bool {
    let Some(el) = doc.element(id) else {
        return false;
    };
    match test {
        NameTest::SelfNode | NameTest::Any => true,
        NameTest::Name { local, namespace } => {
            el.name == *local
                && namespace
                    .as_ref()
                    .is_none_or(|ns| el.namespace.as_deref() == Some(ns.as_str()))
        }
    }
}

fn resolve_alternative<'d>(alt: &Alternative, doc: &'d Document, context: NodeId) -> Vec<Target<'d>> {
    let mut current = vec![context];

    for step in &alt.steps {
        let mut next = Vec::new();
        for &node in &current {
            let candidates: Vec<NodeId> = match (&step.test, step.axis) {
                (NameTest::SelfNode, Axis::Child) => vec![node],
                (NameTest::SelfNode, Axis::Descendant) => {
                    let mut all = vec![node];
                    all.extend(doc.descendant_elements(node));
                    all
                }
                (test, Axis::Child) => doc
                    .child_elements(node)
                    .filter(|child| matches(doc, *child, test))
                    .collect(),
                (test, Axis::Descendant) => doc
                    .descendant_elements(node)
                    .into_iter()
                    .filter(|child| matches(doc, *child, test))
                    .collect(),
            };

            match step.position {
                Some(position) => next.extend(candidates.get(position - 1).copied()),
                None => next.extend(candidates),
            }
        }

        next.sort_unstable();
        next.dedup();
        tracing::trace!(step = ?step.test, matched = next.len(), "path step");
        if next.is_empty() {
            return Vec::new();
        }
        current = next;
    }

    match &alt.attribute {
        Some(name) => current
            .into_iter()
            .filter_map(|id| doc.attr(id, name).map(|value| Target::Attribute(id, value)))
            .collect(),
        None => current
            .into_iter()
            .filter(|id| doc.element(*id).is_some())
            .map(Target::Node)
            .collect(),
    }
}
