//! Document trees
//!
//! XML (quick-xml) and HTML (scraper) are both flattened into the same
//! immutable arena so that field paths resolve identically on either.
//! Node ids are handed out in document order; id 0 is a synthetic document
//! node whose element children are the top-level elements.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

/// Index of a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

/// Markup flavour of a source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Xml,
    Html,
}

impl DocumentKind {
    /// Guess the markup flavour from the first bytes of the input
    pub fn detect(input: &str) -> Self {
        let head = input.trim_start();
        if head.starts_with("<?xml") {
            return DocumentKind::Xml;
        }
        let probe: String = head.chars().take(1024).collect::<String>().to_ascii_lowercase();
        if probe.starts_with("<!doctype html") || has_html_tag(&probe) {
            DocumentKind::Html
        } else {
            DocumentKind::Xml
        }
    }
}

/// `<html` as a whole tag name, not a prefix such as `<htmlBody`
fn has_html_tag(probe: &str) -> bool {
    probe.match_indices("<html").any(|(at, tag)| {
        matches!(
            probe[at + tag.len()..].chars().next(),
            Some(c) if c == '>' || c == '/' || c.is_whitespace()
        )
    })
}

/// Element data: local name, namespace URI and attributes in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub namespace: Option<String>,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    children: Vec<NodeId>,
}

/// Parsed, read-only document tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// A document without any element
    pub fn empty() -> Self {
        TreeBuilder::new().finish()
    }

    /// Parse `input` as the given markup flavour
    pub fn parse(input: &str, kind: DocumentKind) -> Result<Self, DocumentError> {
        match kind {
            DocumentKind::Xml => Self::parse_xml(input),
            DocumentKind::Html => Ok(Self::parse_html(input)),
        }
    }

    /// Parse an XML document, resolving namespace prefixes to URIs
    pub fn parse_xml(xml: &str) -> Result<Self, DocumentError> {
        let mut reader = NsReader::from_str(xml);
        let mut builder = TreeBuilder::new();

        loop {
            let (namespace, event) = match reader.read_resolved_event() {
                Ok((ns, event)) => (namespace_uri(ns), event),
                Err(source) => {
                    return Err(DocumentError::Xml {
                        position: reader.buffer_position() as u64,
                        source,
                    })
                }
            };

            let step = match event {
                Event::Start(e) => element_from_xml(namespace, &e).map(|el| builder.open(el)),
                Event::Empty(e) => element_from_xml(namespace, &e).map(|el| {
                    builder.open(el);
                    builder.close();
                }),
                Event::End(_) => {
                    builder.close();
                    Ok(())
                }
                Event::Text(e) => e.unescape().map(|text| builder.text(&text)),
                Event::CData(e) => {
                    builder.text(&String::from_utf8_lossy(&e.into_inner()));
                    Ok(())
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions, DOCTYPE
                _ => Ok(()),
            };

            if let Err(source) = step {
                return Err(DocumentError::Xml {
                    position: reader.buffer_position() as u64,
                    source,
                });
            }
        }

        if let Some(open) = builder.innermost_open() {
            return Err(DocumentError::Unclosed(open.to_string()));
        }

        Ok(builder.finish())
    }

    /// Parse an HTML document. HTML parsing is lenient and never fails;
    /// whitespace-only input produces an empty document.
    pub fn parse_html(html: &str) -> Self {
        let mut builder = TreeBuilder::new();
        if html.trim().is_empty() {
            return builder.finish();
        }

        let document = Html::parse_document(html);
        walk_html(&mut builder, document.root_element());
        builder.finish()
    }

    /// The synthetic document node
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// First top-level element
    pub fn root_element(&self) -> Option<NodeId> {
        self.child_elements(self.root()).next()
    }

    /// True when the document holds no element at all
    pub fn is_empty(&self) -> bool {
        self.root_element().is_none()
    }

    /// Total number of nodes, including the document node
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Element children of `id`, in document order
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
    }

    /// Element descendants of `id` (excluding `id`), in document order
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.child_elements(id).collect();
        stack.reverse();

        while let Some(next) = stack.pop() {
            found.push(next);
            let before = stack.len();
            stack.extend(self.child_elements(next));
            stack[before..].reverse();
        }

        found
    }

    /// Concatenated text of all descendant text nodes, untrimmed
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            _ => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Attribute value of an element by local name
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }
}

/// Appends nodes in document order while tracking open elements
struct TreeBuilder {
    nodes: Vec<Node>,
    open: Vec<NodeId>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                children: Vec::new(),
            }],
            open: Vec::new(),
        }
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(NodeId(0))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let parent = self.current();
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn open(&mut self, element: Element) {
        let id = self.push(NodeKind::Element(element));
        self.open.push(id);
    }

    fn close(&mut self) {
        self.open.pop();
    }

    /// Whitespace-only runs are kept (`<b>A</b> <i>B</i>` reads `A B`);
    /// values are trimmed when read
    fn text(&mut self, text: &str) {
        // Top-level text outside any element is not part of the tree
        if self.open.is_empty() {
            return;
        }
        self.push(NodeKind::Text(text.to_string()));
    }

    fn innermost_open(&self) -> Option<&str> {
        let id = self.open.last()?;
        match &self.nodes[id.0].kind {
            NodeKind::Element(el) => Some(el.name.as_str()),
            _ => None,
        }
    }

    fn finish(self) -> Document {
        Document { nodes: self.nodes }
    }
}

fn namespace_uri(resolved: ResolveResult<'_>) -> Option<String> {
    match resolved {
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        _ => None,
    }
}

fn element_from_xml(
    namespace: Option<String>,
    start: &BytesStart<'_>,
) -> Result<Element, quick_xml::Error> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();

    for attr in start.attributes() {
        let attr = attr?;
        // xmlns declarations are consumed by the namespace resolver
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }

    Ok(Element {
        name,
        namespace,
        attrs,
    })
}

fn walk_html(builder: &mut TreeBuilder, element: ElementRef<'_>) {
    let value = element.value();
    builder.open(Element {
        name: value.name().to_string(),
        namespace: None,
        attrs: value
            .attrs()
            .map(|(key, val)| (key.to_string(), val.to_string()))
            .collect(),
    });

    for child in element.children() {
        match child.value() {
            scraper::Node::Text(text) => builder.text(text),
            scraper::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    walk_html(builder, child_el);
                }
            }
            _ => {}
        }
    }

    builder.close();
}
