//! Immutable element tree built from a hierarchy dump.
//!
//! Nodes live in a flat arena in pre-order, so a node's id doubles as its
//! document-order position and a subtree is the contiguous id range
//! `id..end`. Id 0 is the document node; it has no name and no attributes.
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::{DroidLensError, DroidLensResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub const DOCUMENT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Exclusive end of this node's subtree in the arena.
    end: usize,
}

impl XmlNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes in the order they appear in the dump.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Text content directly inside this element.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<XmlNode>,
    /// Every text segment with the element that directly contains it, in
    /// document order.
    text_runs: Vec<(NodeId, String)>,
}

impl XmlTree {
    /// Parses dump text into a tree. Stateless; safe to call from any thread.
    pub fn parse(xml: &str) -> DroidLensResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut nodes = vec![XmlNode {
            name: String::new(),
            attributes: Vec::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
            end: 0,
        }];
        let mut text_runs: Vec<(NodeId, String)> = Vec::new();
        let mut stack: Vec<NodeId> = vec![NodeId::DOCUMENT];
        let mut seen_root = false;

        loop {
            let event = reader.read_event().map_err(|e| {
                DroidLensError::Parse(format!("at byte {}: {}", reader.buffer_position(), e))
            })?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    if stack.len() == 1 {
                        if seen_root {
                            return Err(DroidLensError::Parse(format!(
                                "at byte {}: multiple root elements",
                                reader.buffer_position()
                            )));
                        }
                        seen_root = true;
                    }
                    let parent = *stack.last().unwrap_or(&NodeId::DOCUMENT);
                    let id = NodeId(nodes.len());
                    nodes.push(XmlNode {
                        name: tag_name(e.name().as_ref())?,
                        attributes: read_attributes(e)?,
                        text: String::new(),
                        parent: Some(parent),
                        children: Vec::new(),
                        end: id.0 + 1,
                    });
                    nodes[parent.0].children.push(id);
                    if matches!(event, Event::Start(_)) {
                        stack.push(id);
                    }
                }
                Event::End(ref e) => {
                    let name = tag_name(e.name().as_ref())?;
                    if stack.len() == 1 {
                        return Err(DroidLensError::Parse(format!(
                            "at byte {}: unexpected closing tag </{}>",
                            reader.buffer_position(),
                            name
                        )));
                    }
                    let closed = stack.pop().unwrap_or(NodeId::DOCUMENT);
                    if nodes[closed.0].name != name {
                        return Err(DroidLensError::Parse(format!(
                            "at byte {}: expected </{}>, found </{}>",
                            reader.buffer_position(),
                            nodes[closed.0].name,
                            name
                        )));
                    }
                    nodes[closed.0].end = nodes.len();
                }
                Event::Text(ref e) => {
                    let text = e.unescape().map_err(|e| {
                        DroidLensError::Parse(format!("at byte {}: {}", reader.buffer_position(), e))
                    })?;
                    let pos = reader.buffer_position();
                    append_text(&mut nodes, &mut text_runs, &stack, &text, pos)?;
                }
                Event::CData(ref e) => {
                    let text = String::from_utf8_lossy(e).into_owned();
                    let pos = reader.buffer_position();
                    append_text(&mut nodes, &mut text_runs, &stack, &text, pos)?;
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions, doctype.
                _ => {}
            }
        }

        if stack.len() > 1 {
            let open: Vec<&str> = stack[1..].iter().map(|id| nodes[id.0].name.as_str()).collect();
            return Err(DroidLensError::Parse(format!(
                "unexpected end of document, unclosed elements: {}",
                open.join(" > ")
            )));
        }
        if !seen_root {
            return Err(DroidLensError::Parse("document has no root element".into()));
        }

        nodes[0].end = nodes.len();
        tracing::debug!(nodes = nodes.len() - 1, "hierarchy dump parsed");
        Ok(Self { nodes, text_runs })
    }

    pub fn node(&self, id: NodeId) -> &XmlNode {
        &self.nodes[id.0]
    }

    /// Number of arena slots, including the document node.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// The single top-level element.
    pub fn root_element(&self) -> NodeId {
        self.nodes[0].children[0]
    }

    /// Ids of every node below `id`, in document order.
    pub(crate) fn descendants(&self, id: NodeId) -> impl DoubleEndedIterator<Item = NodeId> {
        (id.0 + 1..self.nodes[id.0].end).map(NodeId)
    }

    pub(crate) fn subtree_end(&self, id: NodeId) -> usize {
        self.nodes[id.0].end
    }

    /// Ancestors of `id`, nearest first. Includes the document node.
    pub(crate) fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.nodes[id.0].parent;
        while let Some(p) = cur {
            out.push(p);
            cur = self.nodes[p.0].parent;
        }
        out
    }

    /// XPath string-value: all text in the subtree, in document order.
    pub(crate) fn string_value(&self, id: NodeId) -> String {
        let subtree = id.0..self.nodes[id.0].end;
        self.text_runs
            .iter()
            .filter(|(owner, _)| subtree.contains(&owner.0))
            .map(|(_, text)| text.as_str())
            .collect()
    }
}

fn tag_name(raw: &[u8]) -> DroidLensResult<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| DroidLensError::Parse(format!("tag name is not UTF-8: {e}")))
}

fn read_attributes(e: &BytesStart<'_>) -> DroidLensResult<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| DroidLensError::Parse(format!("bad attribute: {err}")))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| DroidLensError::Parse(format!("attribute name is not UTF-8: {err}")))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| DroidLensError::Parse(format!("attribute {key}: {err}")))?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn append_text(
    nodes: &mut [XmlNode],
    text_runs: &mut Vec<(NodeId, String)>,
    stack: &[NodeId],
    text: &str,
    pos: usize,
) -> DroidLensResult<()> {
    if text.trim().is_empty() {
        return Ok(());
    }
    match stack.last() {
        Some(&id) if id != NodeId::DOCUMENT => {
            nodes[id.0].text.push_str(text);
            text_runs.push((id, text.to_string()));
            Ok(())
        }
        _ => Err(DroidLensError::Parse(format!(
            "at byte {pos}: text outside the root element"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" text="">
    <node index="0" text="A"/>
    <node index="1" text="B &amp; C"><node index="0" text="D"/></node>
  </node>
</hierarchy>"#;

    #[test]
    fn test_parse_pre_order_layout() {
        let tree = XmlTree::parse(SMALL).unwrap();
        assert_eq!(tree.len(), 6);
        let root = tree.root_element();
        assert_eq!(root, NodeId(1));
        assert_eq!(tree.node(root).name(), "hierarchy");
        assert_eq!(tree.node(root).attribute("rotation"), Some("0"));

        let names: Vec<_> = tree
            .descendants(NodeId::DOCUMENT)
            .map(|id| tree.node(id).attribute("text").unwrap_or("-").to_string())
            .collect();
        assert_eq!(names, vec!["-", "", "A", "B & C", "D"]);
        assert_eq!(tree.subtree_end(NodeId(4)), 6);
        assert_eq!(tree.ancestors(NodeId(5)), vec![NodeId(4), NodeId(2), NodeId(1), NodeId(0)]);
    }

    #[test]
    fn test_attribute_order_preserved() {
        let tree = XmlTree::parse(r#"<a z="1" b="2" m="3"/>"#).unwrap();
        let keys: Vec<_> = tree
            .node(tree.root_element())
            .attributes()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["z", "b", "m"]);
    }

    #[test]
    fn test_text_content() {
        let tree = XmlTree::parse("<a>hello<b>world</b></a>").unwrap();
        assert_eq!(tree.string_value(tree.root_element()), "helloworld");
    }

    #[test]
    fn test_text_split_around_children_keeps_document_order() {
        let tree = XmlTree::parse("<a>x<b>y</b>z</a>").unwrap();
        let root = tree.root_element();
        assert_eq!(tree.string_value(root), "xyz");
        assert_eq!(tree.string_value(NodeId::DOCUMENT), "xyz");
        assert_eq!(tree.node(root).text(), "xz");
        assert_eq!(tree.string_value(tree.node(root).children()[0]), "y");
    }

    #[test]
    fn test_rejects_truncated_document() {
        let truncated = &SMALL[..SMALL.len() - 20];
        assert!(matches!(XmlTree::parse(truncated), Err(DroidLensError::Parse(_))));
        assert!(matches!(XmlTree::parse("<a><b></a>"), Err(DroidLensError::Parse(_))));
        assert!(matches!(XmlTree::parse("<a x=\"1"), Err(DroidLensError::Parse(_))));
    }

    #[test]
    fn test_rejects_non_documents() {
        assert!(matches!(XmlTree::parse(""), Err(DroidLensError::Parse(_))));
        assert!(matches!(XmlTree::parse("not xml at all"), Err(DroidLensError::Parse(_))));
        assert!(matches!(XmlTree::parse("<a/><b/>"), Err(DroidLensError::Parse(_))));
        assert!(matches!(XmlTree::parse("</a>"), Err(DroidLensError::Parse(_))));
    }
}
