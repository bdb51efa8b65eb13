//! XPath 1.0 subset used to select nodes from a hierarchy dump.
//!
//! Covers location paths over every axis except `namespace`, predicates,
//! filter expressions, unions, the boolean/relational/arithmetic operators
//! and the core string/node-set functions. Variables and node-type tests
//! other than `node()` are rejected at compile time.
mod eval;
mod lexer;
mod parser;

use std::fmt;
use std::str::FromStr;

use crate::errors::{DroidLensError, DroidLensResult};
use crate::perception::xml_tree::{NodeId, XmlTree};

use self::eval::{Evaluator, Item, Value};
use self::parser::Expr;

/// A compiled query. Immutable and shareable across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    pub fn compile(source: &str) -> DroidLensResult<Self> {
        let tokens = lexer::tokenize(source)?;
        let expr = parser::parse(&tokens, source)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub(crate) fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Matching element ids, in document order.
    ///
    /// Fails with `QuerySyntax` if the expression does not produce a node-set,
    /// or selects attributes or the document node.
    pub fn select(&self, tree: &XmlTree) -> DroidLensResult<Vec<NodeId>> {
        match Evaluator::new(tree).evaluate(self.expr())? {
            Value::Nodes(items) => items
                .into_iter()
                .map(|item| match item {
                    Item::Node(id) if id != NodeId::DOCUMENT => Ok(id),
                    _ => Err(DroidLensError::QuerySyntax(format!(
                        "{:?} selects non-element nodes",
                        self.source
                    ))),
                })
                .collect(),
            _ => Err(DroidLensError::QuerySyntax(format!(
                "{:?} does not evaluate to a node-set",
                self.source
            ))),
        }
    }
}

impl FromStr for XPath {
    type Err = DroidLensError;

    fn from_str(s: &str) -> DroidLensResult<Self> {
        XPath::compile(s)
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Quotes `value` as an XPath string literal.
///
/// XPath 1.0 has no escape sequences, so a value holding both quote kinds is
/// spliced together with `concat()`.
pub fn literal(value: &str) -> String {
    if !value.contains('"') {
        format!("\"{value}\"")
    } else if !value.contains('\'') {
        format!("'{value}'")
    } else {
        let parts: Vec<String> = value
            .split('"')
            .map(|part| format!("\"{part}\""))
            .collect();
        format!("concat({})", parts.join(", '\"', "))
    }
}

/// `//node[@attr=<value>]`, the form every convenience finder compiles to.
pub fn attribute_equals(attribute: &str, value: &str) -> String {
    format!("//node[@{attribute}={}]", literal(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_quoting() {
        assert_eq!(literal("OK"), "\"OK\"");
        assert_eq!(literal("say \"hi\""), "'say \"hi\"'");
        assert_eq!(literal(r#"it's "x""#), r#"concat("it's ", '"', "x", '"', "")"#);
    }

    #[test]
    fn test_quoted_values_round_trip() {
        let tree = XmlTree::parse(
            r#"<hierarchy><node text="it's &quot;x&quot;"/><node text="plain"/></hierarchy>"#,
        )
        .unwrap();
        for value in [r#"it's "x""#, "plain"] {
            let xpath = XPath::compile(&attribute_equals("text", value)).unwrap();
            let ids = xpath.select(&tree).unwrap();
            assert_eq!(ids.len(), 1, "{value}");
            assert_eq!(tree.node(ids[0]).attribute("text"), Some(value));
        }
    }

    #[test]
    fn test_select_rejects_non_elements() {
        let tree = XmlTree::parse(r#"<hierarchy><node text="a"/></hierarchy>"#).unwrap();
        for expr in ["//node/@text", "/", "count(//node)", "'x'"] {
            assert!(
                matches!(
                    XPath::compile(expr).unwrap().select(&tree),
                    Err(DroidLensError::QuerySyntax(_))
                ),
                "{expr}"
            );
        }
    }

    #[test]
    fn test_select_returns_document_order() {
        let tree = XmlTree::parse(
            r#"<hierarchy><node text="a"><node text="b"/></node><node text="c"/></hierarchy>"#,
        )
        .unwrap();
        let ids = XPath::compile("//node[@text='c'] | //node[@text='a'] | //node/node")
            .unwrap()
            .select(&tree)
            .unwrap();
        let texts: Vec<_> = ids
            .iter()
            .map(|id| tree.node(*id).attribute("text").unwrap())
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_string_value_follows_document_order() {
        let tree = XmlTree::parse("<a>x<b>y</b>z</a>").unwrap();
        let ids = XPath::compile("//*[. = 'xyz']").unwrap().select(&tree).unwrap();
        assert_eq!(ids, vec![tree.root_element()]);
        assert!(XPath::compile("//*[string() = 'xzy']")
            .unwrap()
            .select(&tree)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_from_str_and_display() {
        let xpath: XPath = "//node[@index='0']".parse().unwrap();
        assert_eq!(xpath.to_string(), "//node[@index='0']");
        assert!("//node[".parse::<XPath>().is_err());
    }
}
