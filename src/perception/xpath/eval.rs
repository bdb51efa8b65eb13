//! Evaluates a parsed query against an [`XmlTree`].
use crate::errors::{DroidLensError, DroidLensResult};
use crate::perception::xml_tree::{NodeId, XmlTree};
use crate::perception::xpath::parser::{ArithOp, Axis, CmpOp, Expr, Function, NodeTest, Step};

/// A node addressed by a query: an element (or the document node), or one
/// attribute of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Item {
    Node(NodeId),
    Attribute(NodeId, usize),
}

impl Item {
    /// Document-order key. Attributes sort after their owner and before its
    /// children, which all have larger ids.
    fn order_key(self) -> (usize, usize) {
        match self {
            Item::Node(id) => (id.index(), 0),
            Item::Attribute(id, i) => (id.index(), i + 1),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Value {
    Nodes(Vec<Item>),
    Str(String),
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy)]
struct Context {
    item: Item,
    position: usize,
    size: usize,
}

pub(crate) struct Evaluator<'t> {
    tree: &'t XmlTree,
}

impl<'t> Evaluator<'t> {
    pub(crate) fn new(tree: &'t XmlTree) -> Self {
        Self { tree }
    }

    /// Evaluates `expr` with the document node as context.
    pub(crate) fn evaluate(&self, expr: &Expr) -> DroidLensResult<Value> {
        let ctx = Context {
            item: Item::Node(NodeId::DOCUMENT),
            position: 1,
            size: 1,
        };
        self.eval(expr, ctx)
    }

    fn eval(&self, expr: &Expr, ctx: Context) -> DroidLensResult<Value> {
        match expr {
            Expr::Or(lhs, rhs) => {
                let l = self.boolean(&self.eval(lhs, ctx)?);
                Ok(Value::Bool(l || self.boolean(&self.eval(rhs, ctx)?)))
            }
            Expr::And(lhs, rhs) => {
                let l = self.boolean(&self.eval(lhs, ctx)?);
                Ok(Value::Bool(l && self.boolean(&self.eval(rhs, ctx)?)))
            }
            Expr::Compare(op, lhs, rhs) => {
                let l = self.eval(lhs, ctx)?;
                let r = self.eval(rhs, ctx)?;
                Ok(Value::Bool(self.compare(*op, &l, &r)))
            }
            Expr::Arith(op, lhs, rhs) => {
                let l = self.number(&self.eval(lhs, ctx)?);
                let r = self.number(&self.eval(rhs, ctx)?);
                Ok(Value::Num(match op {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                    ArithOp::Mul => l * r,
                    ArithOp::Div => l / r,
                    ArithOp::Mod => l % r,
                }))
            }
            Expr::Negate(inner) => Ok(Value::Num(-self.number(&self.eval(inner, ctx)?))),
            Expr::Union(lhs, rhs) => {
                let mut items = self.node_set(self.eval(lhs, ctx)?, "|")?;
                items.extend(self.node_set(self.eval(rhs, ctx)?, "|")?);
                Ok(Value::Nodes(document_order(items)))
            }
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    Item::Node(NodeId::DOCUMENT)
                } else {
                    ctx.item
                };
                Ok(Value::Nodes(self.apply_steps(vec![start], steps)?))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let mut items = self.node_set(self.eval(primary, ctx)?, "a predicate")?;
                for predicate in predicates {
                    items = self.filter(items, predicate)?;
                }
                Ok(Value::Nodes(self.apply_steps(items, steps)?))
            }
            Expr::Literal(s) => Ok(Value::Str(s.clone())),
            Expr::Number(n) => Ok(Value::Num(*n)),
            Expr::Call(function, args) => self.call(*function, args, ctx),
        }
    }

    fn apply_steps(&self, mut items: Vec<Item>, steps: &[Step]) -> DroidLensResult<Vec<Item>> {
        for step in steps {
            let mut next = Vec::new();
            for item in &items {
                let candidates: Vec<Item> = self
                    .axis(*item, step.axis)
                    .into_iter()
                    .filter(|c| self.matches(*c, step.axis, &step.test))
                    .collect();
                let mut selected = candidates;
                for predicate in &step.predicates {
                    selected = self.filter(selected, predicate)?;
                }
                next.extend(selected);
            }
            items = document_order(next);
        }
        Ok(items)
    }

    /// Keeps the items for which `predicate` holds; positions follow the
    /// order of `items`.
    fn filter(&self, items: Vec<Item>, predicate: &Expr) -> DroidLensResult<Vec<Item>> {
        let size = items.len();
        let mut kept = Vec::with_capacity(size);
        for (i, item) in items.into_iter().enumerate() {
            let ctx = Context {
                item,
                position: i + 1,
                size,
            };
            let keep = match self.eval(predicate, ctx)? {
                Value::Num(n) => n == ctx.position as f64,
                other => self.boolean(&other),
            };
            if keep {
                kept.push(item);
            }
        }
        Ok(kept)
    }

    /// Nodes along `axis` from `item`, in proximity order.
    fn axis(&self, item: Item, axis: Axis) -> Vec<Item> {
        let tree = self.tree;
        let nodes = |ids: Vec<NodeId>| ids.into_iter().map(Item::Node).collect::<Vec<_>>();
        match item {
            Item::Node(id) => match axis {
                Axis::Child => nodes(tree.node(id).children().to_vec()),
                Axis::Descendant => nodes(tree.descendants(id).collect()),
                Axis::DescendantOrSelf => {
                    let mut out = vec![Item::Node(id)];
                    out.extend(tree.descendants(id).map(Item::Node));
                    out
                }
                Axis::Parent => nodes(tree.node(id).parent().into_iter().collect()),
                Axis::Ancestor => nodes(tree.ancestors(id)),
                Axis::AncestorOrSelf => {
                    let mut out = vec![Item::Node(id)];
                    out.extend(tree.ancestors(id).into_iter().map(Item::Node));
                    out
                }
                Axis::FollowingSibling | Axis::PrecedingSibling => {
                    let Some(parent) = tree.node(id).parent() else {
                        return Vec::new();
                    };
                    let siblings = tree.node(parent).children();
                    let at = siblings.iter().position(|s| *s == id).unwrap_or(0);
                    if axis == Axis::FollowingSibling {
                        nodes(siblings[at + 1..].to_vec())
                    } else {
                        nodes(siblings[..at].iter().rev().copied().collect())
                    }
                }
                Axis::Following => self.following(id),
                Axis::Preceding => self.preceding(id),
                Axis::SelfAxis => vec![item],
                Axis::Attribute => (0..tree.node(id).attributes().len())
                    .map(|i| Item::Attribute(id, i))
                    .collect(),
            },
            Item::Attribute(owner, _) => match axis {
                Axis::Parent => vec![Item::Node(owner)],
                Axis::Ancestor | Axis::AncestorOrSelf => {
                    let mut out = Vec::new();
                    if axis == Axis::AncestorOrSelf {
                        out.push(item);
                    }
                    out.push(Item::Node(owner));
                    out.extend(tree.ancestors(owner).into_iter().map(Item::Node));
                    out
                }
                Axis::SelfAxis | Axis::DescendantOrSelf => vec![item],
                Axis::Following => tree
                    .descendants(owner)
                    .map(Item::Node)
                    .chain(self.following(owner))
                    .collect(),
                Axis::Preceding => self.preceding(owner),
                _ => Vec::new(),
            },
        }
    }

    fn following(&self, id: NodeId) -> Vec<Item> {
        (self.tree.subtree_end(id)..self.tree.len())
            .map(|i| Item::Node(NodeId(i)))
            .collect()
    }

    fn preceding(&self, id: NodeId) -> Vec<Item> {
        let ancestors = self.tree.ancestors(id);
        (1..id.index())
            .rev()
            .map(NodeId)
            .filter(|n| !ancestors.contains(n))
            .map(Item::Node)
            .collect()
    }

    fn matches(&self, item: Item, axis: Axis, test: &NodeTest) -> bool {
        match (item, test) {
            (_, NodeTest::AnyNode) => true,
            (Item::Attribute(..), NodeTest::Wildcard) => axis == Axis::Attribute,
            (Item::Attribute(id, i), NodeTest::Name(name)) => {
                axis == Axis::Attribute && self.tree.node(id).attributes()[i].0 == *name
            }
            (Item::Node(id), NodeTest::Wildcard) => axis != Axis::Attribute && id != NodeId::DOCUMENT,
            (Item::Node(id), NodeTest::Name(name)) => {
                axis != Axis::Attribute && id != NodeId::DOCUMENT && self.tree.node(id).name() == name
            }
        }
    }

    fn call(&self, function: Function, args: &[Expr], ctx: Context) -> DroidLensResult<Value> {
        let arg = |i: usize| self.eval(&args[i], ctx);
        let string_arg = |i: usize| -> DroidLensResult<String> {
            if args.len() > i {
                Ok(self.string(&arg(i)?))
            } else {
                Ok(self.item_string(ctx.item))
            }
        };

        Ok(match function {
            Function::Last => Value::Num(ctx.size as f64),
            Function::Position => Value::Num(ctx.position as f64),
            Function::Count => Value::Num(self.node_set(arg(0)?, "count()")?.len() as f64),
            Function::Not => Value::Bool(!self.boolean(&arg(0)?)),
            Function::True => Value::Bool(true),
            Function::False => Value::Bool(false),
            Function::Boolean => Value::Bool(self.boolean(&arg(0)?)),
            Function::Number => {
                if args.is_empty() {
                    Value::Num(parse_number(&self.item_string(ctx.item)))
                } else {
                    Value::Num(self.number(&arg(0)?))
                }
            }
            Function::String => Value::Str(string_arg(0)?),
            Function::Concat => {
                let mut out = String::new();
                for a in args {
                    out.push_str(&self.string(&self.eval(a, ctx)?));
                }
                Value::Str(out)
            }
            Function::Contains => Value::Bool(string_arg(0)?.contains(string_arg(1)?.as_str())),
            Function::StartsWith => Value::Bool(string_arg(0)?.starts_with(string_arg(1)?.as_str())),
            Function::StringLength => Value::Num(string_arg(0)?.chars().count() as f64),
            Function::NormalizeSpace => {
                Value::Str(string_arg(0)?.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            Function::Name | Function::LocalName => {
                let target = if args.is_empty() {
                    Some(ctx.item)
                } else {
                    self.node_set(arg(0)?, "name()")?.first().copied()
                };
                let name = target.map(|t| self.item_name(t)).unwrap_or_default();
                if function == Function::LocalName {
                    Value::Str(name.rsplit(':').next().unwrap_or_default().to_string())
                } else {
                    Value::Str(name)
                }
            }
            Function::SubstringBefore => {
                let haystack = string_arg(0)?;
                let needle = string_arg(1)?;
                Value::Str(
                    haystack
                        .find(needle.as_str())
                        .map(|at| haystack[..at].to_string())
                        .unwrap_or_default(),
                )
            }
            Function::SubstringAfter => {
                let haystack = string_arg(0)?;
                let needle = string_arg(1)?;
                Value::Str(
                    haystack
                        .find(needle.as_str())
                        .map(|at| haystack[at + needle.len()..].to_string())
                        .unwrap_or_default(),
                )
            }
        })
    }

    fn node_set(&self, value: Value, site: &str) -> DroidLensResult<Vec<Item>> {
        match value {
            Value::Nodes(items) => Ok(items),
            other => Err(DroidLensError::QuerySyntax(format!(
                "{site} expects a node-set, got {}",
                type_name(&other)
            ))),
        }
    }

    fn item_name(&self, item: Item) -> String {
        match item {
            Item::Node(id) => self.tree.node(id).name().to_string(),
            Item::Attribute(id, i) => self.tree.node(id).attributes()[i].0.clone(),
        }
    }

    fn item_string(&self, item: Item) -> String {
        match item {
            Item::Node(id) => self.tree.string_value(id),
            Item::Attribute(id, i) => self.tree.node(id).attributes()[i].1.clone(),
        }
    }

    fn string(&self, value: &Value) -> String {
        match value {
            Value::Nodes(items) => items
                .first()
                .map(|item| self.item_string(*item))
                .unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn number(&self, value: &Value) -> f64 {
        match value {
            Value::Num(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => parse_number(&self.string(other)),
        }
    }

    fn boolean(&self, value: &Value) -> bool {
        match value {
            Value::Nodes(items) => !items.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn compare(&self, op: CmpOp, lhs: &Value, rhs: &Value) -> bool {
        match (lhs, rhs) {
            (Value::Nodes(l), Value::Nodes(r)) => {
                let rs: Vec<String> = r.iter().map(|i| self.item_string(*i)).collect();
                l.iter().any(|li| {
                    let ls = self.item_string(*li);
                    rs.iter().any(|r| {
                        self.compare_atoms(op, &Value::Str(ls.clone()), &Value::Str(r.clone()))
                    })
                })
            }
            (Value::Nodes(l), Value::Bool(_)) => {
                self.compare_atoms(op, &Value::Bool(!l.is_empty()), rhs)
            }
            (Value::Bool(_), Value::Nodes(r)) => {
                self.compare_atoms(op, lhs, &Value::Bool(!r.is_empty()))
            }
            (Value::Nodes(l), atom) => l
                .iter()
                .any(|i| self.compare_atoms(op, &self.coerce_like(*i, atom), atom)),
            (atom, Value::Nodes(r)) => r
                .iter()
                .any(|i| self.compare_atoms(op, atom, &self.coerce_like(*i, atom))),
            (l, r) => self.compare_atoms(op, l, r),
        }
    }

    /// A node's value converted to the type it is compared against.
    fn coerce_like(&self, item: Item, atom: &Value) -> Value {
        let s = self.item_string(item);
        match atom {
            Value::Num(_) => Value::Num(parse_number(&s)),
            _ => Value::Str(s),
        }
    }

    fn compare_atoms(&self, op: CmpOp, lhs: &Value, rhs: &Value) -> bool {
        match op {
            CmpOp::Eq | CmpOp::Neq => {
                let equal = match (lhs, rhs) {
                    (Value::Bool(_), _) | (_, Value::Bool(_)) => self.boolean(lhs) == self.boolean(rhs),
                    (Value::Num(_), _) | (_, Value::Num(_)) => self.number(lhs) == self.number(rhs),
                    _ => self.string(lhs) == self.string(rhs),
                };
                equal == (op == CmpOp::Eq)
            }
            CmpOp::Lt => self.number(lhs) < self.number(rhs),
            CmpOp::Le => self.number(lhs) <= self.number(rhs),
            CmpOp::Gt => self.number(lhs) > self.number(rhs),
            CmpOp::Ge => self.number(lhs) >= self.number(rhs),
        }
    }
}

fn document_order(mut items: Vec<Item>) -> Vec<Item> {
    items.sort_by_key(|item| item.order_key());
    items.dedup();
    items
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Nodes(_) => "node-set",
        Value::Str(_) => "string",
        Value::Num(_) => "number",
        Value::Bool(_) => "boolean",
    }
}

/// XPath `number()` on a string: optional minus, digits, optional fraction.
fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    let digits = t.strip_prefix('-').unwrap_or(t);
    let valid = !digits.is_empty()
        && digits != "."
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1;
    if valid {
        t.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        // -0 prints as "0".
        "0".to_string()
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::xpath::XPath;

    const DUMP: &str = r#"<hierarchy rotation="0">
  <node index="0" text="" class="android.widget.FrameLayout">
    <node index="0" text="Phone" class="android.widget.TextView"/>
    <node index="1" text="Chrome" class="android.widget.TextView"/>
    <node index="2" text="" class="android.view.ViewGroup">
      <node index="0" text="Maps" class="android.widget.TextView"/>
    </node>
  </node>
</hierarchy>"#;

    fn eval(expr: &str) -> Value {
        let tree = XmlTree::parse(DUMP).unwrap();
        let xpath = XPath::compile(expr).unwrap();
        Evaluator::new(&tree).evaluate(xpath.expr()).unwrap()
    }

    fn texts(expr: &str) -> Vec<String> {
        let tree = XmlTree::parse(DUMP).unwrap();
        let xpath = XPath::compile(expr).unwrap();
        match Evaluator::new(&tree).evaluate(xpath.expr()).unwrap() {
            Value::Nodes(items) => items
                .into_iter()
                .map(|i| match i {
                    Item::Node(id) => tree.node(id).attribute("text").unwrap_or("").to_string(),
                    Item::Attribute(id, a) => tree.node(id).attributes()[a].1.clone(),
                })
                .collect(),
            other => panic!("expected nodes, got {other:?}"),
        }
    }

    #[test]
    fn test_descendant_with_equality() {
        assert_eq!(texts(r#"//node[@index="0"]"#), vec!["", "Phone", "Maps"]);
        assert_eq!(texts("//node[@text='Chrome']"), vec!["Chrome"]);
        assert!(texts("//node[@text='Gmail']").is_empty());
    }

    #[test]
    fn test_positional_predicates() {
        assert_eq!(texts("/hierarchy/node/node[2]"), vec!["Chrome"]);
        assert_eq!(texts("/hierarchy/node/node[last()]"), vec![""]);
        assert_eq!(texts("(//node[@class='android.widget.TextView'])[3]"), vec!["Maps"]);
        // `//node[1]` is per parent, not global.
        assert_eq!(texts("//node[1]"), vec!["", "Phone", "Maps"]);
        assert_eq!(texts("//node[position() > 1 and @text != '']"), vec!["Chrome"]);
    }

    #[test]
    fn test_reverse_axes_count_backwards() {
        assert_eq!(
            texts("//node[@text='Maps']/ancestor::node[1]/preceding-sibling::node[1]"),
            vec!["Chrome"]
        );
        assert_eq!(texts("//node[@text='Maps']/../.."), vec![""]);
    }

    #[test]
    fn test_functions() {
        assert_eq!(texts("//node[contains(@class, 'ViewGroup')]/node"), vec!["Maps"]);
        assert_eq!(texts("//node[starts-with(@text, 'Ch')]"), vec!["Chrome"]);
        assert_eq!(texts("//node[string-length(@text) = 4]"), vec!["Maps"]);
        assert_eq!(texts("//node[not(node()) and @text='Phone']"), vec!["Phone"]);
        assert_eq!(
            texts("//node[substring-after(@class, 'android.widget.') = 'TextView'][1]"),
            vec!["Phone", "Maps"]
        );
        assert!(matches!(eval("count(//node)"), Value::Num(n) if n == 5.0));
        assert!(matches!(eval("name(/*)"), Value::Str(s) if s == "hierarchy"));
        assert!(matches!(eval("concat('a', 1, true())"), Value::Str(s) if s == "a1true"));
    }

    #[test]
    fn test_attribute_and_union_results() {
        assert_eq!(
            texts("//node[@index='1']/@text | //node[@text='Maps']"),
            vec!["Chrome", "Maps"]
        );
        assert_eq!(texts("//node[@text='Phone'] | //node[@text='Phone']"), vec!["Phone"]);
    }

    #[test]
    fn test_number_comparisons() {
        assert_eq!(texts("//node[@index >= 2]"), vec![""]);
        assert_eq!(texts("//node[@index = 1.0]"), vec!["Chrome"]);
        assert!(matches!(eval("1 + 2 * 3"), Value::Num(n) if n == 7.0));
        assert!(matches!(eval("7 mod 3 - -1"), Value::Num(n) if n == 2.0));
    }

    #[test]
    fn test_type_errors() {
        let tree = XmlTree::parse(DUMP).unwrap();
        let xpath = XPath::compile("count('x')").unwrap();
        assert!(matches!(
            Evaluator::new(&tree).evaluate(xpath.expr()),
            Err(DroidLensError::QuerySyntax(_))
        ));
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert!(parse_number("abc").is_nan());
        assert!(parse_number("1e5").is_nan());
        assert_eq!(parse_number(" -12.5 "), -12.5);
    }
}
