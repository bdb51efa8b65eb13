//! Recursive-descent parser producing the query AST.
use crate::errors::{DroidLensError, DroidLensResult};
use crate::perception::xpath::lexer::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    SelfAxis,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "self" => Axis::SelfAxis,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeTest {
    /// `node()`
    AnyNode,
    /// `*`
    Wildcard,
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Step {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::AnyNode,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Last,
    Position,
    Count,
    Not,
    True,
    False,
    Boolean,
    Number,
    String,
    Concat,
    Contains,
    StartsWith,
    StringLength,
    NormalizeSpace,
    Name,
    LocalName,
    SubstringBefore,
    SubstringAfter,
}

impl Function {
    fn from_name(name: &str) -> Option<Function> {
        Some(match name {
            "last" => Function::Last,
            "position" => Function::Position,
            "count" => Function::Count,
            "not" => Function::Not,
            "true" => Function::True,
            "false" => Function::False,
            "boolean" => Function::Boolean,
            "number" => Function::Number,
            "string" => Function::String,
            "concat" => Function::Concat,
            "contains" => Function::Contains,
            "starts-with" => Function::StartsWith,
            "string-length" => Function::StringLength,
            "normalize-space" => Function::NormalizeSpace,
            "name" => Function::Name,
            "local-name" => Function::LocalName,
            "substring-before" => Function::SubstringBefore,
            "substring-after" => Function::SubstringAfter,
            _ => return None,
        })
    }

    /// Inclusive (min, max) argument count; `None` max means variadic.
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::Last | Function::Position | Function::True | Function::False => (0, Some(0)),
            Function::Count | Function::Not | Function::Boolean => (1, Some(1)),
            Function::Number
            | Function::String
            | Function::StringLength
            | Function::NormalizeSpace
            | Function::Name
            | Function::LocalName => (0, Some(1)),
            Function::Contains
            | Function::StartsWith
            | Function::SubstringBefore
            | Function::SubstringAfter => (2, Some(2)),
            Function::Concat => (2, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Path { absolute: bool, steps: Vec<Step> },
    /// A primary expression with predicates and an optional trailing path.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Literal(String),
    Number(f64),
    Call(Function, Vec<Expr>),
}

/// Deepest nesting of sub-expressions, operator chains and predicates a
/// query may have. Parsing and evaluation both recurse per level.
const MAX_DEPTH: usize = 128;

pub(crate) fn parse(tokens: &[Token], source: &str) -> DroidLensResult<Expr> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        source,
    };
    if tokens.is_empty() {
        return Err(parser.error("empty expression"));
    }
    let expr = parser.or_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(parser.error(&format!("unexpected token {tok:?}")));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn error(&self, msg: &str) -> DroidLensError {
        DroidLensError::QuerySyntax(format!("{msg} (token {}) in {:?}", self.pos, self.source))
    }

    fn enter(&mut self) -> DroidLensResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(DroidLensError::QuerySyntax(format!(
                "expression nested too deeply (more than {MAX_DEPTH} levels) in {:?}",
                self.source
            )));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token) -> DroidLensResult<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {tok:?}, found {:?}", self.peek())))
        }
    }

    fn or_expr(&mut self) -> DroidLensResult<Expr> {
        let mut lhs = self.and_expr()?;
        let mut chained = 0;
        while self.eat(&Token::Or) {
            self.enter()?;
            chained += 1;
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.leave(chained);
        Ok(lhs)
    }

    fn and_expr(&mut self) -> DroidLensResult<Expr> {
        let mut lhs = self.equality_expr()?;
        let mut chained = 0;
        while self.eat(&Token::And) {
            self.enter()?;
            chained += 1;
            let rhs = self.equality_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.leave(chained);
        Ok(lhs)
    }

    fn equality_expr(&mut self) -> DroidLensResult<Expr> {
        let mut lhs = self.relational_expr()?;
        let mut chained = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::Neq) => CmpOp::Neq,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            chained += 1;
            let rhs = self.relational_expr()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(rhs));
        }
        self.leave(chained);
        Ok(lhs)
    }

    fn relational_expr(&mut self) -> DroidLensResult<Expr> {
        let mut lhs = self.additive_expr()?;
        let mut chained = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Le) => CmpOp::Le,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Ge) => CmpOp::Ge,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            chained += 1;
            let rhs = self.additive_expr()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(rhs));
        }
        self.leave(chained);
        Ok(lhs)
    }

    fn additive_expr(&mut self) -> DroidLensResult<Expr> {
        let mut lhs = self.multiplicative_expr()?;
        let mut chained = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            chained += 1;
            let rhs = self.multiplicative_expr()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        self.leave(chained);
        Ok(lhs)
    }

    fn multiplicative_expr(&mut self) -> DroidLensResult<Expr> {
        let mut lhs = self.unary_expr()?;
        let mut chained = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Multiply) => ArithOp::Mul,
                Some(Token::Div) => ArithOp::Div,
                Some(Token::Mod) => ArithOp::Mod,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            chained += 1;
            let rhs = self.unary_expr()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        self.leave(chained);
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> DroidLensResult<Expr> {
        if self.eat(&Token::Minus) {
            self.enter()?;
            let inner = self.unary_expr()?;
            self.leave(1);
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.union_expr()
    }

    fn union_expr(&mut self) -> DroidLensResult<Expr> {
        let mut lhs = self.path_expr()?;
        let mut chained = 0;
        while self.eat(&Token::Pipe) {
            self.enter()?;
            chained += 1;
            let rhs = self.path_expr()?;
            lhs = Expr::Union(Box::new(lhs), Box::new(rhs));
        }
        self.leave(chained);
        Ok(lhs)
    }

    fn starts_primary(&self) -> bool {
        match self.peek() {
            Some(Token::Literal(_)) | Some(Token::Number(_)) | Some(Token::LParen) => true,
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen) && !is_node_type(name)
            }
            _ => false,
        }
    }

    fn path_expr(&mut self) -> DroidLensResult<Expr> {
        if self.starts_primary() {
            let primary = self.primary_expr()?;
            let predicates = self.predicates()?;
            let mut steps = Vec::new();
            if matches!(self.peek(), Some(Token::Slash) | Some(Token::DoubleSlash)) {
                self.relative_path_tail(&mut steps)?;
            }
            if predicates.is_empty() && steps.is_empty() {
                return Ok(primary);
            }
            return Ok(Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            });
        }
        self.location_path()
    }

    fn primary_expr(&mut self) -> DroidLensResult<Expr> {
        match self.peek() {
            Some(Token::Literal(s)) => {
                self.pos += 1;
                Ok(Expr::Literal(s.clone()))
            }
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(Expr::Number(*n))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                self.enter()?;
                let inner = self.or_expr()?;
                self.expect(&Token::RParen)?;
                self.leave(1);
                Ok(inner)
            }
            Some(Token::Name(name)) => {
                let function = Function::from_name(name)
                    .ok_or_else(|| self.error(&format!("unknown function {name}()")))?;
                self.pos += 2;
                let mut args = Vec::new();
                self.enter()?;
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.or_expr()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                self.leave(1);
                let (min, max) = function.arity();
                if args.len() < min || max.is_some_and(|m| args.len() > m) {
                    return Err(self.error(&format!(
                        "{name}() does not take {} argument(s)",
                        args.len()
                    )));
                }
                Ok(Expr::Call(function, args))
            }
            other => Err(self.error(&format!("expected expression, found {other:?}"))),
        }
    }

    fn location_path(&mut self) -> DroidLensResult<Expr> {
        let mut steps = Vec::new();
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if self.starts_step() {
                    self.step_into(&mut steps)?;
                    self.relative_path_tail(&mut steps)?;
                }
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.relative_path_tail(&mut steps)?;
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            _ => {
                self.step_into(&mut steps)?;
                self.relative_path_tail(&mut steps)?;
                Ok(Expr::Path {
                    absolute: false,
                    steps,
                })
            }
        }
    }

    /// Consumes any number of `/step` and `//step` continuations.
    fn relative_path_tail(&mut self, steps: &mut Vec<Step>) -> DroidLensResult<()> {
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                    self.step_into(steps)?;
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(Step::descendant_or_self());
                    self.step_into(steps)?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot)
                | Some(Token::DotDot)
                | Some(Token::At)
                | Some(Token::Star)
                | Some(Token::Name(_))
        )
    }

    fn step_into(&mut self, steps: &mut Vec<Step>) -> DroidLensResult<()> {
        let step = match self.peek() {
            Some(Token::Dot) => {
                self.pos += 1;
                Step {
                    axis: Axis::SelfAxis,
                    test: NodeTest::AnyNode,
                    predicates: Vec::new(),
                }
            }
            Some(Token::DotDot) => {
                self.pos += 1;
                Step {
                    axis: Axis::Parent,
                    test: NodeTest::AnyNode,
                    predicates: Vec::new(),
                }
            }
            _ => {
                let axis = if self.eat(&Token::At) {
                    Axis::Attribute
                } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) =
                    (self.peek(), self.peek_at(1))
                {
                    let axis = Axis::from_name(name)
                        .ok_or_else(|| self.error(&format!("unknown axis {name}")))?;
                    self.pos += 2;
                    axis
                } else {
                    Axis::Child
                };
                let test = self.node_test()?;
                let predicates = self.predicates()?;
                Step {
                    axis,
                    test,
                    predicates,
                }
            }
        };
        steps.push(step);
        Ok(())
    }

    fn node_test(&mut self) -> DroidLensResult<NodeTest> {
        match self.peek() {
            Some(Token::Star) => {
                self.pos += 1;
                Ok(NodeTest::Wildcard)
            }
            Some(Token::Name(name)) if self.peek_at(1) == Some(&Token::LParen) => {
                if name != "node" {
                    return Err(self.error(&format!("unsupported node type test {name}()")));
                }
                self.pos += 2;
                self.expect(&Token::RParen)?;
                Ok(NodeTest::AnyNode)
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                Ok(NodeTest::Name(name.clone()))
            }
            other => Err(self.error(&format!("expected node test, found {other:?}"))),
        }
    }

    fn predicates(&mut self) -> DroidLensResult<Vec<Expr>> {
        let mut out = Vec::new();
        while self.eat(&Token::LBracket) {
            self.enter()?;
            out.push(self.or_expr()?);
            self.expect(&Token::RBracket)?;
            self.leave(1);
        }
        Ok(out)
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "node" | "text" | "comment" | "processing-instruction")
}
