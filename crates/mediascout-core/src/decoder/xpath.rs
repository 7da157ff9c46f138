//! XPath 1.0 subset evaluated over a parsed `scraper` document.
//!
//! Supported: absolute and relative location paths, `/` and `//`, `.` and
//! `..`, `*`, `@name`, `@*`, `text()`, `node()`, the common axes, predicates
//! (positional, comparisons, `and`/`or`) and a handful of string functions.
//! Arithmetic, variables and namespaces are not supported.

use std::collections::HashMap;

use ego_tree::NodeId;
use scraper::{ElementRef, Html};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid xpath `{expr}` at offset {offset}: {message}")]
pub struct XPathError {
    pub expr: String,
    pub offset: usize,
    pub message: String,
}

// ── Tokens ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    ColonColon,
    Star,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Name(String),
    Literal(String),
    Number(f64),
}

fn tokenize(expr: &str) -> Result<Vec<(usize, Token)>, XPathError> {
    let err = |offset: usize, message: &str| XPathError {
        expr: expr.to_string(),
        offset,
        message: message.to_string(),
    };

    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let single = match c {
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '@' => Some(Token::At),
            ',' => Some(Token::Comma),
            '|' => Some(Token::Pipe),
            '*' => Some(Token::Star),
            '=' => Some(Token::Eq),
            _ => None,
        };
        if let Some(tok) = single {
            chars.next();
            tokens.push((start, tok));
            continue;
        }

        match c {
            '/' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '/'))) {
                    chars.next();
                    tokens.push((start, Token::DoubleSlash));
                } else {
                    tokens.push((start, Token::Slash));
                }
            }
            '.' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '.'))) {
                    chars.next();
                    tokens.push((start, Token::DotDot));
                } else {
                    tokens.push((start, Token::Dot));
                }
            }
            ':' => {
                chars.next();
                match chars.next() {
                    Some((_, ':')) => tokens.push((start, Token::ColonColon)),
                    _ => return Err(err(start, "expected `::`")),
                }
            }
            '!' => {
                chars.next();
                match chars.next() {
                    Some((_, '=')) => tokens.push((start, Token::NotEq)),
                    _ => return Err(err(start, "expected `!=`")),
                }
            }
            '<' | '>' => {
                chars.next();
                let or_equal = matches!(chars.peek(), Some(&(_, '=')));
                if or_equal {
                    chars.next();
                }
                let tok = match (c, or_equal) {
                    ('<', false) => Token::Lt,
                    ('<', true) => Token::LtEq,
                    ('>', false) => Token::Gt,
                    _ => Token::GtEq,
                };
                tokens.push((start, tok));
            }
            '"' | '\'' => {
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == c {
                        closed = true;
                        break;
                    }
                    literal.push(ch);
                }
                if !closed {
                    return Err(err(start, "unterminated string literal"));
                }
                tokens.push((start, Token::Literal(literal)));
            }
            d if d.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' {
                        digits.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = digits
                    .parse::<f64>()
                    .map_err(|_| err(start, "malformed number"))?;
                tokens.push((start, Token::Number(value)));
            }
            n if n.is_alphabetic() || n == '_' => {
                let mut name = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '-' || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((start, Token::Name(name)));
            }
            other => return Err(err(start, &format!("unexpected character `{other}`"))),
        }
    }

    Ok(tokens)
}

// ── AST ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Path(LocationPath),
    Literal(String),
    Number(f64),
    Call(Function, Vec<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Union(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
struct LocationPath {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Self {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    SelfAxis,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "self" => Axis::SelfAxis,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Contains,
    StartsWith,
    EndsWith,
    Not,
    NormalizeSpace,
    String,
    StringLength,
    Count,
    Concat,
    Position,
    Last,
    True,
    False,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "contains" => Function::Contains,
            "starts-with" => Function::StartsWith,
            "ends-with" => Function::EndsWith,
            "not" => Function::Not,
            "normalize-space" => Function::NormalizeSpace,
            "string" => Function::String,
            "string-length" => Function::StringLength,
            "count" => Function::Count,
            "concat" => Function::Concat,
            "position" => Function::Position,
            "last" => Function::Last,
            "true" => Function::True,
            "false" => Function::False,
            _ => return None,
        })
    }

    /// Accepted argument counts, inclusive. `None` upper bound means variadic.
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::Contains | Function::StartsWith | Function::EndsWith => (2, Some(2)),
            Function::Not | Function::Count => (1, Some(1)),
            Function::NormalizeSpace | Function::String | Function::StringLength => (0, Some(1)),
            Function::Concat => (2, None),
            Function::Position | Function::Last | Function::True | Function::False => {
                (0, Some(0))
            }
        }
    }
}

// ── Parser ─────────────────────────────────────────────────────────────

struct Parser<'s> {
    expr: &'s str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn error(&self, message: impl Into<String>) -> XPathError {
        let offset = self
            .tokens
            .get(self.pos)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.expr.len());
        XPathError {
            expr: self.expr.to_string(),
            offset,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(_, t)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<(), XPathError> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}")))
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == keyword)
    }

    fn parse(mut self) -> Result<Expr, XPathError> {
        if self.tokens.is_empty() {
            return Err(self.error("empty expression"));
        }
        let expr = self.parse_or()?;
        if self.pos < self.tokens.len() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_and()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_equality()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::NotEq,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_union()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::LtEq) => BinOp::LtEq,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::GtEq) => BinOp::GtEq,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_union()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let first = self.parse_primary()?;
        if self.peek() != Some(&Token::Pipe) {
            return Ok(first);
        }
        let mut parts = vec![first];
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            parts.push(self.parse_primary()?);
        }
        Ok(Expr::Union(parts))
    }

    fn parse_primary(&mut self) -> Result<Expr, XPathError> {
        match self.peek().cloned() {
            Some(Token::Literal(s)) => {
                self.pos += 1;
                Ok(Expr::Literal(s))
            }
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name))
                if self.peek_at(1) == Some(&Token::LParen) && !is_node_type(&name) =>
            {
                self.parse_call(&name)
            }
            _ => self.parse_location_path().map(Expr::Path),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr, XPathError> {
        let func = Function::from_name(name)
            .ok_or_else(|| self.error(format!("unsupported function `{name}`")))?;
        self.pos += 2; // name and `(`

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        let (min, max) = func.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            return Err(self.error(format!(
                "`{name}` called with {} argument(s)",
                args.len()
            )));
        }
        Ok(Expr::Call(func, args))
    }

    fn parse_location_path(&mut self) -> Result<LocationPath, XPathError> {
        let mut steps = Vec::new();
        let absolute = match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if !self.can_start_step() {
                    return Ok(LocationPath {
                        absolute: true,
                        steps,
                    });
                }
                true
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(Step::descendant_or_self());
                true
            }
            _ => false,
        };

        steps.push(self.parse_step()?);
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(Step::descendant_or_self());
                }
                _ => break,
            }
            steps.push(self.parse_step()?);
        }

        Ok(LocationPath { absolute, steps })
    }

    fn can_start_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn parse_step(&mut self) -> Result<Step, XPathError> {
        match self.peek() {
            Some(Token::Dot) => {
                self.pos += 1;
                return Ok(Step {
                    axis: Axis::SelfAxis,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            Some(Token::DotDot) => {
                self.pos += 1;
                return Ok(Step {
                    axis: Axis::Parent,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            _ => {}
        }

        let axis = match (self.peek().cloned(), self.peek_at(1)) {
            (Some(Token::At), _) => {
                self.pos += 1;
                Axis::Attribute
            }
            (Some(Token::Name(name)), Some(Token::ColonColon)) => {
                let axis = Axis::from_name(&name)
                    .ok_or_else(|| self.error(format!("unsupported axis `{name}`")))?;
                self.pos += 2;
                axis
            }
            _ => Axis::Child,
        };

        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) if self.peek() == Some(&Token::LParen) => {
                let test = match name.as_str() {
                    "text" => NodeTest::Text,
                    "node" => NodeTest::Node,
                    _ => return Err(self.error(format!("unsupported node type `{name}()`"))),
                };
                self.pos += 1;
                self.expect(Token::RParen)?;
                test
            }
            Some(Token::Name(name)) => NodeTest::Name(name.to_ascii_lowercase()),
            Some(_) => {
                self.pos -= 1;
                return Err(self.error("expected a node test"));
            }
            None => return Err(self.error("expected a node test")),
        };

        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.pos += 1;
            predicates.push(self.parse_or()?);
            self.expect(Token::RBracket)?;
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "text" | "node")
}

// ── Evaluation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Item<'a> {
    /// The document node above `<html>`.
    Root,
    Element(ElementRef<'a>),
    Text {
        id: NodeId,
        parent: ElementRef<'a>,
        index: usize,
        text: &'a str,
    },
    Attr {
        owner: ElementRef<'a>,
        index: usize,
        name: &'a str,
        value: &'a str,
    },
}

#[derive(Debug, Clone)]
enum Value<'a> {
    Nodes(Vec<Item<'a>>),
    Str(String),
    Num(f64),
    Bool(bool),
}

#[derive(Clone, Copy)]
struct Context<'a> {
    item: Item<'a>,
    position: usize,
    size: usize,
}

struct Evaluator<'a> {
    html: &'a Html,
    /// Pre-order position of every node in the tree.
    order: HashMap<NodeId, usize>,
}

impl<'a> Evaluator<'a> {
    fn new(html: &'a Html) -> Self {
        let order = html
            .tree
            .root()
            .descendants()
            .enumerate()
            .map(|(position, node)| (node.id(), position))
            .collect();
        Self { html, order }
    }

    fn eval(&self, expr: &Expr, ctx: Context<'a>) -> Value<'a> {
        match expr {
            Expr::Path(path) => Value::Nodes(self.eval_path(path, ctx.item)),
            Expr::Literal(s) => Value::Str(s.clone()),
            Expr::Number(n) => Value::Num(*n),
            Expr::Union(parts) => {
                let mut items = Vec::new();
                for part in parts {
                    if let Value::Nodes(nodes) = self.eval(part, ctx) {
                        items.extend(nodes);
                    }
                }
                Value::Nodes(self.sort_dedup(items))
            }
            Expr::Binary(BinOp::Or, lhs, rhs) => Value::Bool(
                self.to_bool(&self.eval(lhs, ctx)) || self.to_bool(&self.eval(rhs, ctx)),
            ),
            Expr::Binary(BinOp::And, lhs, rhs) => Value::Bool(
                self.to_bool(&self.eval(lhs, ctx)) && self.to_bool(&self.eval(rhs, ctx)),
            ),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, ctx);
                let rhs = self.eval(rhs, ctx);
                Value::Bool(self.compare(*op, &lhs, &rhs))
            }
            Expr::Call(func, args) => self.call(*func, args, ctx),
        }
    }

    fn call(&self, func: Function, args: &[Expr], ctx: Context<'a>) -> Value<'a> {
        let arg_str = |i: usize| -> String {
            match args.get(i) {
                Some(arg) => self.to_string(&self.eval(arg, ctx)),
                None => self.string_value(ctx.item),
            }
        };

        match func {
            Function::Contains => Value::Bool(arg_str(0).contains(&arg_str(1))),
            Function::StartsWith => Value::Bool(arg_str(0).starts_with(&arg_str(1))),
            Function::EndsWith => Value::Bool(arg_str(0).ends_with(&arg_str(1))),
            Function::Not => Value::Bool(!self.to_bool(&self.eval(&args[0], ctx))),
            Function::NormalizeSpace => Value::Str(
                arg_str(0)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Function::String => Value::Str(arg_str(0)),
            Function::StringLength => Value::Num(arg_str(0).chars().count() as f64),
            Function::Count => match self.eval(&args[0], ctx) {
                Value::Nodes(nodes) => Value::Num(nodes.len() as f64),
                _ => Value::Num(0.0),
            },
            Function::Concat => Value::Str((0..args.len()).map(arg_str).collect()),
            Function::Position => Value::Num(ctx.position as f64),
            Function::Last => Value::Num(ctx.size as f64),
            Function::True => Value::Bool(true),
            Function::False => Value::Bool(false),
        }
    }

    fn eval_path(&self, path: &LocationPath, from: Item<'a>) -> Vec<Item<'a>> {
        let mut current = vec![if path.absolute { Item::Root } else { from }];
        for step in &path.steps {
            current = self.eval_step(&current, step);
            if current.is_empty() {
                break;
            }
        }
        current
    }

    fn eval_step(&self, context: &[Item<'a>], step: &Step) -> Vec<Item<'a>> {
        let mut out = Vec::new();
        for item in context {
            let mut candidates: Vec<Item<'a>> = self
                .axis(*item, step.axis)
                .into_iter()
                .filter(|c| matches_test(c, &step.test, step.axis))
                .collect();

            for predicate in &step.predicates {
                let size = candidates.len();
                let mut kept = Vec::with_capacity(size);
                for (i, candidate) in candidates.into_iter().enumerate() {
                    let ctx = Context {
                        item: candidate,
                        position: i + 1,
                        size,
                    };
                    let keep = match self.eval(predicate, ctx) {
                        Value::Num(n) => (i + 1) as f64 == n,
                        other => self.to_bool(&other),
                    };
                    if keep {
                        kept.push(candidate);
                    }
                }
                candidates = kept;
            }
            out.extend(candidates);
        }
        self.sort_dedup(out)
    }

    /// Axis members in axis order: document order for forward axes, nearest
    /// first for reverse axes.
    fn axis(&self, item: Item<'a>, axis: Axis) -> Vec<Item<'a>> {
        match axis {
            Axis::Child => self.children(item),
            Axis::Descendant => {
                let mut out = Vec::new();
                self.collect_descendants(item, &mut out);
                out
            }
            Axis::DescendantOrSelf => {
                let mut out = vec![item];
                self.collect_descendants(item, &mut out);
                out
            }
            Axis::Parent => self.parent(item).into_iter().collect(),
            Axis::Ancestor => self.ancestors(item),
            Axis::AncestorOrSelf => {
                let mut out = vec![item];
                out.extend(self.ancestors(item));
                out
            }
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                let Some(parent) = self.parent(item) else {
                    return Vec::new();
                };
                if matches!(item, Item::Attr { .. }) {
                    return Vec::new();
                }
                let siblings = self.children(parent);
                let Some(own) = siblings.iter().position(|s| same_item(s, &item)) else {
                    return Vec::new();
                };
                if axis == Axis::FollowingSibling {
                    siblings[own + 1..].to_vec()
                } else {
                    siblings[..own].iter().rev().copied().collect()
                }
            }
            Axis::SelfAxis => vec![item],
            Axis::Attribute => match item {
                Item::Element(el) => el
                    .value()
                    .attrs()
                    .enumerate()
                    .map(|(index, (name, value))| Item::Attr {
                        owner: el,
                        index,
                        name,
                        value,
                    })
                    .collect(),
                _ => Vec::new(),
            },
        }
    }

    fn children(&self, item: Item<'a>) -> Vec<Item<'a>> {
        match item {
            Item::Root => vec![Item::Element(self.html.root_element())],
            Item::Element(el) => el
                .children()
                .enumerate()
                .filter_map(|(index, child)| {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        Some(Item::Element(child_el))
                    } else {
                        child.value().as_text().map(|text| Item::Text {
                            id: child.id(),
                            parent: el,
                            index,
                            text: &**text,
                        })
                    }
                })
                .collect(),
            Item::Text { .. } | Item::Attr { .. } => Vec::new(),
        }
    }

    fn collect_descendants(&self, item: Item<'a>, out: &mut Vec<Item<'a>>) {
        for child in self.children(item) {
            out.push(child);
            self.collect_descendants(child, out);
        }
    }

    fn parent(&self, item: Item<'a>) -> Option<Item<'a>> {
        match item {
            Item::Root => None,
            Item::Element(el) => Some(
                el.parent()
                    .and_then(ElementRef::wrap)
                    .map(Item::Element)
                    .unwrap_or(Item::Root),
            ),
            Item::Text { parent, .. } => Some(Item::Element(parent)),
            Item::Attr { owner, .. } => Some(Item::Element(owner)),
        }
    }

    fn ancestors(&self, item: Item<'a>) -> Vec<Item<'a>> {
        let mut out = Vec::new();
        let mut current = self.parent(item);
        while let Some(ancestor) = current {
            out.push(ancestor);
            current = self.parent(ancestor);
        }
        out
    }

    /// Sort key reflecting document order. Attributes sort after their
    /// element and before its children.
    fn order_key(&self, item: &Item<'_>) -> (usize, usize) {
        let position = |id: NodeId| self.order.get(&id).copied().unwrap_or(usize::MAX);
        match item {
            Item::Root => (0, 0),
            Item::Element(el) => (position(el.id()), 0),
            Item::Text { id, .. } => (position(*id), 0),
            Item::Attr { owner, index, .. } => (position(owner.id()), index + 1),
        }
    }

    fn sort_dedup(&self, items: Vec<Item<'a>>) -> Vec<Item<'a>> {
        let mut keyed: Vec<((usize, usize), Item<'a>)> =
            items.into_iter().map(|i| (self.order_key(&i), i)).collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.0 == b.0);
        keyed.into_iter().map(|(_, i)| i).collect()
    }

    fn string_value(&self, item: Item<'a>) -> String {
        match item {
            Item::Root => self.html.root_element().text().collect(),
            Item::Element(el) => el.text().collect(),
            Item::Text { text, .. } => text.to_string(),
            Item::Attr { value, .. } => value.to_string(),
        }
    }

    fn to_string(&self, value: &Value<'a>) -> String {
        match value {
            Value::Nodes(nodes) => nodes
                .first()
                .map(|n| self.string_value(*n))
                .unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn to_bool(&self, value: &Value<'a>) -> bool {
        match value {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn to_number(&self, value: &Value<'a>) -> f64 {
        match value {
            Value::Num(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => parse_number(&self.to_string(other)),
        }
    }

    fn compare(&self, op: BinOp, lhs: &Value<'a>, rhs: &Value<'a>) -> bool {
        match (lhs, rhs) {
            (Value::Nodes(l), Value::Nodes(r)) => l.iter().any(|a| {
                let a = Value::Str(self.string_value(*a));
                r.iter()
                    .any(|b| self.compare_atomic(op, &a, &Value::Str(self.string_value(*b))))
            }),
            (Value::Nodes(l), Value::Bool(_)) => {
                self.compare_atomic(op, &Value::Bool(!l.is_empty()), rhs)
            }
            (Value::Bool(_), Value::Nodes(r)) => {
                self.compare_atomic(op, lhs, &Value::Bool(!r.is_empty()))
            }
            (Value::Nodes(l), _) => l
                .iter()
                .any(|a| self.compare_atomic(op, &Value::Str(self.string_value(*a)), rhs)),
            (_, Value::Nodes(r)) => r
                .iter()
                .any(|b| self.compare_atomic(op, lhs, &Value::Str(self.string_value(*b)))),
            _ => self.compare_atomic(op, lhs, rhs),
        }
    }

    fn compare_atomic(&self, op: BinOp, lhs: &Value<'a>, rhs: &Value<'a>) -> bool {
        match op {
            BinOp::Eq | BinOp::NotEq => {
                let equal = match (lhs, rhs) {
                    (Value::Bool(_), _) | (_, Value::Bool(_)) => {
                        self.to_bool(lhs) == self.to_bool(rhs)
                    }
                    (Value::Num(_), _) | (_, Value::Num(_)) => {
                        self.to_number(lhs) == self.to_number(rhs)
                    }
                    _ => self.to_string(lhs) == self.to_string(rhs),
                };
                if op == BinOp::Eq { equal } else { !equal }
            }
            BinOp::Lt => self.to_number(lhs) < self.to_number(rhs),
            BinOp::LtEq => self.to_number(lhs) <= self.to_number(rhs),
            BinOp::Gt => self.to_number(lhs) > self.to_number(rhs),
            BinOp::GtEq => self.to_number(lhs) >= self.to_number(rhs),
            BinOp::And | BinOp::Or => unreachable!("logical operators are evaluated lazily"),
        }
    }
}

fn matches_test(item: &Item<'_>, test: &NodeTest, axis: Axis) -> bool {
    match test {
        NodeTest::Node => true,
        NodeTest::Text => matches!(item, Item::Text { .. }),
        NodeTest::Any => match item {
            Item::Attr { .. } => axis == Axis::Attribute,
            Item::Element(_) => axis != Axis::Attribute,
            _ => false,
        },
        NodeTest::Name(name) => match item {
            Item::Attr { name: attr, .. } => {
                axis == Axis::Attribute && attr.eq_ignore_ascii_case(name)
            }
            Item::Element(el) => {
                axis != Axis::Attribute && el.value().name().eq_ignore_ascii_case(name)
            }
            _ => false,
        },
    }
}

fn same_item(a: &Item<'_>, b: &Item<'_>) -> bool {
    match (a, b) {
        (Item::Root, Item::Root) => true,
        (Item::Element(x), Item::Element(y)) => x.id() == y.id(),
        (
            Item::Text {
                parent: p1,
                index: i1,
                ..
            },
            Item::Text {
                parent: p2,
                index: i2,
                ..
            },
        ) => p1.id() == p2.id() && i1 == i2,
        _ => false,
    }
}

fn parse_number(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// ── Public API ─────────────────────────────────────────────────────────

/// A compiled expression, reusable across documents.
#[derive(Debug, Clone)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    pub fn compile(source: &str) -> Result<Self, XPathError> {
        let tokens = tokenize(source)?;
        let expr = Parser {
            expr: source,
            tokens,
            pos: 0,
        }
        .parse()?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// String values of every match, in document order.
    ///
    /// Elements yield their concatenated descendant text, attributes their
    /// value, text nodes their text. Scalar results yield a single string.
    pub fn select(&self, html: &Html) -> Vec<String> {
        let eval = Evaluator::new(html);
        let ctx = Context {
            item: Item::Root,
            position: 1,
            size: 1,
        };
        match eval.eval(&self.expr, ctx) {
            Value::Nodes(nodes) => nodes.into_iter().map(|n| eval.string_value(n)).collect(),
            scalar => vec![eval.to_string(&scalar)],
        }
    }

    pub fn select_first(&self, html: &Html) -> Option<String> {
        self.select(html).into_iter().next()
    }
}

impl std::str::FromStr for XPath {
    type Err = XPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head><title>Catalog</title></head><body>
          <div id="waterfall">
            <div class="item"><a href="//example.test/cn/movie/aaa">First</a></div>
            <div class="item"><a href="//example.test/cn/star/bbb">Star</a></div>
            <div class="item"><a href="//example.test/cn/movie/ccc">Second</a></div>
          </div>
          <div class="info">
            <p><span class="header">Code:</span> <span>ABC-123</span></p>
            <p><span class="header">Released:</span> 2021-03-04</p>
            <p class="header">Studio: </p>
            <p><a href="/studio/1">Big Studio</a></p>
            <p><span class="genre"><a href="/genre/1">Drama</a></span><span class="genre"><a href="/genre/2">Comedy</a></span><span class="genre"><a href="/tag/3">Other</a></span></p>
          </div>
          <h3>  Sample Title </h3>
        </body></html>
    "#;

    fn select(expr: &str) -> Vec<String> {
        let html = Html::parse_document(PAGE);
        XPath::compile(expr).unwrap().select(&html)
    }

    #[test]
    fn descendant_attribute_values_in_document_order() {
        assert_eq!(
            select(r#"//*[@id="waterfall"]/div/a/@href"#),
            vec![
                "//example.test/cn/movie/aaa",
                "//example.test/cn/star/bbb",
                "//example.test/cn/movie/ccc",
            ]
        );
    }

    #[test]
    fn absolute_path_with_positional_predicate() {
        assert_eq!(select("/html/body/div[2]/p[1]/span[2]/text()"), vec!["ABC-123"]);
    }

    #[test]
    fn parent_step_after_text_predicate() {
        assert_eq!(
            select(r#"//span[contains(text(),"Code:")]/../span[2]/text()"#),
            vec!["ABC-123"]
        );
    }

    #[test]
    fn text_nodes_of_parent_exclude_child_elements() {
        let values = select(r#"//span[contains(text(),"Released:")]/../text()"#);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].trim(), "2021-03-04");
    }

    #[test]
    fn following_sibling_axis() {
        assert_eq!(
            select(r#"//p[contains(text(),"Studio: ")]/following-sibling::p[1]/a/text()"#),
            vec!["Big Studio"]
        );
    }

    #[test]
    fn nested_predicate_and_contains_on_attribute() {
        assert_eq!(
            select(r#"//p[span[@class="genre"]]/span/a[contains(@href, "genre")]"#),
            vec!["Drama", "Comedy"]
        );
    }

    #[test]
    fn element_string_value_is_descendant_text() {
        assert_eq!(select("//h3"), vec!["  Sample Title "]);
    }

    #[test]
    fn last_and_position_functions() {
        assert_eq!(select(r#"//div[@class="item"][last()]/a/text()"#), vec!["Second"]);
        assert_eq!(
            select(r#"//div[@class="item"][position() < 3]/a/text()"#),
            vec!["First", "Star"]
        );
    }

    #[test]
    fn boolean_operators_and_not() {
        assert_eq!(
            select(r#"//a[contains(@href, "movie") and not(contains(text(), "Second"))]/text()"#),
            vec!["First"]
        );
        assert_eq!(
            select(r#"//a[text()="First" or text()="Star"]/text()"#),
            vec!["First", "Star"]
        );
    }

    #[test]
    fn union_results_are_in_document_order() {
        assert_eq!(select("//h3/text() | //title/text()").len(), 2);
        assert_eq!(select("//h3/text() | //title/text()")[0], "Catalog");
    }

    #[test]
    fn mixed_content_keeps_text_between_elements() {
        let html = Html::parse_document("<p>one<b>two</b>three<i>four</i></p>");
        let nodes = XPath::compile("//p/node()").unwrap().select(&html);
        assert_eq!(nodes, vec!["one", "two", "three", "four"]);
        let union = XPath::compile("//p/@* | //p/b | //p").unwrap().select(&html);
        assert_eq!(union, vec!["onetwothreefour", "two"]);
    }

    #[test]
    fn wide_sibling_lists_stay_ordered_and_unique() {
        let items: String = (0..5000).map(|i| format!("<li>{i}</li>")).collect();
        let html = Html::parse_document(&format!("<ul>{items}</ul>"));
        let found = XPath::compile("//li | //li[last()] | //ul/li[1]")
            .unwrap()
            .select(&html);
        assert_eq!(found.len(), 5000);
        assert_eq!(found[0], "0");
        assert_eq!(found[4999], "4999");
    }

    #[test]
    fn scalar_functions_at_top_level() {
        assert_eq!(select("normalize-space(//h3)"), vec!["Sample Title"]);
        assert_eq!(select(r#"count(//div[@class="item"])"#), vec!["3"]);
    }

    #[test]
    fn no_match_is_empty() {
        assert!(select("//table/tr/td").is_empty());
        assert!(select(r#"//*[@id="missing"]/text()"#).is_empty());
    }

    #[test]
    fn ancestor_axis_nearest_first() {
        assert_eq!(
            select(r#"//a[text()="Drama"]/ancestor::*[2]/@class"#),
            Vec::<String>::new()
        );
        assert_eq!(
            select(r#"//a[text()="Drama"]/ancestor::div[1]/@class"#),
            vec!["info"]
        );
    }

    #[test]
    fn compile_errors_report_offset() {
        let err = XPath::compile("//div[").unwrap_err();
        assert_eq!(err.offset, 6);

        let err = XPath::compile(r#"//a[@href="x]"#).unwrap_err();
        assert!(err.message.contains("unterminated"));

        let err = XPath::compile("//a[frobnicate(.)]").unwrap_err();
        assert!(err.message.contains("frobnicate"));

        assert!(XPath::compile("").is_err());
    }
}
