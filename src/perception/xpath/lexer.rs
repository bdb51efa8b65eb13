use crate::errors::{DroidLensError, DroidLensResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Dot,
    DotDot,
    ColonColon,
    Pipe,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    /// `*` as a name test.
    Star,
    /// `*` as multiplication.
    Multiply,
    And,
    Or,
    Div,
    Mod,
    Literal(String),
    Number(f64),
    Name(String),
}

impl Token {
    /// Whether a `*` or operator name after this token is an operator.
    ///
    /// Follows the XPath 1.0 lexical rule: anything except `@ :: ( [ ,` and
    /// operators ends an operand.
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::RBracket
                | Token::RParen
                | Token::Dot
                | Token::DotDot
                | Token::Star
                | Token::Literal(_)
                | Token::Number(_)
                | Token::Name(_)
        )
    }
}

pub(crate) fn tokenize(input: &str) -> DroidLensResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let after_operand = tokens.last().is_some_and(Token::ends_operand);
        let next = chars.get(i + 1).copied();

        let token = match c {
            '/' if next == Some('/') => {
                i += 2;
                Token::DoubleSlash
            }
            '/' => {
                i += 1;
                Token::Slash
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '@' => {
                i += 1;
                Token::At
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '|' => {
                i += 1;
                Token::Pipe
            }
            '+' => {
                i += 1;
                Token::Plus
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '=' => {
                i += 1;
                Token::Eq
            }
            '!' if next == Some('=') => {
                i += 2;
                Token::Neq
            }
            '<' if next == Some('=') => {
                i += 2;
                Token::Le
            }
            '<' => {
                i += 1;
                Token::Lt
            }
            '>' if next == Some('=') => {
                i += 2;
                Token::Ge
            }
            '>' => {
                i += 1;
                Token::Gt
            }
            ':' if next == Some(':') => {
                i += 2;
                Token::ColonColon
            }
            '*' => {
                i += 1;
                if after_operand {
                    Token::Multiply
                } else {
                    Token::Star
                }
            }
            '.' if next == Some('.') => {
                i += 2;
                Token::DotDot
            }
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => {
                let (value, len) = scan_number(&chars[i..]);
                i += len;
                Token::Number(value)
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '"' | '\'' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| {
                        DroidLensError::QuerySyntax(format!(
                            "unterminated string literal at offset {i} in {input:?}"
                        ))
                    })?;
                let literal: String = chars[i + 1..i + 1 + close].iter().collect();
                i += close + 2;
                Token::Literal(literal)
            }
            '$' => {
                return Err(DroidLensError::QuerySyntax(format!(
                    "variables are not supported: {input:?}"
                )));
            }
            c if c.is_ascii_digit() => {
                let (value, len) = scan_number(&chars[i..]);
                i += len;
                Token::Number(value)
            }
            c if is_name_start(c) => {
                let start = i;
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    if is_name_char(ch) {
                        i += 1;
                    } else if ch == ':' && chars.get(i + 1) != Some(&':') && chars.get(i + 1).is_some_and(|n| is_name_start(*n)) {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let name: String = chars[start..i].iter().collect();
                match (after_operand, name.as_str()) {
                    (true, "and") => Token::And,
                    (true, "or") => Token::Or,
                    (true, "div") => Token::Div,
                    (true, "mod") => Token::Mod,
                    _ => Token::Name(name),
                }
            }
            other => {
                return Err(DroidLensError::QuerySyntax(format!(
                    "unexpected character {other:?} at offset {i} in {input:?}"
                )));
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn scan_number(chars: &[char]) -> (f64, usize) {
    let mut len = 0;
    let mut seen_dot = false;
    while len < chars.len() {
        let ch = chars[len];
        if ch.is_ascii_digit() {
            len += 1;
        } else if ch == '.' && !seen_dot && chars.get(len + 1) != Some(&'.') {
            seen_dot = true;
            len += 1;
        } else {
            break;
        }
    }
    let text: String = chars[..len].iter().collect();
    (text.parse().unwrap_or(f64::NAN), len)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}
