//! Tokenizer for definition scripts.
//!
//! Newlines end statements, except inside parentheses where they are
//! ignored so argument lists can span lines.

use super::parser::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Fn,
    Class,
    Raise,
    Set,
    True,
    False,
    Null,
    SelfKw,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Equals,
    Plus,
    Dot,
    Newline,
}

impl TokenKind {
    /// How the token reads in error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::Int(i) => format!("integer {i}"),
            TokenKind::Float(x) => format!("float {x}"),
            TokenKind::Str(_) => "string".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Fn => "fn",
            TokenKind::Class => "class",
            TokenKind::Raise => "raise",
            TokenKind::Set => "set",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::SelfKw => "self",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Equals => "=",
            TokenKind::Plus => "+",
            TokenKind::Dot => ".",
            TokenKind::Ident(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::Newline => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;
    let mut depth = 0usize;

    while let Some(&c) = chars.peek() {
        let kind = match c {
            '\n' => {
                chars.next();
                line += 1;
                if depth == 0 {
                    tokens.push(Token {
                        kind: TokenKind::Newline,
                        line: line - 1,
                    });
                }
                continue;
            }
            ';' => {
                chars.next();
                TokenKind::Newline
            }
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '#' => {
                while chars.peek().is_some_and(|&c| c != '\n') {
                    chars.next();
                }
                continue;
            }
            '"' => {
                chars.next();
                TokenKind::Str(read_string(&mut chars, line)?)
            }
            c if c.is_ascii_digit() => read_number(&mut chars, line)?,
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                keyword(word)
            }
            _ => {
                chars.next();
                match c {
                    '(' => {
                        depth += 1;
                        TokenKind::LParen
                    }
                    ')' => {
                        depth = depth.saturating_sub(1);
                        TokenKind::RParen
                    }
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    ',' => TokenKind::Comma,
                    ':' => TokenKind::Colon,
                    '=' => TokenKind::Equals,
                    '+' => TokenKind::Plus,
                    '.' => TokenKind::Dot,
                    other => {
                        return Err(ParseError::new(format!("unexpected character '{other}'"), line));
                    }
                }
            }
        };
        tokens.push(Token { kind, line });
    }

    Ok(tokens)
}

fn keyword(word: String) -> TokenKind {
    match word.as_str() {
        "fn" => TokenKind::Fn,
        "class" => TokenKind::Class,
        "raise" => TokenKind::Raise,
        "set" => TokenKind::Set,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "self" => TokenKind::SelfKw,
        _ => TokenKind::Ident(word),
    }
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: usize,
) -> Result<String, ParseError> {
    let mut text = String::new();
    loop {
        match chars.next() {
            Some('"') => return Ok(text),
            Some('\\') => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('"') => text.push('"'),
                Some('\\') => text.push('\\'),
                Some(other) => {
                    return Err(ParseError::new(format!("unknown escape '\\{other}'"), line));
                }
                None => break,
            },
            Some('\n') | None => break,
            Some(c) => text.push(c),
        }
    }
    Err(ParseError::new("unterminated string", line))
}

fn read_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: usize,
) -> Result<TokenKind, ParseError> {
    let mut digits = String::new();
    let mut is_float = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '_' {
            digits.push(c);
        } else if c == '.' && !is_float {
            is_float = true;
            digits.push(c);
        } else {
            break;
        }
        chars.next();
    }

    let digits = digits.replace('_', "");
    if is_float {
        digits
            .parse()
            .map(TokenKind::Float)
            .map_err(|_| ParseError::new(format!("invalid number '{digits}'"), line))
    } else {
        digits
            .parse()
            .map(TokenKind::Int)
            .map_err(|_| ParseError::new(format!("integer '{digits}' is out of range"), line))
    }
}
