use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Numeric constants: hex integers, decimal integers, floats with optional exponent
    static ref NUMBER_PATTERN: Regex =
        Regex::new(r"^[+-]?(0[xX][0-9a-fA-F]+|(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?)").unwrap();
}

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";
const TRIM_MARKER: char = '-';

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Text(String),
    LeftDelim,
    RightDelim,
    /// Function name or keyword
    Identifier(String),
    /// `.A.B` as its segments
    Field(Vec<String>),
    Dot,
    /// `$name`, with `$` itself as the empty name
    Variable(String),
    String(String),
    Number(String),
    Char(char),
    Bool(bool),
    Nil,
    Pipe,
    LeftParen,
    RightParen,
    Comma,
    Declare,
    Assign,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub pos: usize,
    /// Byte offset just past the last character
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub pos: usize,
}

impl LexError {
    fn new(message: impl Into<String>, pos: usize) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

/// Split template source into text and action tokens
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    tokens: Vec<Token>,
    trim_next_text: bool,
    paren_depth: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            tokens: Vec::new(),
            trim_next_text: false,
            paren_depth: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        loop {
            let rest = &self.src[self.pos..];
            let Some(offset) = rest.find(LEFT_DELIM) else {
                self.emit_text(self.pos, self.src.len(), false);
                self.push(TokenKind::Eof, self.src.len(), self.src.len());
                return Ok(self.tokens);
            };

            let start = self.pos + offset;
            let after = start + LEFT_DELIM.len();
            let trim_left = has_left_trim(&self.src[after..]);
            self.emit_text(self.pos, start, trim_left);

            self.pos = if trim_left { after + 2 } else { after };
            if self.src[self.pos..].starts_with(LEFT_COMMENT) {
                self.lex_comment(start)?;
                continue;
            }

            self.push(TokenKind::LeftDelim, start, after);
            self.lex_action()?;
        }
    }

    fn push(&mut self, kind: TokenKind, pos: usize, end: usize) {
        self.tokens.push(Token { kind, pos, end });
    }

    fn emit_text(&mut self, start: usize, end: usize, trim_right: bool) {
        let mut text = &self.src[start..end];
        let mut pos = start;
        if self.trim_next_text {
            let trimmed = text.trim_start();
            pos += text.len() - trimmed.len();
            text = trimmed;
            self.trim_next_text = false;
        }
        if trim_right {
            text = text.trim_end();
        }
        if !text.is_empty() {
            self.push(TokenKind::Text(text.to_string()), pos, pos + text.len());
        }
    }

    /// `{{/* ... */}}`, producing no tokens
    fn lex_comment(&mut self, delim_start: usize) -> Result<(), LexError> {
        let body = self.pos + LEFT_COMMENT.len();
        let close = self.src[body..]
            .find(RIGHT_COMMENT)
            .ok_or_else(|| LexError::new("unclosed comment", delim_start))?;
        self.pos = body + close + RIGHT_COMMENT.len();

        let rest = &self.src[self.pos..];
        if let Some(len) = right_trim_len(rest) {
            self.pos += len;
            self.trim_next_text = true;
        } else if rest.starts_with(RIGHT_DELIM) {
            self.pos += RIGHT_DELIM.len();
        } else {
            return Err(LexError::new("comment ends before closing delimiter", self.pos));
        }
        Ok(())
    }

    fn lex_action(&mut self) -> Result<(), LexError> {
        loop {
            let rest = &self.src[self.pos..];
            if let Some(len) = right_trim_len(rest) {
                return self.close_action(len, true);
            }
            if rest.starts_with(RIGHT_DELIM) {
                return self.close_action(RIGHT_DELIM.len(), false);
            }

            let Some(c) = rest.chars().next() else {
                return Err(LexError::new("unclosed action", self.pos));
            };
            let start = self.pos;

            match c {
                c if c.is_whitespace() => self.pos += c.len_utf8(),
                '|' => self.single(TokenKind::Pipe),
                ',' => self.single(TokenKind::Comma),
                '(' => {
                    self.paren_depth += 1;
                    self.single(TokenKind::LeftParen);
                }
                ')' => {
                    if self.paren_depth == 0 {
                        return Err(LexError::new("unexpected right paren", start));
                    }
                    self.paren_depth -= 1;
                    self.single(TokenKind::RightParen);
                    self.lex_trailing_fields();
                }
                ':' => {
                    if !rest.starts_with(":=") {
                        return Err(LexError::new("expected :=", start));
                    }
                    self.pos += 2;
                    self.push(TokenKind::Declare, start, self.pos);
                }
                '=' => self.single(TokenKind::Assign),
                '"' => self.lex_quote()?,
                '`' => self.lex_raw_quote()?,
                '\'' => self.lex_char()?,
                '$' => {
                    self.pos += 1;
                    let name = self.take_identifier();
                    self.push(TokenKind::Variable(name), start, self.pos);
                    self.lex_trailing_fields();
                }
                '.' if rest[1..].starts_with(|c: char| c.is_ascii_digit()) => self.lex_number()?,
                '.' => {
                    if rest[1..].starts_with(is_identifier_start) {
                        self.lex_trailing_fields();
                    } else {
                        self.single(TokenKind::Dot);
                    }
                }
                '+' | '-' | '0'..='9' => self.lex_number()?,
                c if is_identifier_start(c) => {
                    let word = self.take_identifier();
                    let kind = match word.as_str() {
                        "true" => TokenKind::Bool(true),
                        "false" => TokenKind::Bool(false),
                        "nil" => TokenKind::Nil,
                        _ => TokenKind::Identifier(word),
                    };
                    self.push(kind, start, self.pos);
                }
                other => {
                    return Err(LexError::new(
                        format!("unrecognized character in action: {:?}", other),
                        start,
                    ))
                }
            }
        }
    }

    fn close_action(&mut self, len: usize, trim: bool) -> Result<(), LexError> {
        if self.paren_depth > 0 {
            return Err(LexError::new("unclosed left paren", self.pos));
        }
        let start = self.pos;
        self.pos += len;
        self.push(TokenKind::RightDelim, start, self.pos);
        self.trim_next_text = trim;
        Ok(())
    }

    fn single(&mut self, kind: TokenKind) {
        let start = self.pos;
        self.pos += 1;
        self.push(kind, start, self.pos);
    }

    fn take_identifier(&mut self) -> String {
        let rest = &self.src[self.pos..];
        let len = rest
            .find(|c: char| !is_identifier_char(c))
            .unwrap_or(rest.len());
        self.pos += len;
        rest[..len].to_string()
    }

    /// `.A.B` directly attached to the previous operand
    fn lex_trailing_fields(&mut self) {
        let start = self.pos;
        let mut segments = Vec::new();
        while self.src[self.pos..].starts_with('.')
            && self.src[self.pos + 1..].starts_with(is_identifier_start)
        {
            self.pos += 1;
            segments.push(self.take_identifier());
        }
        if !segments.is_empty() {
            self.push(TokenKind::Field(segments), start, self.pos);
        }
    }

    fn lex_number(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let rest = &self.src[start..];
        let len = NUMBER_PATTERN
            .find(rest)
            .map(|m| m.end())
            .filter(|&len| len > 0 && rest[..len].chars().any(|c| c.is_ascii_digit()))
            .ok_or_else(|| LexError::new("bad number syntax", start))?;

        if rest[len..].starts_with(is_identifier_char) {
            return Err(LexError::new(
                format!("bad number syntax: {:?}", &rest[..len]),
                start,
            ));
        }
        self.pos += len;
        self.push(TokenKind::Number(rest[..len].to_string()), start, self.pos);
        Ok(())
    }

    fn lex_quote(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let mut value = String::new();
        let mut chars = self.src[start + 1..].char_indices();

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos = start + 1 + i + 1;
                    self.push(TokenKind::String(value), start, self.pos);
                    return Ok(());
                }
                '\\' => {
                    let (_, escape) = chars
                        .next()
                        .ok_or_else(|| LexError::new("unterminated quoted string", start))?;
                    value.push(decode_escape(escape, &mut chars, start)?);
                }
                '\n' => return Err(LexError::new("unterminated quoted string", start)),
                c => value.push(c),
            }
        }
        Err(LexError::new("unterminated quoted string", start))
    }

    fn lex_raw_quote(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let body = start + 1;
        let close = self.src[body..]
            .find('`')
            .ok_or_else(|| LexError::new("unterminated raw quoted string", start))?;
        self.pos = body + close + 1;
        let value = self.src[body..body + close].to_string();
        self.push(TokenKind::String(value), start, self.pos);
        Ok(())
    }

    fn lex_char(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let mut chars = self.src[start + 1..].char_indices();
        let value = match chars.next() {
            Some((_, '\\')) => {
                let (_, escape) = chars
                    .next()
                    .ok_or_else(|| LexError::new("unterminated character constant", start))?;
                decode_escape(escape, &mut chars, start)?
            }
            Some((_, '\'')) | Some((_, '\n')) | None => {
                return Err(LexError::new("malformed character constant", start))
            }
            Some((_, c)) => c,
        };
        match chars.next() {
            Some((i, '\'')) => {
                self.pos = start + 1 + i + 1;
                self.push(TokenKind::Char(value), start, self.pos);
                Ok(())
            }
            _ => Err(LexError::new("unterminated character constant", start)),
        }
    }
}

fn has_left_trim(after_delim: &str) -> bool {
    let mut chars = after_delim.chars();
    chars.next() == Some(TRIM_MARKER) && chars.next().is_some_and(|c| c.is_ascii_whitespace())
}

/// Length of a ` -}}` close at the start of `rest`, whitespace included
fn right_trim_len(rest: &str) -> Option<usize> {
    let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let spaces = rest.len() - trimmed.len();
    if spaces > 0 && trimmed.starts_with(TRIM_MARKER) && trimmed[1..].starts_with(RIGHT_DELIM) {
        Some(spaces + 1 + RIGHT_DELIM.len())
    } else {
        None
    }
}

fn decode_escape(
    escape: char,
    chars: &mut std::str::CharIndices<'_>,
    start: usize,
) -> Result<char, LexError> {
    let hex = |chars: &mut std::str::CharIndices<'_>, digits: usize| {
        let code: String = chars.by_ref().take(digits).map(|(_, c)| c).collect();
        u32::from_str_radix(&code, 16)
            .ok()
            .filter(|_| code.len() == digits)
            .and_then(char::from_u32)
            .ok_or_else(|| LexError::new("invalid escape sequence", start))
    };

    Ok(match escape {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'a' => '\u{07}',
        'b' => '\u{08}',
        'f' => '\u{0c}',
        'v' => '\u{0b}',
        '0' => '\0',
        '\\' => '\\',
        '"' => '"',
        '\'' => '\'',
        'x' => hex(chars, 2)?,
        'u' => hex(chars, 4)?,
        'U' => hex(chars, 8)?,
        other => {
            return Err(LexError::new(
                format!("unknown escape sequence: \\{}", other),
                start,
            ))
        }
    })
}

fn is_identifier_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_identifier_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_text_only() {
        assert_eq!(
            kinds("plain text"),
            vec![TokenKind::Text("plain text".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_field_action() {
        assert_eq!(
            kinds("Hello {{.Name}}!"),
            vec![
                TokenKind::Text("Hello ".to_string()),
                TokenKind::LeftDelim,
                TokenKind::Field(vec!["Name".to_string()]),
                TokenKind::RightDelim,
                TokenKind::Text("!".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_field_chain_and_dot() {
        assert_eq!(
            kinds("{{.a.b.c}}{{.}}"),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Field(vec!["a".to_string(), "b".to_string(), "c".to_string()]),
                TokenKind::RightDelim,
                TokenKind::LeftDelim,
                TokenKind::Dot,
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_range_declaration() {
        assert_eq!(
            kinds("{{range $i, $v := .Items}}"),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Identifier("range".to_string()),
                TokenKind::Variable("i".to_string()),
                TokenKind::Comma,
                TokenKind::Variable("v".to_string()),
                TokenKind::Declare,
                TokenKind::Field(vec!["Items".to_string()]),
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_variable_with_fields() {
        assert_eq!(
            kinds("{{$.User.Name}}"),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Variable(String::new()),
                TokenKind::Field(vec!["User".to_string(), "Name".to_string()]),
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds(r#"{{printf "%d\n" -3 1.5e2 0x1F 'a' `raw\n` true nil}}"#),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Identifier("printf".to_string()),
                TokenKind::String("%d\n".to_string()),
                TokenKind::Number("-3".to_string()),
                TokenKind::Number("1.5e2".to_string()),
                TokenKind::Number("0x1F".to_string()),
                TokenKind::Char('a'),
                TokenKind::String(r"raw\n".to_string()),
                TokenKind::Bool(true),
                TokenKind::Nil,
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(
            kinds("a  {{- .X -}}  b"),
            vec![
                TokenKind::Text("a".to_string()),
                TokenKind::LeftDelim,
                TokenKind::Field(vec!["X".to_string()]),
                TokenKind::RightDelim,
                TokenKind::Text("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comment_is_dropped() {
        assert_eq!(
            kinds("a {{/* note */}} b {{- /* trimmed */ -}} c"),
            vec![
                TokenKind::Text("a ".to_string()),
                TokenKind::Text(" b".to_string()),
                TokenKind::Text("c".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_paren_chain() {
        assert_eq!(
            kinds("{{(index .M \"k\").Name}}"),
            vec![
                TokenKind::LeftDelim,
                TokenKind::LeftParen,
                TokenKind::Identifier("index".to_string()),
                TokenKind::Field(vec!["M".to_string()]),
                TokenKind::String("k".to_string()),
                TokenKind::RightParen,
                TokenKind::Field(vec!["Name".to_string()]),
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unclosed_action() {
        let err = Lexer::new("Hello {{.Name").tokenize().unwrap_err();
        assert_eq!(err.message, "unclosed action");
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("{{\"abc}}").tokenize().unwrap_err();
        assert_eq!(err.message, "unterminated quoted string");
        assert_eq!(err.pos, 2);
    }

    #[test]
    fn test_bad_character() {
        let err = Lexer::new("{{ # }}").tokenize().unwrap_err();
        assert!(err.message.contains("unrecognized character"));
    }
}
