use crate::error::{Location, TplError};
use serde_json::Number;
use std::fmt;

use super::funcs::{Builtin, FuncRegistry};
use super::lexer::{Lexer, Token, TokenKind};

/// A parsed template: its name, source and top-level node list
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub text: String,
    pub root: Vec<Node>,
}

impl Template {
    /// Parse `text` as the template `name`, resolving function names against `funcs`
    pub fn parse(name: &str, text: &str, funcs: &FuncRegistry) -> Result<Self, TplError> {
        let tokens = Lexer::new(text).tokenize().map_err(|e| TplError::TemplateCompile {
            message: e.message,
            location: Location::from_offset(text, e.pos, name),
        })?;

        let root = Parser::new(tokens, funcs)
            .parse_root()
            .map_err(|e| TplError::TemplateCompile {
                message: e.message,
                location: Location::from_offset(text, e.pos, name),
            })?;

        Ok(Self {
            name: name.to_string(),
            text: text.to_string(),
            root,
        })
    }

    pub fn location(&self, pos: usize) -> Location {
        Location::from_offset(&self.text, pos, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    /// `{{pipeline}}`
    Action(Pipeline),
    If(Branch),
    Range(Branch),
    With(Branch),
    /// `{{template "name" pipeline}}`
    Template {
        name: String,
        pipe: Option<Pipeline>,
        pos: usize,
    },
    Break(usize),
    Continue(usize),
}

/// Shared shape of `if`, `range` and `with`
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub pipe: Pipeline,
    pub list: Vec<Node>,
    pub else_list: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub pos: usize,
    /// Declared or assigned variable names, without `$`
    pub decl: Vec<String>,
    pub is_assign: bool,
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub pos: usize,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Dot,
    Nil,
    Bool(bool),
    Number(Number),
    String(String),
    /// `.A.B`, evaluated against dot
    Field(Vec<String>),
    /// `$x.A.B`
    Variable { name: String, fields: Vec<String> },
    /// `(pipeline).A.B`
    Chain { pipe: Box<Pipeline>, fields: Vec<String> },
    /// A function name
    Identifier(String),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Dot => write!(f, "."),
            Arg::Nil => write!(f, "nil"),
            Arg::Bool(b) => write!(f, "{}", b),
            Arg::Number(n) => write!(f, "{}", n),
            Arg::String(s) => write!(f, "{:?}", s),
            Arg::Field(fields) => write!(f, ".{}", fields.join(".")),
            Arg::Variable { name, fields } => {
                write!(f, "${}", name)?;
                fields.iter().try_for_each(|field| write!(f, ".{}", field))
            }
            Arg::Chain { pipe, fields } => {
                write!(f, "({})", pipe)?;
                fields.iter().try_for_each(|field| write!(f, ".{}", field))
            }
            Arg::Identifier(name) => write!(f, "{}", name),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        write!(f, "{}", args.join(" "))
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.decl.is_empty() {
            let vars: Vec<String> = self.decl.iter().map(|v| format!("${}", v)).collect();
            let op = if self.is_assign { "=" } else { ":=" };
            write!(f, "{} {} ", vars.join(", "), op)?;
        }
        let cmds: Vec<String> = self.cmds.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", cmds.join(" | "))
    }
}

#[derive(Debug)]
struct ParseError {
    message: String,
    pos: usize,
}

type ParseResult<T> = Result<T, ParseError>;

/// How a node list ended
enum Stop {
    Eof(usize),
    End,
    Else,
    ElseIf(usize),
    ElseWith(usize),
}

#[derive(Clone, Copy, PartialEq)]
enum Control {
    If,
    Range,
    With,
}

impl Control {
    fn keyword(self) -> &'static str {
        match self {
            Control::If => "if",
            Control::Range => "range",
            Control::With => "with",
        }
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    cursor: usize,
    funcs: &'a FuncRegistry,
    /// Variables in scope, innermost last; `$` is always present
    vars: Vec<String>,
    range_depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, funcs: &'a FuncRegistry) -> Self {
        Self {
            tokens,
            cursor: 0,
            funcs,
            vars: vec![String::new()],
            range_depth: 0,
        }
    }

    fn parse_root(mut self) -> ParseResult<Vec<Node>> {
        let (nodes, stop) = self.parse_list()?;
        match stop {
            Stop::Eof(_) => Ok(nodes),
            _ => Err(self.error_at_previous("unexpected {{end}} or {{else}}")),
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>, pos: usize) -> ParseError {
        ParseError {
            message: message.into(),
            pos,
        }
    }

    fn error_at_previous(&self, message: impl Into<String>) -> ParseError {
        let pos = self.tokens[self.cursor.saturating_sub(1)].pos;
        self.error(message, pos)
    }

    fn expect_right_delim(&mut self, context: &str) -> ParseResult<()> {
        let token = self.next();
        match token.kind {
            TokenKind::RightDelim => Ok(()),
            other => Err(self.error(
                format!("unexpected {} in {}", describe(&other), context),
                token.pos,
            )),
        }
    }

    /// Parse nodes until EOF, `{{end}}` or `{{else}}`
    fn parse_list(&mut self) -> ParseResult<(Vec<Node>, Stop)> {
        let mut nodes = Vec::new();
        loop {
            let token = self.next();
            match token.kind {
                TokenKind::Eof => return Ok((nodes, Stop::Eof(token.pos))),
                TokenKind::Text(text) => nodes.push(Node::Text(text)),
                TokenKind::LeftDelim => {
                    if let Some(stop) = self.parse_action(&mut nodes)? {
                        return Ok((nodes, stop));
                    }
                }
                other => {
                    return Err(self.error(format!("unexpected {}", describe(&other)), token.pos))
                }
            }
        }
    }

    /// Parse the inside of `{{ ... }}`; returns a stop marker for `end`/`else`
    fn parse_action(&mut self, nodes: &mut Vec<Node>) -> ParseResult<Option<Stop>> {
        let token = self.peek().clone();
        let keyword = match &token.kind {
            TokenKind::Identifier(word) => word.as_str(),
            _ => "",
        };

        match keyword {
            "end" => {
                self.next();
                self.expect_right_delim("end")?;
                Ok(Some(Stop::End))
            }
            "else" => {
                self.next();
                let after = self.peek().clone();
                match &after.kind {
                    TokenKind::Identifier(word) if word == "if" => {
                        self.next();
                        Ok(Some(Stop::ElseIf(after.pos)))
                    }
                    TokenKind::Identifier(word) if word == "with" => {
                        self.next();
                        Ok(Some(Stop::ElseWith(after.pos)))
                    }
                    _ => {
                        self.expect_right_delim("else")?;
                        Ok(Some(Stop::Else))
                    }
                }
            }
            "if" | "range" | "with" => {
                self.next();
                let control = match keyword {
                    "if" => Control::If,
                    "range" => Control::Range,
                    _ => Control::With,
                };
                nodes.push(self.parse_control(control)?);
                Ok(None)
            }
            "template" => {
                self.next();
                nodes.push(self.parse_template(token.pos)?);
                Ok(None)
            }
            "break" | "continue" => {
                self.next();
                if self.range_depth == 0 {
                    return Err(self.error(format!("{{{{{}}}}} outside {{{{range}}}}", keyword), token.pos));
                }
                self.expect_right_delim(keyword)?;
                nodes.push(if keyword == "break" {
                    Node::Break(token.pos)
                } else {
                    Node::Continue(token.pos)
                });
                Ok(None)
            }
            "define" | "block" => Err(self.error(
                format!("{{{{{}}}}} is not supported; use one file per template", keyword),
                token.pos,
            )),
            _ => {
                let pipe = self.parse_pipeline("command", false)?;
                nodes.push(Node::Action(pipe));
                Ok(None)
            }
        }
    }

    /// `if`/`range`/`with` after the keyword, through the matching `{{end}}`
    fn parse_control(&mut self, control: Control) -> ParseResult<Node> {
        let scope = self.vars.len();
        let pipe = self.parse_pipeline(control.keyword(), control == Control::Range)?;

        if control == Control::Range {
            self.range_depth += 1;
        }
        let (list, stop) = self.parse_list()?;
        if control == Control::Range {
            self.range_depth -= 1;
        }

        let else_list = match stop {
            Stop::End => None,
            Stop::Else => {
                let (else_list, else_stop) = self.parse_list()?;
                match else_stop {
                    Stop::End => Some(else_list),
                    Stop::Eof(eof) => return Err(self.unexpected_eof(control, eof)),
                    _ => return Err(self.error_at_previous("expected end; found else")),
                }
            }
            Stop::ElseIf(_) if control == Control::If => Some(vec![self.parse_control(Control::If)?]),
            Stop::ElseWith(_) if control == Control::With => {
                Some(vec![self.parse_control(Control::With)?])
            }
            Stop::ElseIf(else_pos) | Stop::ElseWith(else_pos) => {
                return Err(self.error(
                    format!("unexpected chained else in {{{{{}}}}}", control.keyword()),
                    else_pos,
                ))
            }
            Stop::Eof(eof) => return Err(self.unexpected_eof(control, eof)),
        };
        self.vars.truncate(scope);

        let branch = Branch {
            pipe,
            list,
            else_list,
        };
        Ok(match control {
            Control::If => Node::If(branch),
            Control::Range => Node::Range(branch),
            Control::With => Node::With(branch),
        })
    }

    fn unexpected_eof(&self, control: Control, pos: usize) -> ParseError {
        self.error(
            format!("unexpected EOF; missing {{{{end}}}} for {{{{{}}}}}", control.keyword()),
            pos,
        )
    }

    fn parse_template(&mut self, pos: usize) -> ParseResult<Node> {
        let token = self.next();
        let name = match token.kind {
            TokenKind::String(name) => name,
            other => {
                return Err(self.error(
                    format!("unexpected {} in template clause", describe(&other)),
                    token.pos,
                ))
            }
        };

        let pipe = if self.peek().kind == TokenKind::RightDelim {
            self.next();
            None
        } else {
            Some(self.parse_pipeline("template clause", false)?)
        };
        Ok(Node::Template { name, pipe, pos })
    }

    /// Parse a pipeline through the closing `}}`
    fn parse_pipeline(&mut self, context: &str, allow_two_vars: bool) -> ParseResult<Pipeline> {
        let pos = self.peek().pos;
        let (decl, is_assign) = self.parse_declaration(allow_two_vars)?;
        let cmds = self.parse_commands(context, &TokenKind::RightDelim)?;

        for name in &decl {
            if !is_assign {
                self.vars.push(name.clone());
            }
        }
        Ok(Pipeline {
            pos,
            decl,
            is_assign,
            cmds,
        })
    }

    /// `$x :=`, `$x =` or `$i, $v :=`; consumes nothing if no declaration follows
    fn parse_declaration(&mut self, allow_two_vars: bool) -> ParseResult<(Vec<String>, bool)> {
        let start = self.cursor;
        let mut names = Vec::new();

        loop {
            let TokenKind::Variable(name) = self.peek().kind.clone() else {
                break;
            };
            let var_pos = self.peek().pos;
            let following = self
                .tokens
                .get(self.cursor + 1)
                .map(|t| t.kind.clone())
                .unwrap_or(TokenKind::Eof);

            match following {
                TokenKind::Declare | TokenKind::Assign => {
                    self.cursor += 2;
                    let is_assign = following == TokenKind::Assign;
                    if is_assign && !self.vars.contains(&name) {
                        return Err(self.error(format!("undefined variable \"${}\"", name), var_pos));
                    }
                    names.push(name);
                    return Ok((names, is_assign));
                }
                TokenKind::Comma if allow_two_vars && names.is_empty() => {
                    self.cursor += 2;
                    names.push(name);
                }
                _ => break,
            }
        }

        if !names.is_empty() {
            return Err(self.error("too many declarations in command", self.peek().pos));
        }
        self.cursor = start;
        Ok((names, false))
    }

    fn parse_commands(&mut self, context: &str, close: &TokenKind) -> ParseResult<Vec<Command>> {
        let mut cmds = Vec::new();
        loop {
            let cmd = self.parse_command(context)?;
            let token = self.next();
            if cmds.is_empty() && cmd.args.is_empty() {
                return Err(self.error(format!("missing value for {}", context), token.pos));
            }
            cmds.push(cmd);

            match &token.kind {
                TokenKind::Pipe => continue,
                kind if kind == close => break,
                other => {
                    return Err(self.error(
                        format!("unexpected {} in {}", describe(other), context),
                        token.pos,
                    ))
                }
            }
        }

        for (stage, cmd) in cmds.iter().enumerate().skip(1) {
            match cmd.args.first() {
                None => return Err(self.error("missing command after pipe", cmd.pos)),
                Some(Arg::Identifier(_)) | Some(Arg::Field(_)) | Some(Arg::Chain { .. }) => {}
                Some(Arg::Variable { fields, .. }) if !fields.is_empty() => {}
                Some(other) => {
                    return Err(self.error(
                        format!("non executable command in pipeline stage {}: {}", stage + 1, other),
                        cmd.pos,
                    ))
                }
            }
        }
        Ok(cmds)
    }

    /// Operands up to (not including) `|`, `)` or `}}`
    fn parse_command(&mut self, context: &str) -> ParseResult<Command> {
        let pos = self.peek().pos;
        let mut args = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Pipe | TokenKind::RightDelim | TokenKind::RightParen => break,
                TokenKind::Eof => return Err(self.error(format!("unclosed {}", context), pos)),
                _ => args.push(self.parse_operand()?),
            }
        }
        Ok(Command { pos, args })
    }

    fn parse_operand(&mut self) -> ParseResult<Arg> {
        let token = self.next();
        let arg = match token.kind {
            TokenKind::Dot => Arg::Dot,
            TokenKind::Nil => Arg::Nil,
            TokenKind::Bool(b) => Arg::Bool(b),
            TokenKind::String(s) => Arg::String(s),
            TokenKind::Char(c) => Arg::Number(Number::from(c as u32)),
            TokenKind::Number(text) => Arg::Number(
                parse_number(&text)
                    .ok_or_else(|| self.error(format!("illegal number syntax: {}", text), token.pos))?,
            ),
            TokenKind::Field(fields) => Arg::Field(fields),
            TokenKind::Variable(name) => {
                if !self.vars.contains(&name) {
                    return Err(self.error(format!("undefined variable \"${}\"", name), token.pos));
                }
                let fields = self.take_attached_fields(token.end);
                Arg::Variable { name, fields }
            }
            TokenKind::Identifier(name) => {
                if !self.funcs.contains(&name) && Builtin::lookup(&name).is_none() {
                    return Err(self.error(format!("function \"{}\" not defined", name), token.pos));
                }
                Arg::Identifier(name)
            }
            TokenKind::LeftParen => {
                let cmds = self.parse_commands("parenthesized pipeline", &TokenKind::RightParen)?;
                let close_end = self.tokens[self.cursor - 1].end;
                let pipe = Pipeline {
                    pos: token.pos,
                    decl: Vec::new(),
                    is_assign: false,
                    cmds,
                };
                let fields = self.take_attached_fields(close_end);
                Arg::Chain {
                    pipe: Box::new(pipe),
                    fields,
                }
            }
            other => {
                return Err(self.error(format!("unexpected {} in operand", describe(&other)), token.pos))
            }
        };
        Ok(arg)
    }

    /// A field token starting exactly where the previous operand ended
    fn take_attached_fields(&mut self, end: usize) -> Vec<String> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Field(fields) if token.pos == end => {
                self.next();
                fields
            }
            _ => Vec::new(),
        }
    }
}

/// Integers become integral numbers; everything else a float
fn parse_number(text: &str) -> Option<Number> {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let integer = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse::<i64>().ok()
    } else {
        None
    };

    match integer {
        Some(value) => Some(Number::from(if negative { -value } else { value })),
        None => {
            let value: f64 = text.parse().ok()?;
            Number::from_f64(value)
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Text(_) => "text".to_string(),
        TokenKind::LeftDelim => "\"{{\"".to_string(),
        TokenKind::RightDelim => "\"}}\"".to_string(),
        TokenKind::Identifier(name) => format!("<{}>", name),
        TokenKind::Field(fields) => format!("<.{}>", fields.join(".")),
        TokenKind::Dot => "<.>".to_string(),
        TokenKind::Variable(name) => format!("<${}>", name),
        TokenKind::String(s) => format!("{:?}", s),
        TokenKind::Number(n) => format!("<{}>", n),
        TokenKind::Char(c) => format!("{:?}", c),
        TokenKind::Bool(b) => format!("<{}>", b),
        TokenKind::Nil => "<nil>".to_string(),
        TokenKind::Pipe => "\"|\"".to_string(),
        TokenKind::LeftParen => "\"(\"".to_string(),
        TokenKind::RightParen => "\")\"".to_string(),
        TokenKind::Comma => "\",\"".to_string(),
        TokenKind::Declare => "\":=\"".to_string(),
        TokenKind::Assign => "\"=\"".to_string(),
        TokenKind::Eof => "EOF".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Template {
        Template::parse("test.tmpl", text, &FuncRegistry::standard()).unwrap()
    }

    fn parse_err(text: &str) -> (String, Location) {
        match Template::parse("test.tmpl", text, &FuncRegistry::standard()) {
            Err(TplError::TemplateCompile { message, location }) => (message, location),
            other => panic!("Expected TemplateCompile error, got {:?}", other),
        }
    }

    #[test]
    fn test_action_with_field() {
        let tpl = parse("Hello {{.Name}}!");
        assert_eq!(tpl.root.len(), 3);
        match &tpl.root[1] {
            Node::Action(pipe) => {
                assert_eq!(pipe.cmds.len(), 1);
                assert_eq!(pipe.cmds[0].args, vec![Arg::Field(vec!["Name".to_string()])]);
            }
            other => panic!("Expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_range_with_else() {
        let tpl = parse("{{range .Items}}{{.}}{{else}}none{{end}}");
        match &tpl.root[0] {
            Node::Range(branch) => {
                assert_eq!(branch.pipe.cmds[0].args, vec![Arg::Field(vec!["Items".to_string()])]);
                match &branch.list[0] {
                    Node::Action(pipe) => assert_eq!(pipe.cmds[0].args, vec![Arg::Dot]),
                    other => panic!("Expected action, got {:?}", other),
                }
                assert_eq!(branch.else_list, Some(vec![Node::Text("none".to_string())]));
            }
            other => panic!("Expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_else_if_chain() {
        let tpl = parse("{{if .A}}a{{else if .B}}b{{else}}c{{end}}");
        let Node::If(outer) = &tpl.root[0] else {
            panic!("Expected if");
        };
        let Some(else_list) = &outer.else_list else {
            panic!("Expected else branch");
        };
        let Node::If(inner) = &else_list[0] else {
            panic!("Expected nested if");
        };
        assert_eq!(inner.pipe.cmds[0].args, vec![Arg::Field(vec!["B".to_string()])]);
        assert_eq!(inner.else_list, Some(vec![Node::Text("c".to_string())]));
    }

    #[test]
    fn test_pipeline_and_function() {
        let tpl = parse("{{.Name | printf \"%s!\" | Title}}");
        let Node::Action(pipe) = &tpl.root[0] else {
            panic!("Expected action");
        };
        assert_eq!(pipe.cmds.len(), 3);
        assert_eq!(pipe.to_string(), ".Name | printf \"%s!\" | Title");
    }

    #[test]
    fn test_range_two_variables() {
        let tpl = parse("{{range $k, $v := .M}}{{$k}}={{$v}}{{end}}");
        let Node::Range(branch) = &tpl.root[0] else {
            panic!("Expected range");
        };
        assert_eq!(branch.pipe.decl, vec!["k".to_string(), "v".to_string()]);
        assert!(!branch.pipe.is_assign);
    }

    #[test]
    fn test_variable_scope_ends_with_block() {
        let (message, _) = parse_err("{{with $x := .A}}{{$x}}{{end}}{{$x}}");
        assert_eq!(message, "undefined variable \"$x\"");
    }

    #[test]
    fn test_chain_after_paren() {
        let tpl = parse("{{(index .M \"k\").Name}}");
        let Node::Action(pipe) = &tpl.root[0] else {
            panic!("Expected action");
        };
        match &pipe.cmds[0].args[0] {
            Arg::Chain { pipe, fields } => {
                assert_eq!(fields, &vec!["Name".to_string()]);
                assert_eq!(pipe.to_string(), "index .M \"k\"");
            }
            other => panic!("Expected chain, got {:?}", other),
        }
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_number("42"), Some(Number::from(42)));
        assert_eq!(parse_number("-7"), Some(Number::from(-7)));
        assert_eq!(parse_number("0x1F"), Some(Number::from(31)));
        assert_eq!(parse_number("1.5"), Number::from_f64(1.5));
        assert_eq!(parse_number("1e3"), Number::from_f64(1000.0));
    }

    #[test]
    fn test_unknown_function() {
        let (message, location) = parse_err("line\n{{nope .X}}");
        assert_eq!(message, "function \"nope\" not defined");
        assert_eq!(location.to_string(), "test.tmpl:2:3");
    }

    #[test]
    fn test_empty_registry_rejects_title() {
        let result = Template::parse("t", "{{Title .Name}}", &FuncRegistry::new());
        assert!(matches!(result, Err(TplError::TemplateCompile { .. })));
    }

    #[test]
    fn test_missing_end() {
        let (message, _) = parse_err("{{range .Items}}{{.}}");
        assert_eq!(message, "unexpected EOF; missing {{end}} for {{range}}");
    }

    #[test]
    fn test_stray_end() {
        let (message, _) = parse_err("text{{end}}");
        assert_eq!(message, "unexpected {{end}} or {{else}}");
    }

    #[test]
    fn test_break_outside_range() {
        let (message, _) = parse_err("{{break}}");
        assert_eq!(message, "{{break}} outside {{range}}");
    }

    #[test]
    fn test_empty_action() {
        let (message, _) = parse_err("{{}}");
        assert_eq!(message, "missing value for command");
    }

    #[test]
    fn test_non_executable_stage() {
        let (message, _) = parse_err("{{.A | \"x\"}}");
        assert_eq!(message, "non executable command in pipeline stage 2: \"x\"");
    }

    #[test]
    fn test_template_clause() {
        let tpl = parse("{{template \"other.tmpl\" .User}}");
        match &tpl.root[0] {
            Node::Template { name, pipe, .. } => {
                assert_eq!(name, "other.tmpl");
                assert!(pipe.is_some());
            }
            other => panic!("Expected template node, got {:?}", other),
        }
    }
}
