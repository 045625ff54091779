use anyhow::{anyhow, bail, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::value::{as_integer, display, format_float, is_true, type_name};

lazy_static! {
    // printf verbs: flags, width, precision, verb letter
    static ref VERB_PATTERN: Regex = Regex::new(r"%([-+# 0]*)(\d+)?(?:\.(\d+))?([a-zA-Z%])").unwrap();
}

/// Largest width or precision accepted by `printf`
const MAX_WIDTH: usize = 1_000_000;

/// A helper callable from templates
pub type TemplateFn = fn(&[Value]) -> Result<Value>;

/// Named helpers available to templates, supplied when a template set is built
#[derive(Clone, Default)]
pub struct FuncRegistry {
    funcs: BTreeMap<String, TemplateFn>,
}

impl fmt::Debug for FuncRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.funcs.keys()).finish()
    }
}

impl FuncRegistry {
    /// A registry with no helpers; only the builtins remain callable
    pub fn new() -> Self {
        Self::default()
    }

    /// The helpers shipped with tplcmd: `Title`, `upper`, `lower`, `trim`
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .register("Title", title)
            .register("upper", upper)
            .register("lower", lower)
            .register("trim", trim);
        registry
    }

    /// Add or replace a helper
    pub fn register(&mut self, name: &str, func: TemplateFn) -> &mut Self {
        self.funcs.insert(name.to_string(), func);
        self
    }

    pub fn get(&self, name: &str) -> Option<TemplateFn> {
        self.funcs.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }
}

fn single_string<'a>(name: &str, args: &'a [Value]) -> Result<&'a str> {
    match args {
        [Value::String(s)] => Ok(s),
        [other] => bail!("{} expects a string, got {}", name, type_name(other)),
        _ => bail!("wrong number of args for {}: want 1 got {}", name, args.len()),
    }
}

/// Upper-case the first letter of every word
fn title(args: &[Value]) -> Result<Value> {
    let s = single_string("Title", args)?;
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '_' || c == '\'');
    }
    Ok(Value::String(out))
}

fn upper(args: &[Value]) -> Result<Value> {
    Ok(Value::String(single_string("upper", args)?.to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value> {
    Ok(Value::String(single_string("lower", args)?.to_lowercase()))
}

fn trim(args: &[Value]) -> Result<Value> {
    Ok(Value::String(single_string("trim", args)?.trim().to_string()))
}

/// Functions built into the template language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    And,
    Or,
    Not,
    Len,
    Index,
    Print,
    Printf,
    Println,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "and" => Builtin::And,
            "or" => Builtin::Or,
            "not" => Builtin::Not,
            "len" => Builtin::Len,
            "index" => Builtin::Index,
            "print" => Builtin::Print,
            "printf" => Builtin::Printf,
            "println" => Builtin::Println,
            "eq" => Builtin::Eq,
            "ne" => Builtin::Ne,
            "lt" => Builtin::Lt,
            "le" => Builtin::Le,
            "gt" => Builtin::Gt,
            "ge" => Builtin::Ge,
            _ => return None,
        })
    }

    pub fn call(self, args: &[Value]) -> Result<Value> {
        match self {
            Builtin::And => {
                expect_at_least("and", args, 1)?;
                Ok(args
                    .iter()
                    .find(|v| !is_true(v))
                    .unwrap_or(&args[args.len() - 1])
                    .clone())
            }
            Builtin::Or => {
                expect_at_least("or", args, 1)?;
                Ok(args
                    .iter()
                    .find(|v| is_true(v))
                    .unwrap_or(&args[args.len() - 1])
                    .clone())
            }
            Builtin::Not => {
                expect_exactly("not", args, 1)?;
                Ok(Value::Bool(!is_true(&args[0])))
            }
            Builtin::Len => {
                expect_exactly("len", args, 1)?;
                let len = match &args[0] {
                    Value::String(s) => s.len(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    other => bail!("len of type {}", type_name(other)),
                };
                Ok(Value::from(len))
            }
            Builtin::Index => {
                expect_at_least("index", args, 1)?;
                args[1..].iter().try_fold(args[0].clone(), index_one)
            }
            Builtin::Print => Ok(Value::String(sprint(args))),
            Builtin::Println => {
                let parts: Vec<String> = args.iter().map(display).collect();
                Ok(Value::String(format!("{}\n", parts.join(" "))))
            }
            Builtin::Printf => {
                expect_at_least("printf", args, 1)?;
                let Value::String(format) = &args[0] else {
                    bail!("printf format must be a string, got {}", type_name(&args[0]));
                };
                Ok(Value::String(sprintf(format, &args[1..])))
            }
            Builtin::Eq => {
                if args.len() < 2 {
                    bail!("missing argument for comparison");
                }
                for other in &args[1..] {
                    if basic_eq(&args[0], other)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Builtin::Ne => {
                expect_exactly("ne", args, 2)?;
                Ok(Value::Bool(!basic_eq(&args[0], &args[1])?))
            }
            Builtin::Lt => compare("lt", args, |o| o == Ordering::Less),
            Builtin::Le => compare("le", args, |o| o != Ordering::Greater),
            Builtin::Gt => compare("gt", args, |o| o == Ordering::Greater),
            Builtin::Ge => compare("ge", args, |o| o != Ordering::Less),
        }
    }
}

fn expect_exactly(name: &str, args: &[Value], want: usize) -> Result<()> {
    if args.len() != want {
        bail!("wrong number of args for {}: want {} got {}", name, want, args.len());
    }
    Ok(())
}

fn expect_at_least(name: &str, args: &[Value], want: usize) -> Result<()> {
    if args.len() < want {
        bail!("wrong number of args for {}: want at least {} got {}", name, want, args.len());
    }
    Ok(())
}

fn index_one(item: Value, key: &Value) -> Result<Value> {
    match (&item, key) {
        (Value::Array(items), key) => {
            let i = as_integer(key)
                .ok_or_else(|| anyhow!("cannot index slice/array with type {}", type_name(key)))?;
            usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| anyhow!("index out of range: {}", i))
        }
        (Value::Object(map), Value::String(k)) => Ok(map.get(k).cloned().unwrap_or(Value::Null)),
        (Value::Object(_), other) => bail!("cannot index map with type {}", type_name(other)),
        (Value::Null, _) => bail!("index of untyped nil"),
        (other, _) => bail!("can't index item of type {}", type_name(other)),
    }
}

/// Operands joined with spaces only where neither side is a string
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !args[i - 1].is_string() && !arg.is_string() {
            out.push(' ');
        }
        out.push_str(&display(arg));
    }
    out
}

fn basic_eq(a: &Value, b: &Value) -> Result<bool> {
    match (a, b) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::String(x), Value::String(y)) => Ok(x == y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Ok(x == y),
            _ => Ok(x.as_f64() == y.as_f64()),
        },
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            bail!("non-comparable type {}", type_name(if a.is_array() || a.is_object() { a } else { b }))
        }
        _ => bail!("incompatible types for comparison"),
    }
}

fn compare(name: &str, args: &[Value], accept: fn(Ordering) -> bool) -> Result<Value> {
    expect_exactly(name, args, 2)?;
    let ordering = match (&args[0], &args[1]) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let (x, y) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
                x.partial_cmp(&y)
                    .ok_or_else(|| anyhow!("invalid value for comparison"))?
            }
        },
        (Value::String(_), Value::Number(_)) | (Value::Number(_), Value::String(_)) => {
            bail!("incompatible types for comparison")
        }
        (other, _) => bail!("invalid type for comparison: {}", type_name(other)),
    };
    Ok(Value::Bool(accept(ordering)))
}

/// A `printf` subset: `%v %s %d %f %g %q %t %x %X %c %%` with flags, width and precision
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut next_arg = 0;
    let mut last_end = 0;

    for cap in VERB_PATTERN.captures_iter(format) {
        let Some(full) = cap.get(0) else {
            continue;
        };
        out.push_str(&format[last_end..full.start()]);
        last_end = full.end();

        let verb = cap[4].chars().next().unwrap_or('v');
        if verb == '%' {
            out.push('%');
            continue;
        }

        let Some(arg) = args.get(next_arg) else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        next_arg += 1;
        out.push_str(&format_verb(&cap, verb, arg));
    }
    out.push_str(&format[last_end..]);

    if next_arg < args.len() {
        let extra: Vec<String> = args[next_arg..]
            .iter()
            .map(|a| format!("{}={}", type_name(a), display(a)))
            .collect();
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

fn format_verb(cap: &Captures<'_>, verb: char, arg: &Value) -> String {
    let flags = cap.get(1).map_or("", |m| m.as_str());
    let mut prefix = String::new();
    let width = match cap.get(2).map(|m| bounded(m.as_str())) {
        Some(Some(width)) => width,
        Some(None) => {
            prefix.push_str("%!(BADWIDTH)");
            0
        }
        None => 0,
    };
    let precision = match cap.get(3).map(|m| bounded(m.as_str())) {
        Some(Some(precision)) => Some(precision),
        Some(None) => {
            prefix.push_str("%!(BADPREC)");
            None
        }
        None => None,
    };
    let plus = flags.contains('+');

    let bad_verb = || format!("{}%!{}({}={})", prefix, verb, type_name(arg), display(arg));
    let signed = |s: String, negative: bool| if plus && !negative { format!("+{}", s) } else { s };

    let (body, numeric) = match verb {
        'v' => (display(arg), arg.is_number()),
        's' => {
            let text = display(arg);
            match precision {
                Some(p) => (text.chars().take(p).collect(), false),
                None => (text, false),
            }
        }
        'q' => match arg {
            Value::String(s) => (format!("{:?}", s), false),
            _ => return bad_verb(),
        },
        't' => match arg {
            Value::Bool(b) => (b.to_string(), false),
            _ => return bad_verb(),
        },
        'd' => match as_integer(arg) {
            Some(i) => (signed(i.to_string(), i < 0), true),
            None => return bad_verb(),
        },
        'c' => match as_integer(arg).and_then(|i| u32::try_from(i).ok()).and_then(char::from_u32) {
            Some(c) => (c.to_string(), false),
            None => return bad_verb(),
        },
        'x' | 'X' => {
            let hex: String = match arg {
                Value::String(s) => s.bytes().map(|b| format!("{:02x}", b)).collect(),
                _ => match as_integer(arg) {
                    Some(i) if i < 0 => format!("-{:x}", i.unsigned_abs()),
                    Some(i) => format!("{:x}", i),
                    None => return bad_verb(),
                },
            };
            let hex = if verb == 'X' { hex.to_uppercase() } else { hex };
            (hex, arg.is_number())
        }
        'f' | 'F' | 'g' => match arg {
            Value::Number(n) => {
                let f = n.as_f64().unwrap_or_default();
                let text = if verb == 'g' && precision.is_none() {
                    format_float(f)
                } else {
                    format!("{:.*}", precision.unwrap_or(6), f)
                };
                (signed(text, f < 0.0), true)
            }
            _ => return bad_verb(),
        },
        _ => return bad_verb(),
    };

    prefix + &pad(body, width, flags.contains('-'), numeric && flags.contains('0'))
}

/// Width or precision text, rejected above `MAX_WIDTH`
fn bounded(digits: &str) -> Option<usize> {
    digits.parse().ok().filter(|n| *n <= MAX_WIDTH)
}

fn pad(body: String, width: usize, left: bool, zero: bool) -> String {
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if left {
        format!("{}{}", body, " ".repeat(fill))
    } else if zero {
        match body.strip_prefix(['-', '+']) {
            Some(digits) => format!("{}{}{}", &body[..1], "0".repeat(fill), digits),
            None => format!("{}{}", "0".repeat(fill), body),
        }
    } else {
        format!("{}{}", " ".repeat(fill), body)
    }
}
