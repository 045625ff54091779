use crate::error::TplError;
use serde_json::Value;
use std::fmt::Display;
use std::io::Write;

use super::funcs::Builtin;
use super::parse::{Arg, Branch, Command, Node, Pipeline, Template};
use super::set::TemplateSet;
use super::value::{as_integer, display, is_true, print_action, type_name};

/// Nesting limit for `{{template}}` invocations
const MAX_TEMPLATE_DEPTH: usize = 100;

/// Execute `template` against `data`, writing output to `out` as it is produced
pub(super) fn execute<W: Write>(
    set: &TemplateSet,
    template: &Template,
    data: &Value,
    out: &mut W,
) -> Result<(), TplError> {
    let mut state = ExecState {
        set,
        template,
        out,
        vars: vec![(String::new(), data.clone())],
        depth: 0,
    };
    state.walk(&template.root, data)?;
    Ok(())
}

/// Control flow out of a node list
#[derive(Debug, PartialEq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

struct ExecState<'a, W: Write> {
    set: &'a TemplateSet,
    template: &'a Template,
    out: &'a mut W,
    /// Variable stack, innermost last; entry 0 is `$`
    vars: Vec<(String, Value)>,
    depth: usize,
}

impl<'a, W: Write> ExecState<'a, W> {
    fn fail(&self, pos: usize, context: impl Display, message: impl Display) -> TplError {
        TplError::Render {
            template: self.template.name.clone(),
            message: format!(
                "{}: executing {:?} at <{}>: {}",
                self.template.location(pos),
                self.template.name,
                context,
                message
            ),
        }
    }

    fn walk(&mut self, list: &[Node], dot: &Value) -> Result<Flow, TplError> {
        for node in list {
            let flow = match node {
                Node::Text(text) => {
                    self.out.write_all(text.as_bytes())?;
                    Flow::Normal
                }
                Node::Action(pipe) => {
                    let value = self.eval_pipeline(dot, pipe)?;
                    if pipe.decl.is_empty() {
                        self.out.write_all(print_action(&value).as_bytes())?;
                    }
                    Flow::Normal
                }
                Node::If(branch) => self.walk_if_or_with(branch, dot, false)?,
                Node::With(branch) => self.walk_if_or_with(branch, dot, true)?,
                Node::Range(branch) => self.walk_range(branch, dot)?,
                Node::Template { name, pipe, pos } => {
                    self.walk_template(name, pipe.as_ref(), *pos, dot)?;
                    Flow::Normal
                }
                Node::Break(_) => Flow::Break,
                Node::Continue(_) => Flow::Continue,
            };
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn walk_if_or_with(&mut self, branch: &Branch, dot: &Value, with: bool) -> Result<Flow, TplError> {
        let mark = self.vars.len();
        let value = self.eval_pipeline(dot, &branch.pipe)?;
        let flow = if is_true(&value) {
            if with {
                self.walk(&branch.list, &value)?
            } else {
                self.walk(&branch.list, dot)?
            }
        } else if let Some(else_list) = &branch.else_list {
            self.walk(else_list, dot)?
        } else {
            Flow::Normal
        };
        self.vars.truncate(mark);
        Ok(flow)
    }

    fn walk_range(&mut self, branch: &Branch, dot: &Value) -> Result<Flow, TplError> {
        let mark = self.vars.len();
        let pipe = &branch.pipe;
        let value = self.eval_pipeline(dot, pipe)?;

        let items: Vec<(Value, Value)> = match &value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item.clone()))
                .collect(),
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter()
                    .map(|k| (Value::String(k.clone()), map[k.as_str()].clone()))
                    .collect()
            }
            Value::Null => Vec::new(),
            Value::Number(_) => match as_integer(&value) {
                Some(n) if n >= 0 => (0..n).map(|i| (Value::from(i), Value::from(i))).collect(),
                _ => {
                    return Err(self.fail(
                        pipe.pos,
                        pipe,
                        format!("range can't iterate over {}", display(&value)),
                    ))
                }
            },
            other => {
                return Err(self.fail(
                    pipe.pos,
                    pipe,
                    format!("range can't iterate over {}", display(other)),
                ))
            }
        };

        if items.is_empty() {
            if let Some(else_list) = &branch.else_list {
                self.walk(else_list, dot)?;
            }
            self.vars.truncate(mark);
            return Ok(Flow::Normal);
        }

        for (key, item) in items {
            match pipe.decl.as_slice() {
                [] => {}
                [elem] => self.set_var(elem, item.clone()),
                [index, elem] => {
                    self.set_var(index, key);
                    self.set_var(elem, item.clone());
                }
                _ => return Err(self.fail(pipe.pos, pipe, "too many range variables")),
            }

            let iteration = self.vars.len();
            let flow = self.walk(&branch.list, &item)?;
            self.vars.truncate(iteration);
            if flow == Flow::Break {
                break;
            }
        }

        self.vars.truncate(mark);
        Ok(Flow::Normal)
    }

    fn walk_template(
        &mut self,
        name: &str,
        pipe: Option<&Pipeline>,
        pos: usize,
        dot: &Value,
    ) -> Result<(), TplError> {
        let context = format!("template {:?}", name);
        if self.depth >= MAX_TEMPLATE_DEPTH {
            return Err(self.fail(
                pos,
                context,
                format!("exceeded maximum template depth ({})", MAX_TEMPLATE_DEPTH),
            ));
        }
        let template = self
            .set
            .get(name)
            .ok_or_else(|| self.fail(pos, &context, format!("no such template {:?}", name)))?;
        let new_dot = match pipe {
            Some(pipe) => self.eval_pipeline(dot, pipe)?,
            None => Value::Null,
        };

        let mut nested = ExecState {
            set: self.set,
            template,
            out: &mut *self.out,
            vars: vec![(String::new(), new_dot.clone())],
            depth: self.depth + 1,
        };
        nested.walk(&template.root, &new_dot)?;
        Ok(())
    }

    fn eval_pipeline(&mut self, dot: &Value, pipe: &Pipeline) -> Result<Value, TplError> {
        let mut value = None;
        for cmd in &pipe.cmds {
            value = Some(self.eval_command(dot, cmd, value)?);
        }
        let value = value.unwrap_or(Value::Null);

        for name in &pipe.decl {
            if pipe.is_assign {
                self.set_var(name, value.clone());
            } else {
                self.vars.push((name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    fn set_var(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.vars.iter_mut().rev().find(|(n, _)| n == name) {
            slot.1 = value;
        }
    }

    fn eval_command(
        &mut self,
        dot: &Value,
        cmd: &Command,
        piped: Option<Value>,
    ) -> Result<Value, TplError> {
        let Some(first) = cmd.args.first() else {
            return Err(self.fail(cmd.pos, cmd, "empty command"));
        };

        match first {
            Arg::Identifier(name) => self.eval_function(dot, name, &cmd.args[1..], piped, cmd),
            Arg::Nil => Err(self.fail(cmd.pos, cmd, "nil is not a command")),
            _ if cmd.args.len() > 1 || piped.is_some() => Err(self.fail(
                cmd.pos,
                cmd,
                format!("can't give argument to non-function {}", first),
            )),
            _ => self.eval_arg(dot, first, cmd),
        }
    }

    fn eval_arg(&mut self, dot: &Value, arg: &Arg, cmd: &Command) -> Result<Value, TplError> {
        match arg {
            Arg::Dot => Ok(dot.clone()),
            Arg::Nil => Ok(Value::Null),
            Arg::Bool(b) => Ok(Value::Bool(*b)),
            Arg::Number(n) => Ok(Value::Number(n.clone())),
            Arg::String(s) => Ok(Value::String(s.clone())),
            Arg::Field(fields) => self.walk_fields(dot, fields, arg, cmd),
            Arg::Variable { name, fields } => {
                let base = self
                    .vars
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| self.fail(cmd.pos, arg, format!("undefined variable: ${}", name)))?;
                self.walk_fields(&base, fields, arg, cmd)
            }
            Arg::Chain { pipe, fields } => {
                let base = self.eval_pipeline(dot, pipe)?;
                self.walk_fields(&base, fields, arg, cmd)
            }
            Arg::Identifier(name) => self.eval_function(dot, name, &[], None, cmd),
        }
    }

    /// Follow `fields` into nested objects; every key must be present
    fn walk_fields(
        &self,
        receiver: &Value,
        fields: &[String],
        arg: &Arg,
        cmd: &Command,
    ) -> Result<Value, TplError> {
        let mut current = receiver;
        for field in fields {
            current = match current {
                Value::Object(map) => map.get(field).ok_or_else(|| {
                    self.fail(cmd.pos, arg, format!("map has no entry for key {:?}", field))
                })?,
                Value::Null => {
                    return Err(self.fail(
                        cmd.pos,
                        arg,
                        format!("nil pointer evaluating interface {{}}.{}", field),
                    ))
                }
                other => {
                    return Err(self.fail(
                        cmd.pos,
                        arg,
                        format!("can't evaluate field {} in type {}", field, type_name(other)),
                    ))
                }
            };
        }
        Ok(current.clone())
    }

    fn eval_function(
        &mut self,
        dot: &Value,
        name: &str,
        args: &[Arg],
        piped: Option<Value>,
        cmd: &Command,
    ) -> Result<Value, TplError> {
        if let Some(func) = self.set.funcs().get(name) {
            let values = self.eval_args(dot, args, piped, cmd)?;
            return func(&values)
                .map_err(|e| self.fail(cmd.pos, cmd, format!("error calling {}: {}", name, e)));
        }

        let builtin = Builtin::lookup(name)
            .ok_or_else(|| self.fail(cmd.pos, cmd, format!("function {:?} not defined", name)))?;

        if matches!(builtin, Builtin::And | Builtin::Or) {
            return self.eval_short_circuit(dot, builtin == Builtin::Or, name, args, piped, cmd);
        }

        let values = self.eval_args(dot, args, piped, cmd)?;
        builtin
            .call(&values)
            .map_err(|e| self.fail(cmd.pos, cmd, format!("error calling {}: {}", name, e)))
    }

    /// `and` stops at the first false operand, `or` at the first true one
    fn eval_short_circuit(
        &mut self,
        dot: &Value,
        stop_when: bool,
        name: &str,
        args: &[Arg],
        piped: Option<Value>,
        cmd: &Command,
    ) -> Result<Value, TplError> {
        if args.is_empty() && piped.is_none() {
            return Err(self.fail(
                cmd.pos,
                cmd,
                format!("wrong number of args for {}: want at least 1 got 0", name),
            ));
        }

        let mut last = Value::Null;
        for arg in args {
            let value = self.eval_arg(dot, arg, cmd)?;
            if is_true(&value) == stop_when {
                return Ok(value);
            }
            last = value;
        }
        Ok(piped.unwrap_or(last))
    }

    fn eval_args(
        &mut self,
        dot: &Value,
        args: &[Arg],
        piped: Option<Value>,
        cmd: &Command,
    ) -> Result<Vec<Value>, TplError> {
        let mut values = Vec::with_capacity(args.len() + 1);
        for arg in args {
            values.push(self.eval_arg(dot, arg, cmd)?);
        }
        values.extend(piped);
        Ok(values)
    }
}
