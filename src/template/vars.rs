//! Variable discovery: which names a template reads, and in what form.
//!
//! Only the top-level directives of a template are inspected. Names that
//! appear solely inside `if`/`with` bodies or nested `range` bodies are not
//! discovered and will be missing from the render context.

use std::fmt;

use super::parse::{Arg, Node, Pipeline, Template};

/// How a variable's value is supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Plain text, substituted as-is
    Scalar,
    /// JSON object text, parsed into a map before substitution
    Structured,
}

impl Kind {
    /// Placeholder shown for the flag value in usage output
    pub fn value_name(self) -> &'static str {
        match self {
            Kind::Scalar => "TEXT",
            Kind::Structured => "JSON",
        }
    }

    /// Help text attached to the flag
    pub fn help(self) -> &'static str {
        match self {
            Kind::Scalar => "scalar: plain string value",
            Kind::Structured => "structured: JSON object value",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Scalar => write!(f, "scalar"),
            Kind::Structured => write!(f, "structured"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDescriptor {
    pub name: String,
    pub kind: Kind,
}

/// What a top-level node does with its pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// `{{pipeline}}`
    Output,
    /// `{{range pipeline}}`
    Iteration,
    Other,
}

/// A top-level directive and the names its pipeline reads, in order
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub references: Vec<String>,
}

impl Template {
    /// The top-level directives of this template; text between them is skipped
    pub fn top_level(&self) -> impl Iterator<Item = Directive> + '_ {
        self.root.iter().filter_map(|node| {
            let (kind, pipe) = match node {
                Node::Text(_) => return None,
                Node::Action(pipe) => (DirectiveKind::Output, Some(pipe)),
                Node::Range(branch) => (DirectiveKind::Iteration, Some(&branch.pipe)),
                Node::If(branch) | Node::With(branch) => (DirectiveKind::Other, Some(&branch.pipe)),
                Node::Template { pipe, .. } => (DirectiveKind::Other, pipe.as_ref()),
                Node::Break(_) | Node::Continue(_) => (DirectiveKind::Other, None),
            };
            Some(Directive {
                kind,
                references: pipe.map(references).unwrap_or_default(),
            })
        })
    }
}

/// First segment of every `.a.b.c` chain passed directly to a command of `pipe`
fn references(pipe: &Pipeline) -> Vec<String> {
    pipe.cmds
        .iter()
        .flat_map(|cmd| cmd.args.iter())
        .filter_map(|arg| match arg {
            Arg::Field(fields) => fields.first().cloned(),
            _ => None,
        })
        .collect()
}

/// Discover the variables read by the top-level directives of `template`.
///
/// Output directives yield [`Kind::Scalar`], iterations yield
/// [`Kind::Structured`]. A name keeps the kind of its first occurrence.
pub fn extract_variables(template: &Template) -> Vec<VariableDescriptor> {
    let mut found: Vec<VariableDescriptor> = Vec::new();

    for directive in template.top_level() {
        let kind = match directive.kind {
            DirectiveKind::Output => Kind::Scalar,
            DirectiveKind::Iteration => Kind::Structured,
            DirectiveKind::Other => continue,
        };
        for name in directive.references {
            if !found.iter().any(|v| v.name == name) {
                found.push(VariableDescriptor { name, kind });
            }
        }
    }

    found
}
