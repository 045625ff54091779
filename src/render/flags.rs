use crate::error::TplError;
use crate::template::{Kind, TemplateSet, VariableDescriptor};
use serde_json::{Map, Value};
use std::io::Write;

use super::RenderContext;

/// Build the render context from flag values, coercing each by its kind.
///
/// Every variable must have a value; structured values must be JSON objects.
pub fn build_context<'v, F>(
    variables: &[VariableDescriptor],
    mut value_of: F,
) -> Result<RenderContext, TplError>
where
    F: FnMut(&str) -> Option<&'v str>,
{
    let mut context = Map::new();
    for variable in variables {
        let raw = value_of(&variable.name).ok_or_else(|| {
            TplError::Usage(format!("required flag --{} not provided", variable.name))
        })?;

        let value = match variable.kind {
            Kind::Scalar => Value::String(raw.to_string()),
            Kind::Structured => {
                let object: Map<String, Value> =
                    serde_json::from_str(raw).map_err(|e| TplError::InvalidJson {
                        origin: format!("flag --{}", variable.name),
                        source: e,
                    })?;
                Value::Object(object)
            }
        };
        context.insert(variable.name.clone(), value);
    }
    Ok(context)
}

/// Render `template` once from flag values
///
/// The whole context is built before anything is written, so a bad flag
/// value produces no output.
pub fn render_flags<'v, F, W>(
    set: &TemplateSet,
    template: &str,
    variables: &[VariableDescriptor],
    value_of: F,
    out: &mut W,
) -> Result<(), TplError>
where
    F: FnMut(&str) -> Option<&'v str>,
    W: Write,
{
    let context = build_context(variables, value_of)?;
    tracing::debug!(template, variables = context.len(), "rendering from flags");

    set.execute(template, &Value::Object(context), out)?;
    out.flush()?;
    Ok(())
}
