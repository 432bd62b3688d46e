use tracing::debug;

use crate::formula::{evaluate, format_number};
use crate::markup::{FieldMatch, FormulaMatch, VariableMatch, replace_all};
use crate::models::{FieldKind, ValueBindings};

/// What an on toggle prints when it declares no `truetext`.
pub const DEFAULT_TRUE_TEXT: &str = "Yes";

/// Produces the final text of a template for the given values.
///
/// Three passes run in order, each over the output of the previous one:
/// field declarations are replaced by their values, `{name}` references to
/// bound names are resolved, then `{= ...}` formulas are evaluated.
pub fn render(text: &str, values: &ValueBindings) -> String {
    evaluate_formulas(&resolve_references(text, values), values)
}

/// The first two render passes: the text formulas are evaluated against.
pub fn resolve_references(text: &str, values: &ValueBindings) -> String {
    let text = substitute_fields(text, values);
    substitute_variables(&text, values)
}

/// Replaces each field declaration with its bound value. Toggles print their
/// `truetext` (default `Yes`) when on and their `falsetext` (default empty)
/// when off; unbound fields print nothing.
pub fn substitute_fields(text: &str, values: &ValueBindings) -> String {
    let mut index = 0;
    replace_all::<FieldMatch, _>(text, |found, out| {
        let name = found.name_or_positional(index);
        index += 1;
        let value = values.get(&name);
        match found.kind {
            FieldKind::Toggle => {
                if value.is_some_and(|value| value.is_truthy()) {
                    out.push_str(found.attribute("truetext").unwrap_or(DEFAULT_TRUE_TEXT));
                } else {
                    out.push_str(found.attribute("falsetext").unwrap_or_default());
                }
            }
            _ => {
                if let Some(value) = value {
                    out.push_str(value.field_text());
                }
            }
        }
    })
}

/// Resolves `{name}` references to bound values; unbound references are
/// left as written.
pub fn substitute_variables(text: &str, values: &ValueBindings) -> String {
    replace_all::<VariableMatch, _>(text, |found, out| match values.get(found.name) {
        Some(value) => out.push_str(&value.to_string()),
        None => out.push_str(&text[found.span.clone()]),
    })
}

/// Evaluates every `{= ...}` formula. A formula that fails to evaluate is
/// replaced by `[Formula Error: <expression>]` without affecting the rest.
pub fn evaluate_formulas(text: &str, values: &ValueBindings) -> String {
    replace_all::<FormulaMatch, _>(text, |found, out| {
        let expression = found.expression();
        match evaluate(expression, values) {
            Ok(result) => out.push_str(&format_number(result)),
            Err(err) => {
                debug!(expression, error = %err, "formula evaluation failed");
                out.push_str("[Formula Error: ");
                out.push_str(expression);
                out.push(']');
            }
        }
    })
}
