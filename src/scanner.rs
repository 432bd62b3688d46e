use tracing::trace;

use crate::markup::{FieldMatch, FormulaMatch, occurrences};
use crate::models::{FieldDeclaration, FieldKind, FieldValue, FormulaDeclaration, ScanResult};

/// Extracts field and formula declarations from template text, in order of
/// appearance. Fields and formulas are matched in two independent passes;
/// markup that does not match is simply not reported.
pub fn scan(text: &str) -> ScanResult {
    let fields: Vec<FieldDeclaration> = occurrences::<FieldMatch>(text)
        .enumerate()
        .map(|(index, found)| declare_field(index, &found))
        .collect();

    let formulas: Vec<FormulaDeclaration> = occurrences::<FormulaMatch>(text)
        .enumerate()
        .map(|(index, found)| FormulaDeclaration {
            index,
            expression: found.expression().to_string(),
        })
        .collect();

    trace!(
        fields = fields.len(),
        formulas = formulas.len(),
        "scanned template"
    );
    ScanResult { fields, formulas }
}

fn declare_field(index: usize, found: &FieldMatch<'_>) -> FieldDeclaration {
    let kind = found.kind;
    let owned = |key: &str| found.attribute(key).map(str::to_string);

    let default_value = match (kind, found.attribute("default")) {
        (FieldKind::Toggle, value) => FieldValue::Flag(value.is_some_and(is_affirmative)),
        (_, value) => FieldValue::Text(value.unwrap_or_default().to_string()),
    };
    let options = match (kind, found.attribute("options")) {
        (FieldKind::Dropdown, Some(options)) => {
            options.split(',').map(|option| option.trim().to_string()).collect()
        }
        _ => Vec::new(),
    };
    let (true_text, false_text) = match kind {
        FieldKind::Toggle => (owned("truetext"), owned("falsetext")),
        _ => (None, None),
    };

    FieldDeclaration {
        index,
        kind,
        name: found.name_or_positional(index),
        label: owned("label"),
        default_value,
        options,
        required: found.attribute("required") == Some("yes"),
        true_text,
        false_text,
    }
}

fn is_affirmative(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes") || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_field_attributes() {
        let result = scan(
            "Hello {formtext: name=client; label=Client name; default=Ana; required=yes}!",
        );
        assert_eq!(result.fields.len(), 1);
        let field = &result.fields[0];
        assert_eq!(field.kind, FieldKind::SingleLineText);
        assert_eq!(field.name, "client");
        assert_eq!(field.label.as_deref(), Some("Client name"));
        assert_eq!(field.default_value, FieldValue::from("Ana"));
        assert!(field.required);
        assert!(field.options.is_empty());
        assert_eq!(field.true_text, None);
    }

    #[test]
    fn dropdown_options_are_trimmed() {
        let result = scan("{formdropdown: name=size; options=S, M, L}");
        assert_eq!(result.fields.len(), 1);
        assert_eq!(result.fields[0].kind, FieldKind::Dropdown);
        assert_eq!(result.fields[0].options, vec!["S", "M", "L"]);
    }

    #[test]
    fn options_ignored_outside_dropdowns() {
        let result = scan("{formtext: name=a; options=x, y}");
        assert!(result.fields[0].options.is_empty());
    }

    #[test]
    fn toggle_texts_and_default() {
        let result = scan(
            "{formtoggle: name=ok; truetext=YES; falsetext=NO; default=yes}{formtoggle: name=b; default=no}",
        );
        let ok = &result.fields[0];
        assert_eq!(ok.kind, FieldKind::Toggle);
        assert_eq!(ok.true_text.as_deref(), Some("YES"));
        assert_eq!(ok.false_text.as_deref(), Some("NO"));
        assert_eq!(ok.default_value, FieldValue::Flag(true));
        assert_eq!(result.fields[1].default_value, FieldValue::Flag(false));
    }

    #[test]
    fn missing_name_gets_positional_placeholder() {
        let result =
            scan("{formtext: label=First} {formparagraph: name=body} {formtext: label=Third}");
        let names: Vec<&str> = result.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["field_0", "body", "field_2"]);
    }

    #[test]
    fn duplicate_names_are_kept() {
        let result = scan("{formtext: name=x} and {formtext: name=x; label=Again}");
        assert_eq!(result.fields.len(), 2);
        assert_eq!(result.fields[1].index, 1);
        assert_eq!(result.unique_fields().len(), 1);
    }

    #[test]
    fn formulas_in_order_and_trimmed() {
        let result = scan("{= a + b } then {=c*2} and {=} ignored");
        let expressions: Vec<&str> = result
            .formulas
            .iter()
            .map(|f| f.expression.as_str())
            .collect();
        assert_eq!(expressions, vec!["a + b", "c*2"]);
        assert_eq!(result.formulas[1].index, 1);
    }

    #[test]
    fn formula_inside_toggle_text_is_found_by_its_own_pass() {
        let result = scan("{formtoggle: name=t; truetext={= 1 + 1}; falsetext=no}");
        assert_eq!(result.fields.len(), 1);
        assert_eq!(result.fields[0].true_text.as_deref(), Some("{= 1 + 1"));
        assert_eq!(result.formulas.len(), 1);
        assert_eq!(result.formulas[0].expression, "1 + 1");
    }

    #[test]
    fn malformed_markup_yields_nothing() {
        assert!(scan("{formtext name=x} {formtext:} {unknown: a=b} {= 1").is_empty());
    }
}
