use snipfill::{FieldKind, FieldValue, ValueBindings, render, scan};

fn bindings(pairs: &[(&str, FieldValue)]) -> ValueBindings {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

const ORDER: &str = "Hi {formtext: name=client; label=Client; required=yes},\n\
                     {formtext: name=qty; label=Quantity; default=2} x {formdropdown: name=size; options=S, M, L; default=M}\n\
                     Total: {= qty * 4.5 + shipping} EUR\n\
                     {formtoggle: name=gift; truetext=Gift wrapped; falsetext=Standard packaging}\n\
                     Ref: {client}-{order_id}";

#[test]
fn form_defaults_drive_first_preview() {
    let result = scan(ORDER);
    let kinds: Vec<FieldKind> = result.fields.iter().map(|field| field.kind).collect();
    assert_eq!(
        kinds,
        vec![
            FieldKind::SingleLineText,
            FieldKind::SingleLineText,
            FieldKind::Dropdown,
            FieldKind::Toggle,
        ]
    );
    assert_eq!(result.formulas.len(), 1);
    assert_eq!(result.formulas[0].expression, "qty * 4.5 + shipping");

    let values = result.initial_bindings();
    assert_eq!(values["gift"], FieldValue::Flag(false));
    assert_eq!(
        render(ORDER, &values),
        "Hi ,\n\
         2 x M\n\
         Total: [Formula Error: qty * 4.5 + shipping] EUR\n\
         Standard packaging\n\
         Ref: -{order_id}"
    );
    assert_eq!(result.missing_required(&values).len(), 1);
}

#[test]
fn filled_form_renders_completely() {
    let mut values = scan(ORDER).initial_bindings();
    values.insert("client".to_string(), "ACME".into());
    values.insert("qty".to_string(), "4".into());
    values.insert("shipping".to_string(), "7.5".into());
    values.insert("gift".to_string(), true.into());
    assert_eq!(
        render(ORDER, &values),
        "Hi ACME,\n\
         4 x M\n\
         Total: 25.5 EUR\n\
         Gift wrapped\n\
         Ref: ACME-{order_id}"
    );
}

#[test]
fn one_broken_formula_leaves_the_rest_alone() {
    let values = bindings(&[("a", "2".into()), ("b", "3".into())]);
    assert_eq!(
        render("x={= a + b}; y={= a +}; z={= (a + b) * 2}", &values),
        "x=5; y=[Formula Error: a +]; z=10"
    );
}

#[test]
fn formula_text_is_never_executed() {
    let values = ValueBindings::new();
    assert_eq!(
        render("{= constructor.constructor(\"return process\")()}", &values),
        "[Formula Error: constructor.constructor(\"return process\")()]"
    );
}

#[test]
fn toggle_defaults() {
    let text = "{formtoggle: name=ok}";
    assert_eq!(render(text, &bindings(&[("ok", true.into())])), "Yes");
    assert_eq!(render(text, &bindings(&[("ok", "on".into())])), "Yes");
    assert_eq!(render(text, &bindings(&[("ok", "".into())])), "");
}

#[test]
fn nested_braces_in_attributes_keep_first_brace_boundary() {
    let text = "{formtoggle: name=t; truetext={= 1 + 1}; falsetext=no}";
    let values = bindings(&[("t", true.into())]);
    // The field ends at the first `}`; its truetext and the leftover tail
    // then read as one formula that does not evaluate.
    assert_eq!(render(text, &values), "[Formula Error: 1 + 1; falsetext=no]");
}

#[test]
fn unresolved_variable_passes_through() {
    assert_eq!(render("{missing}", &ValueBindings::new()), "{missing}");
}
