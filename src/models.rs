use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Field name to user-supplied value.
pub type ValueBindings = BTreeMap<String, FieldValue>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    #[serde(rename = "formtext")]
    SingleLineText,
    #[serde(rename = "formparagraph")]
    MultiLineText,
    #[serde(rename = "formtoggle")]
    Toggle,
    #[serde(rename = "formdropdown")]
    Dropdown,
}

impl FieldKind {
    pub const ALL: [FieldKind; 4] = [
        FieldKind::SingleLineText,
        FieldKind::MultiLineText,
        FieldKind::Toggle,
        FieldKind::Dropdown,
    ];

    /// Markup keyword that opens a field of this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            FieldKind::SingleLineText => "formtext",
            FieldKind::MultiLineText => "formparagraph",
            FieldKind::Toggle => "formtoggle",
            FieldKind::Dropdown => "formdropdown",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.keyword() == keyword)
    }
}

/// A bound value: free text, or the state of a toggle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Text(String),
}

impl FieldValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Flag(flag) => *flag,
            FieldValue::Text(text) => !text.is_empty(),
        }
    }

    /// Numeric reading used inside formulas. Text yields its leading decimal
    /// literal, or 0 when it has none.
    pub fn as_number(&self) -> f64 {
        match self {
            FieldValue::Flag(true) => 1.0,
            FieldValue::Flag(false) => 0.0,
            FieldValue::Text(text) => parse_leading_number(text).unwrap_or(0.0),
        }
    }

    /// Text placed where a field declaration stood. An unset toggle leaves
    /// nothing behind.
    pub fn field_text(&self) -> &str {
        match self {
            FieldValue::Flag(true) => "true",
            FieldValue::Flag(false) => "",
            FieldValue::Text(text) => text,
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Text(String::new())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Flag(flag) => write!(f, "{flag}"),
            FieldValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    /// Position among the fields of the scanned text, starting at 0.
    pub index: usize,
    pub kind: FieldKind,
    pub name: String,
    pub label: Option<String>,
    pub default_value: FieldValue,
    pub options: Vec<String>,
    pub required: bool,
    pub true_text: Option<String>,
    pub false_text: Option<String>,
}

impl FieldDeclaration {
    /// Label shown to the user, falling back to the field name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Value a fresh form starts with.
    pub fn initial_value(&self) -> FieldValue {
        match (self.kind, &self.default_value) {
            (FieldKind::Toggle, value) => FieldValue::Flag(value.is_truthy()),
            (_, value) => value.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaDeclaration {
    pub index: usize,
    pub expression: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub fields: Vec<FieldDeclaration>,
    pub formulas: Vec<FormulaDeclaration>,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.formulas.is_empty()
    }

    /// One declaration per field name, keeping the first occurrence.
    pub fn unique_fields(&self) -> Vec<&FieldDeclaration> {
        let mut unique: Vec<&FieldDeclaration> = Vec::new();
        for field in &self.fields {
            if unique.iter().any(|seen| seen.name == field.name) {
                continue;
            }
            unique.push(field);
        }
        unique
    }

    /// Bindings a form starts from. When a name is declared more than once,
    /// the last declaration's default is the one kept.
    pub fn initial_bindings(&self) -> ValueBindings {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.initial_value()))
            .collect()
    }

    /// Whether any declaration of `name` is marked required.
    pub fn is_required(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|field| field.name == name && field.required)
    }

    /// Required fields (one per name) whose bound value is missing or falsy.
    /// A name counts as required when any of its declarations is.
    pub fn missing_required<'a>(&'a self, values: &ValueBindings) -> Vec<&'a FieldDeclaration> {
        self.unique_fields()
            .into_iter()
            .filter(|field| self.is_required(&field.name))
            .filter(|field| !values.get(&field.name).is_some_and(FieldValue::is_truthy))
            .collect()
    }
}

/// Longest leading decimal literal of `text` (after leading whitespace),
/// with optional sign, fraction and exponent.
pub(crate) fn parse_leading_number(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_digits = count_digits(&bytes[end..]);
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = count_digits(&bytes[end + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = count_digits(&bytes[exp_end..]);
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }

    text[..end].parse::<f64>().ok()
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|byte| byte.is_ascii_digit()).count()
}
