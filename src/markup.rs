//! Occurrence matching for the three brace constructs of the markup:
//!
//! - fields: `{formtext: name=client; label=Client}`
//! - formulas: `{= qty * price}`
//! - bare variables: `{client}`
//!
//! Every construct runs from an opening `{` to the first `}` after it; braces
//! do not nest. Matching goes left to right without overlap, and a `{` that
//! does not open a match is skipped by a single character so a later `{`
//! inside the failed candidate still gets its chance.

use std::marker::PhantomData;
use std::ops::Range;

use crate::models::FieldKind;

/// A construct recognised between an opening `{` and the first `}` after it.
pub trait Occurrence<'a>: Sized {
    /// Tries to match the construct opened at byte `open` and closed at byte
    /// `close`, the first `}` after `open`.
    fn match_at(text: &'a str, open: usize, close: usize) -> Option<Self>;

    fn span(&self) -> Range<usize>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMatch<'a> {
    pub span: Range<usize>,
    pub kind: FieldKind,
    /// Raw text between the `:` and the closing brace.
    pub attributes: &'a str,
}

impl<'a> FieldMatch<'a> {
    pub fn attribute(&self, key: &str) -> Option<&'a str> {
        attribute(self.attributes, key)
    }

    /// Field name, or the positional `field_<index>` when none is given.
    pub fn name_or_positional(&self, index: usize) -> String {
        match self.attribute("name") {
            Some(name) => name.to_string(),
            None => format!("field_{index}"),
        }
    }
}

impl<'a> Occurrence<'a> for FieldMatch<'a> {
    fn match_at(text: &'a str, open: usize, close: usize) -> Option<Self> {
        let inner = &text[open + 1..close];
        let (kind, attributes) = FieldKind::ALL.into_iter().find_map(|kind| {
            let attributes = inner.strip_prefix(kind.keyword())?.strip_prefix(':')?;
            Some((kind, attributes))
        })?;
        if attributes.is_empty() {
            return None;
        }
        Some(FieldMatch {
            span: open..close + 1,
            kind,
            attributes,
        })
    }

    fn span(&self) -> Range<usize> {
        self.span.clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormulaMatch<'a> {
    pub span: Range<usize>,
    /// Raw text between `{=` and the closing brace.
    pub body: &'a str,
}

impl<'a> FormulaMatch<'a> {
    pub fn expression(&self) -> &'a str {
        self.body.trim()
    }
}

impl<'a> Occurrence<'a> for FormulaMatch<'a> {
    fn match_at(text: &'a str, open: usize, close: usize) -> Option<Self> {
        let body = text[open + 1..close].strip_prefix('=')?;
        if body.is_empty() {
            return None;
        }
        Some(FormulaMatch {
            span: open..close + 1,
            body,
        })
    }

    fn span(&self) -> Range<usize> {
        self.span.clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableMatch<'a> {
    pub span: Range<usize>,
    pub name: &'a str,
}

impl<'a> Occurrence<'a> for VariableMatch<'a> {
    fn match_at(text: &'a str, open: usize, close: usize) -> Option<Self> {
        // Stop at the first non-word character so runs of unmatched `{`
        // are not rescanned up to the closing brace each time.
        let rest = &text[open + 1..];
        let name_len = rest
            .char_indices()
            .find(|(_, ch)| !is_word_char(*ch))
            .map_or(rest.len(), |(offset, _)| offset);
        if name_len == 0 || open + 1 + name_len != close {
            return None;
        }
        Some(VariableMatch {
            span: open..close + 1,
            name: &rest[..name_len],
        })
    }

    fn span(&self) -> Range<usize> {
        self.span.clone()
    }
}

/// Left-to-right, non-overlapping matches of `M` in a text.
pub struct Occurrences<'a, M> {
    text: &'a str,
    cursor: usize,
    close: Option<usize>,
    _marker: PhantomData<M>,
}

impl<'a, M: Occurrence<'a>> Iterator for Occurrences<'a, M> {
    type Item = M;

    fn next(&mut self) -> Option<M> {
        loop {
            let open = self.cursor + self.text.get(self.cursor..)?.find('{')?;
            let close = match self.close {
                Some(close) if close > open => close,
                _ => {
                    let Some(offset) = self.text[open..].find('}') else {
                        self.cursor = self.text.len();
                        return None;
                    };
                    let close = open + offset;
                    self.close = Some(close);
                    close
                }
            };
            if let Some(found) = M::match_at(self.text, open, close) {
                self.cursor = found.span().end;
                return Some(found);
            }
            self.cursor = open + 1;
        }
    }
}

pub fn occurrences<'a, M: Occurrence<'a>>(text: &'a str) -> Occurrences<'a, M> {
    Occurrences {
        text,
        cursor: 0,
        close: None,
        _marker: PhantomData,
    }
}

/// Rebuilds `text`, letting `replace` write the substitute for every match of
/// `M` while the text between matches is copied through unchanged.
pub fn replace_all<'a, M, F>(text: &'a str, mut replace: F) -> String
where
    M: Occurrence<'a>,
    F: FnMut(&M, &mut String),
{
    let mut output = String::with_capacity(text.len());
    let mut copied = 0;
    for found in occurrences::<M>(text) {
        let span = found.span();
        output.push_str(&text[copied..span.start]);
        replace(&found, &mut output);
        copied = span.end;
    }
    output.push_str(&text[copied..]);
    output
}

/// Value of `key` in a `;`-separated attribute list. The first pair starting
/// with `key=` and carrying a non-empty value wins.
pub fn attribute<'a>(attributes: &'a str, key: &str) -> Option<&'a str> {
    attributes.split(';').find_map(|pair| {
        let value = pair.trim_start().strip_prefix(key)?.strip_prefix('=')?.trim();
        (!value.is_empty()).then_some(value)
    })
}

pub(crate) fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}
