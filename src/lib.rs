//! Snippet markup engine.
//!
//! Templates are free-form text with embedded dynamic fields and formulas:
//!
//! ```text
//! Hi {formtext: name=client; label=Client name},
//! your order of {formtext: name=qty; default=1} items costs {= qty * 4.5}.
//! {formtoggle: name=gift; truetext=Gift wrapping included.}
//! ```
//!
//! [`scan`] extracts the field and formula declarations so a host can build a
//! form; [`render`] substitutes the filled-in values and evaluates formulas.
//! Both are pure and total: malformed markup stays literal text and a broken
//! formula turns into an inline `[Formula Error: ...]` marker.

pub mod formula;
pub mod markup;
pub mod models;
pub mod renderer;
pub mod scanner;

pub use formula::{FormulaError, evaluate};
pub use models::{
    FieldDeclaration, FieldKind, FieldValue, FormulaDeclaration, ScanResult, ValueBindings,
};
pub use renderer::render;
pub use scanner::scan;
