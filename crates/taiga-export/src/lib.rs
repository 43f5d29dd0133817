//! LUCI scorecard export for persisted decision forests.
//!
//! Renders a compressed model into the line-oriented LUCI record format
//! consumed by the downstream scoring engine. Consumes only the public
//! node/model API of `taiga-forest`; field names come from per-scorecard
//! translation tables, and a missing translation for a branch node fails
//! the export instead of emitting a sentinel.

mod error;
mod luci;
mod scorecard;

pub use error::ExportError;
pub use luci::{export_model, write_model};
pub use scorecard::Scorecard;
