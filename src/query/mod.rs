//! Query Construction
//!
//! Everything needed to turn a [`Target`] and a [`TimeWindow`] into backend
//! requests, without touching the network.
//!
//! ## Modules
//!
//! - **model**: targets, windows and request shapes
//! - **expr**: selector/regex extraction and escaping
//! - **template**: template variable interpolation seam
//! - **builder**: range, instant, legacy and live-tail builders
//! - **context**: look-around queries for a single log row

mod builder;
mod context;
mod expr;
mod model;
mod template;

pub use builder::{QueryBuilder, DEFAULT_MAX_LINES};
pub use context::{ContextQuery, ContextRow, CONTEXT_BUFFER_NS, DEFAULT_CONTEXT_LIMIT};
pub use expr::{
    escape_regex, parse_query, regular_escape, special_regex_escape, ParsedQuery,
};
pub use model::{
    Direction, InstantQueryRequest, LegacyQueryRequest, LiveKey, LiveTarget, QueryMode,
    RangeQueryRequest, Target, TimeRange, TimeWindow, INSTANT_QUERY_PATH, LEGACY_QUERY_PATH,
    LEGACY_TAIL_PATH, RANGE_QUERY_PATH, TAIL_PATH,
};
pub use template::{
    interpolate_query_expr, NoopTemplates, ScopedVars, TemplateEngine, Variable, VariableTemplates,
    VariableValue,
};
