//! CLI apps for cumulative case-count time series:
//! `column_delta` turns cumulative csv columns into row-over-row deltas,
//! `reaggregate_by_week` turns daily cumulative counts into weekly series.
pub mod column_delta;
pub mod error;
pub mod reaggregate_by_week;
pub mod utils;

pub use crate::column_delta::{delta_transform, ColumnSelection, DeltaTable};
pub use crate::error::{MalformedLineError, ParseError, ValidationMismatch};
pub use crate::reaggregate_by_week::{
    reaggregate, validate_lines, OutputMode, WeekConfig, WeeklySeries,
};

// constants
pub const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");
