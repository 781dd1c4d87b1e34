//! Time handling for query compilation
//!
//! - **interval**: `<integer><unit>` duration strings
//! - **datemath**: relative/absolute date expressions
//! - **context**: range bounds and bucket interval in epoch seconds

pub mod context;
pub mod datemath;
pub mod interval;

pub use context::{convert_timestamp, round, DateInput, TimeContext, TimeRange, NOW};
pub use datemath::{DateMath, DateResolver, DateUnit};
pub use interval::{convert_interval, Interval, IntervalUnit};
