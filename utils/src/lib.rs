mod json;
mod logging;
mod time;

pub use json::{is_json_equivalent, json_mismatch};
pub use logging::{parse_level_filter, setup_logging};
pub use time::get_timestamp;
