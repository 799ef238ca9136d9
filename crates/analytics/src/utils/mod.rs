pub mod stats;
pub mod time_utils;
