pub mod gauge_frame;
pub mod log_gauge;
pub mod sweep;
