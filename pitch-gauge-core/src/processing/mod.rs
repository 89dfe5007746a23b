pub mod autocorrelation;
pub mod estimator;
pub mod meter;
pub mod musical;
pub mod ring_buffer;
