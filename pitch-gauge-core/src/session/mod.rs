pub mod capture_engine;
pub mod tuner;

#[cfg(test)]
pub(crate) mod fake_device;
