pub mod gauge_output;
pub mod pcm_device;
