//! Sample packing and rate conversion

pub mod pcm;
pub mod resampler;

pub use resampler::{CodecDirection, RateConverter};
