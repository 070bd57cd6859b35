pub mod modulator;
pub mod remix;
pub mod resampler;
pub mod tuning;
