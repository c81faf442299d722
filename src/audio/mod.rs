pub mod decoder;
pub mod encoder;
pub mod resample;
pub mod voice_activity;

pub use decoder::decode_audio;
pub use encoder::write_wav;
