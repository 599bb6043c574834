pub mod encoder;
pub mod profile;
