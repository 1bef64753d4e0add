pub mod analysis;
pub mod decode;
pub mod upload;
