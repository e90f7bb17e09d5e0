pub mod channel;
pub mod codec;
pub mod hsb;
pub mod new_image;
pub mod pixel_source;
