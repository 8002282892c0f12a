pub mod capture;
pub mod ffmpeg;
pub mod media;
pub mod seek;
