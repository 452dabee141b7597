pub mod audio;
pub mod encoder;
pub mod muxer;
pub mod recorder;
pub mod video;
