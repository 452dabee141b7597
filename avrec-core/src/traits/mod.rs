pub mod audio_input;
pub mod compressor;
pub mod container_writer;
pub mod frame_renderer;
pub mod listener;
pub mod time_source;
