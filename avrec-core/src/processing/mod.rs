pub mod pcm;
pub mod presentation_clock;
