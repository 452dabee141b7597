pub mod metadata;
pub mod track_file_writer;
