pub mod buffer_writer;
pub mod dissect;
