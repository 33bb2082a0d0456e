pub mod file;
pub mod scripted;
