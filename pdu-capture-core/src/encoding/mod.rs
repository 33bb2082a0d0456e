pub mod binary;
pub mod encoder;
pub mod schema;
