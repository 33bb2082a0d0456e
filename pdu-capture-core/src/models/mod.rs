pub mod config;
pub mod error;
pub mod fill_result;
pub mod pdu;
pub mod state;
