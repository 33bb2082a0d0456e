pub mod capture;
pub mod worker;
