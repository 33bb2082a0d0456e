pub mod capture_delegate;
pub mod packet_filter;
pub mod packet_source;
