pub mod constants;
pub mod frame;
pub mod session_config;
