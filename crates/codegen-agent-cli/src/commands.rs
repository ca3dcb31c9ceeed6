pub mod ask;
pub mod chat;
pub mod check_config;
pub mod tools;
