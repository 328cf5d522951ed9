pub mod backend;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod feed;
pub mod invoker;
pub mod logging;
pub mod settings;
pub mod store;
pub mod triggers;
pub mod worker;
