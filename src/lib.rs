pub mod config;
pub mod extract;
pub mod jobs;
pub mod locator;
pub mod logging;
pub mod process;
pub mod runner;
pub mod schema;
pub mod session;
pub mod summary;
