pub mod client;
pub mod errors;
pub mod executor;
pub mod models;
pub mod orchestrator;
pub mod prompt_template;
pub mod providers;
pub mod registry;
pub mod session;
pub mod testrail;
pub mod transport;
