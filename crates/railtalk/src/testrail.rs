//! The TestRail REST adapter: one tool call in, one HTTP request out
pub mod client;
pub mod routes;

pub use client::TestRailClient;
