pub mod config;
pub mod domain;
pub mod error;
pub mod flatten;
pub mod join;
pub mod layout;
pub mod location;
pub mod output;
pub mod pipeline;
pub mod proteins_api;
pub mod tabular;
pub mod variant;
