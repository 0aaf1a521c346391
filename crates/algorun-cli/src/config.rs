//! Pipeline configuration: the TOML file model, built-in defaults and the merge of
//! command-line overrides into an [`AppConfig`].

mod builder;
mod defaults;
mod file;
pub mod models;

pub use builder::build_config;
pub use models::AppConfig;
