//! relgen-cli: command-line front end
//!
//! - `config`: layered configuration (defaults, YAML, `RELGEN_` env vars)
//! - `logging`: tracing subscriber setup
//! - `schema`: DSL and JSON schema loading
//! - `report`: inventory and explain output

pub mod config;
pub mod logging;
pub mod report;
pub mod schema;

pub use config::{ConfigLoadError, RelgenConfig};
pub use logging::{init_logging, LoggingConfig};
pub use report::OutputFormat;
pub use schema::load_schema;
