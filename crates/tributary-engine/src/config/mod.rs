//! Project configuration: YAML model, parsing and semantic validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_project, parse_project_str, substitute_env_vars};
pub use types::ProjectConfig;
pub use validator::validate_project;
