pub mod document;
pub mod parser;
pub mod publish;

pub use document::{ConfigDocument, build_config};
pub use parser::router_id_from_existing_config;
