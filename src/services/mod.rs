pub mod cache;
pub mod discovery;
pub mod recommendations;
pub mod token_resolver;
