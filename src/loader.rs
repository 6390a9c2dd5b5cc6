pub mod ast;
pub mod loader;
