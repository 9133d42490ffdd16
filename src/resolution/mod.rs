pub mod document;
pub mod parser;
pub mod resolver;
pub mod transformer;
