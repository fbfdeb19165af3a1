pub mod ast;
pub mod parser;
pub mod matcher;
pub mod sort;
