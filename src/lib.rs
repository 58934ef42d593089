pub mod ast;
pub mod ast_printer;
pub mod config;
pub mod debug;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod natives;
pub mod parser;
pub mod reporter;
pub mod scanner;
pub mod session;
pub mod stack;
pub mod token;
pub mod value;
