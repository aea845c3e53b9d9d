pub mod span;

pub mod error;

pub mod intern;

#[macro_use]
pub mod token;

pub mod schema;
pub mod validate;

pub mod tree;
pub mod trivia;
pub mod visit;

pub mod print;
