//! Chat completion and embedding wire types

mod embedding;
mod request;
mod response;

pub use embedding::*;
pub use request::*;
pub use response::*;
