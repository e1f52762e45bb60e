pub mod document;
pub mod prescription;
pub mod summary;

pub use document::*;
pub use prescription::*;
pub use summary::*;
