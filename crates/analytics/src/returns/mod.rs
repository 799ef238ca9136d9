//! Return series construction and alignment.

mod returns_builder;
mod returns_model;

pub use returns_builder::*;
pub use returns_model::*;
