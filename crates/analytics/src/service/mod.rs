//! Analytics service facade.
//!
//! Loads prices and holdings through repository traits and drives the analytics
//! components for each request.

mod analytics_model;
mod analytics_service;
mod analytics_traits;

pub use analytics_model::*;
pub use analytics_service::*;
pub use analytics_traits::*;
