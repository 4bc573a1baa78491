pub mod analytics;
pub mod error;
pub mod grading;
pub mod model;
pub mod session;
pub mod validate;
