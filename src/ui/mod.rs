//! Terminal output helpers

pub mod context;
pub mod output;
pub mod progress;

pub use context::UiContext;
pub use progress::TaskSpinner;
