pub mod agent;
pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod provider;
pub mod session;
pub mod tool;
pub mod workpaper;

pub use error::{AssistantError, Result};
