mod certificate;
mod checker;
mod classify;
mod client;
mod config;
mod error;

pub use certificate::*;
pub use checker::*;
pub use classify::*;
pub use client::*;
pub use config::*;
pub use error::*;
