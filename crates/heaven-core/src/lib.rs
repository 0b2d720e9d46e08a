//! Core of Heaven: the identity directory, the pending-authorization gate
//! and the admission logic tying them together.
//!
//! HTTP, Discord and SQLite live in their own crates and plug in through
//! [`prompt::Prompter`] and [`store::DirectoryStore`].

// Impls use native `async fn`; the traits spell out the `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod admission;
pub mod directory;
pub mod error;
pub mod gate;
pub mod identity;
pub mod prompt;
pub mod registration;
pub mod store;

pub use error::{Error, Result};
