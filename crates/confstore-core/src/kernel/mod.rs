//! # Kernel
//!
//! The `kernel` module holds what every other module leans on:
//!
//! - **Bootstrapping**: [`Application`](bootstrap::Application) owns the
//!   application-scope store and opens project and module stores.
//! - **Lifecycle**: the [`KernelComponent`](component::KernelComponent) trait
//!   implemented by store owners.
//! - **Constants**: macro names, default file specs and directory names.
//! - **Errors**: the crate-wide [`Error`](error::Error) and `Result` alias.
pub mod bootstrap;
pub mod component;
pub mod constants;
pub mod error;

pub use bootstrap::{Application, ApplicationServices};
pub use component::KernelComponent;
pub use error::{Error, Result};
