//! # Settings controllers
//!
//! A chain of delegated controllers that may supply or rewrite individual
//! component properties before the locally stored value is used. Keys are
//! `component.property`; each key carries read-only [`SettingTag`]s.
//!
//! The first controller answering anything other than `Inapplicable` wins.
//! `Resolved(None)` means "use the default value", not the local one.
mod controller;
mod descriptor;

pub use controller::{DelegatedSettingsController, GetResult, SetResult, SettingsController};
pub use descriptor::{OldValueSupplier, PropertyDescriptor, SettingDescriptor, SettingTag};
