//! Configuration types for devpack.
//!
//! - [`BuildConfig`]: what the compiler builds (entries, plugins, output)
//! - [`EntryItem`]: a source module or the hot-update client
//! - [`DevModuleOptions`]: knobs of the development module, loadable from TOML

pub mod build;
pub mod entry;
pub mod error;
pub mod module;

pub use build::*;
pub use entry::*;
pub use error::*;
pub use module::*;
