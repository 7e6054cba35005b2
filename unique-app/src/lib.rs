//! Single-instance applications
//!
//! The first instance of an application claims its id in a registration
//! namespace and becomes the primary instance. Later instances lose the
//! claim and forward their activation, files or whole command line to the
//! primary, then exit. A forwarded command line blocks the invoking instance
//! until the primary reports an exit status for it.
mod api;
mod app_id;
mod application_impl;
mod command_line;
pub mod dbus;
mod dispatcher;
mod error;
mod file_ref;
mod invoker;
pub mod local;
mod platform_data;
mod registration;
pub use api::*;
pub use app_id::*;
pub use application_impl::*;
pub use command_line::CommandLine;
pub use command_line::CommandLineSession;
pub use dispatcher::*;
pub use error::*;
pub use file_ref::*;
pub use invoker::*;
pub use platform_data::*;
pub use registration::*;
