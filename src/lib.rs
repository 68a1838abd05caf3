//! Synchronous Bluetooth LE GATT client.
//!
//! Adapts an event-driven, callback-based GATT client stack into blocking
//! call/return operations: discover a peer's services, characteristics, and
//! descriptors, read and write attribute values, and subscribe to
//! notifications or indications. The radio stack itself is reached through
//! the [`host::Transport`] trait, and its asynchronous callbacks are fed
//! back in via [`gattc::Client::dispatch`].

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::exit)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::mod_module_files)]
#![warn(clippy::print_stdout)]
#![warn(clippy::str_to_string)]
#![warn(clippy::todo)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub mod att;
pub mod gattc;
pub mod host;
pub mod uuid;

mod util;

pub(crate) use util::*;
