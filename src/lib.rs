#![allow(
    clippy::let_unit_value,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::semicolon_if_nothing_returned,
    clippy::used_underscore_binding
)]
#![deny(
    clippy::all,
    clippy::missing_const_for_fn,
    clippy::pedantic,
    future_incompatible,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    unsafe_code,
    unused
)]
#![doc = include_str!("../README.md")]

pub mod close;
pub mod codec;
pub mod compression;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod payloads;
pub mod session;
pub mod ws;

pub use self::{
    config::ConnectionConfig,
    connection::Connection,
    event::{Event, EventTypeFlags},
    payloads::Intents,
};

/// Discord API version this crate speaks.
pub const API_VERSION: u8 = config::API_VERSION;
