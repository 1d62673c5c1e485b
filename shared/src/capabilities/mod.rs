//! Capabilities the core asks the shell to perform.
//!
//! The core never talks to the network or the disk itself. It requests an
//! `Http`, `KeyValue` or `Render` effect and receives the outcome as a later
//! `Event`. The executors shells use to fulfil those effects live here too.

mod http;
mod session;

#[cfg(not(target_arch = "wasm32"))]
mod sqlite_kv;

pub use crux_core::render::Render;
pub use crux_http::Http;
pub use crux_kv::KeyValue;

pub use self::http::{validate_base_url, HttpError, PostgrestClient};
pub use self::session::DriverIdentity;

#[cfg(not(target_arch = "wasm32"))]
pub use self::sqlite_kv::SqliteKv;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub key_value: KeyValue<Event>,
    pub render: Render<Event>,
}
