//! Redirects a designated set of on-disk files into records stored inside a
//! per-directory embedded SQLite database, preserving POSIX-like byte-stream
//! semantics (random access, growth via zero-padding, truncate, delete).
//!
//! Three cooperating pieces, leaves first:
//! - [`esew`] — connection lifecycle and blob streaming over a single SQLite
//!   file.
//! - [`savedb`] — one database per containing directory, bundling the six
//!   operations a virtual file needs.
//! - [`handler`] — the state machine: directory map, cursor map, and the
//!   [`interfaces::OSCallHandler`] implementation.
//!
//! How OS calls actually reach [`handler::CallHandler`] is out of scope —
//! this crate only defines the boundary traits in [`interfaces`] and
//! implements the inbound side of it.

pub mod config;
pub mod error;
pub mod esew;
pub mod fileops;
pub mod handler;
pub mod interfaces;
pub mod policy;
pub mod savedb;

pub use config::Config;
pub use error::{Error, Result};
pub use handler::CallHandler;
pub use interfaces::{FileAttribute, FileInfo, FileIntent, FileOps, FileTimes, OSCallHandler, SeekFrom};

/// Installs a `tracing-subscriber` `fmt` layer driven by `RUST_LOG` (or
/// whatever `EnvFilter::from_default_env` resolves). Safe to call more than
/// once; later calls are no-ops.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    });
}
