//! Cached, self-healing sessions to the hypervisor management endpoint
//!
//! [`SessionCache::get_or_create`] returns a logged-in [`Session`] (management
//! API plus REST tagging API) for a `(server, datacenter, credential)` triple.
//! Dead sessions are logged out and replaced on the next call; optional
//! keepalive tasks evict a session as soon as a probe fails so that the next
//! caller re-authenticates.

pub mod cache;
pub mod error;
pub mod params;
pub mod session;

pub use cache::SessionCache;
pub use error::{Result, SessionError};
pub use params::{Credential, DEFAULT_KEEPALIVE_INTERVAL, Feature, Params, parse_server_url};
pub use session::Session;
