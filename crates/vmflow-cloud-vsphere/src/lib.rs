//! vSphere REST client for vmflow
//!
//! Implements the tagging side of the management endpoint (`TaggingApi` and
//! `TaggingConnector` from `vmflow-cloud`) over the `/rest` session API with
//! `reqwest`, plus a credential check used by the `vmflowd check-auth`
//! command.
//!
//! # Example
//!
//! ```ignore
//! use vmflow_cloud_vsphere::VsphereProvider;
//!
//! let provider = VsphereProvider::new(endpoint, "administrator@vsphere.local", password);
//! let auth = provider.check_auth().await;
//! if !auth.authenticated {
//!     eprintln!("Not authenticated: {:?}", auth.error);
//! }
//! ```

pub mod error;
pub mod provider;
pub mod rest;

pub use error::{Result, VsphereError};
pub use provider::VsphereProvider;
pub use rest::{RestClient, RestConnector};
