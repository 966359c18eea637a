//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProbeConfig (defaults for the command line)
//!
//! command-line target
//!     → target.rs (Target / Endpoint / ProxyConfig)
//!     → validation.rs (request parameter checks)
//!     → fully resolved request handed to http / websocket
//! ```
//!
//! # Design Decisions
//! - The core only receives fully resolved values; nothing here opens sockets
//! - All file fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod target;
pub mod validation;

pub use schema::ObservabilityConfig;
pub use schema::ProbeConfig;
pub use target::{Endpoint, ProxyConfig, Scheme, Target};
