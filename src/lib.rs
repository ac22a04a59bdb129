//! Reading tracker and social graph data layer.
//!
//! Services in [`services`] apply the domain rules (username reservation,
//! progress auto-completion, like counters, friendship symmetry) on top of a
//! [`store::DocumentStore`] and an [`identity::IdentityProvider`]. Both ports
//! are passed in explicitly; [`state::AppState`] wires everything together.

pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
