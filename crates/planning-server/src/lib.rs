//! The HTTP surface for Planning Explorer (§6, C9): route handlers, the
//! `{success, data|error, meta?}` envelope, and the §9 startup sequence that
//! wires every other crate in the workspace into one [`state::AppState`].

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod startup;
pub mod state;

pub use server::ApiServer;
pub use state::AppState;
