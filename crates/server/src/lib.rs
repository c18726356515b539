pub mod api;
pub mod metrics;
pub mod runtime;
pub mod state;

pub use api::create_router;
pub use runtime::{build_store, Collaborators, Runtime};
pub use state::AppState;
