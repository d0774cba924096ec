pub mod conversations;
pub mod error;
pub mod extract;
pub mod messages;
pub mod reactions;
pub mod routes;
pub mod state;
pub mod users;

pub use routes::router;
pub use state::{AppState, AppStateInner};
