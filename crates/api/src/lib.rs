pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
pub mod stream;

pub use auth::*;
pub use error::*;
pub use routes::*;
pub use state::*;
