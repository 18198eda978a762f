pub mod connection;
pub mod consumer;
pub mod decoder;
pub mod error;
pub mod message;
pub mod registry;
pub mod session;

pub use connection::*;
pub use consumer::*;
pub use decoder::*;
pub use error::*;
pub use message::*;
pub use registry::*;
pub use session::*;
