pub mod identity;
pub mod orders;
pub mod events;
pub mod error;

pub use identity::*;
pub use orders::*;
pub use events::*;
pub use error::*;
