pub mod error;
pub mod session;
pub mod slot;
pub mod state;

pub use error::*;
pub use session::*;
pub use slot::*;
pub use state::*;
