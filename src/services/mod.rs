pub mod discovery;
pub mod markup;
pub mod notifier;
pub mod session_client;
pub mod state_store;
pub mod watcher;

pub use discovery::*;
pub use notifier::*;
pub use session_client::*;
pub use state_store::*;
pub use watcher::*;
