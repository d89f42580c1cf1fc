//! The runtime core: one transactional operation per CLI invocation,
//! coordinated across invocations only through the on-disk state store and
//! signals to the proxy process.

mod create;
mod delete;
mod kill;
mod start;
mod state;

pub use create::create;
pub use delete::delete;
pub use kill::{kill, parse_signal};
pub use start::start;
pub use state::state;
