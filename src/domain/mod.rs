pub mod destination;
pub mod request;
pub mod state;
pub mod target;

pub use destination::*;
pub use request::*;
pub use state::*;
pub use target::*;
