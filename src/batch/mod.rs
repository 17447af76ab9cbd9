mod poller;
mod submit;
pub use poller::*;
pub use submit::*;
