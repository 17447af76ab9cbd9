mod health_check;
mod uploads;
pub use health_check::*;
pub use uploads::*;
