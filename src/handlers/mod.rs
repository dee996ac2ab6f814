mod api;
mod health;

pub use api::{echo, status};
pub use health::health_check;
