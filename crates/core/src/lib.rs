pub mod condition;
pub mod config;
pub mod contacts;
pub mod duration;
pub mod error;
pub mod reading;

pub use condition::*;
pub use config::{Config, Thresholds};
pub use contacts::{ContactList, PhoneNumber};
pub use duration::parse_duration;
pub use error::*;
pub use reading::*;
