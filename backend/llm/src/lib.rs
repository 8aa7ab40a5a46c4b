pub mod gateway;
pub mod providers;

pub use gateway::{Availability, GenerationDefaults, GenerationGateway};
