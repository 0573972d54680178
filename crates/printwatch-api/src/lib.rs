// printwatch-api: Async clients for the hub event stream and the push transport

pub mod error;
pub mod hub;
pub mod push;
pub mod transport;

pub use error::Error;
