pub mod codec;
pub mod event;
pub mod message;
pub mod transport;
