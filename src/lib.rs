pub mod bot;
pub mod config;
pub mod irc;
pub mod store;
