//! Keyword relay: forwards chat messages that match a keyword policy to one channel.

pub mod channels;
pub mod config;
pub mod error;
pub mod relay;
