//! `relaychat`: terminal chat client with delegated end-to-end encryption
//! for private messages.

pub mod cache;
pub mod chat;
pub mod config;
pub mod console;
pub mod crypto;
pub mod files;
pub mod net;
pub mod orchestrator;
pub mod transport;
