//! Shared wire formats for `RelayChat`.
//!
//! Two frame classes travel over the same connection: broadcast text
//! frames ([`global`], JSON) and private binary envelopes ([`private`],
//! postcard). The private envelope's `content` is ciphertext produced by an
//! external provider; this crate never inspects it.

pub mod codec;
pub mod global;
pub mod private;
