//! Core pipeline for ChainVault.
//!
//! Content is addressed by the SHA-256 of its bytes, cut into fixed-size
//! fragments, and every fragment is sealed on its own with XChaCha20-Poly1305.
//! Retrieval stitches whatever fragments are reachable back together and
//! accepts the result only if it hashes to the original address. There is no
//! redundancy: losing a fragment means losing the content.
//!
//! * [`hash`]: content addressing.
//! * [`crypto`]: the per-fragment cipher and its key.
//! * [`fragment`]: fixed-window fragmentation.
//! * [`reassemble`]: ordering, decryption and legacy decode of fragments.
//! * [`verify`]: whole-content integrity check.
//! * [`availability`]: which fragments count as reachable, with optional
//!   failure injection.
//! * [`trust`]: penalties for parties that failed to serve fragments.
//!
//! [`content`], [`codec`], [`merkle`] and [`audit`] cover the content record,
//! the base64 transport form, the fragment commitment and a per-fragment
//! health check.

pub mod audit;
pub mod availability;
pub mod codec;
pub mod content;
pub mod crypto;
pub mod fragment;
pub mod hash;
pub mod merkle;
pub mod reassemble;
pub mod trust;
pub mod verify;

mod error;

pub use error::VaultError;
