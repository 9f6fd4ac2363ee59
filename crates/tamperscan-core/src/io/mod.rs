//! I/O utilities for blob handling.

pub mod hashing;

pub use hashing::HashingReader;
