//! Credential models: the bearer access token and the client secret that authorizes renewals.

pub mod client_secret;
pub mod token;

pub use client_secret::*;
pub use token::*;
