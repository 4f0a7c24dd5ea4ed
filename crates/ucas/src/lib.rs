//! UCAS account sign-in and Track status client.
//!
//! Sign-in runs the provider's four-step cookie/token exchange ([`auth`]),
//! producing a cookie string that authenticates the Track status query
//! ([`track`]).

pub mod auth;
pub mod client;
pub mod session;
pub mod track;

pub use client::{BROWSER_UA, default_client};
pub use session::AccountSession;
