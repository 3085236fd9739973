//! # Credexa (Authentication & Session Tracking)
//!
//! `credexa` is the authentication backbone of the Credexa application.
//! It issues one bearer-token identity across five credential paths and
//! tracks the sessions they produce.
//!
//! ## Credential Paths
//!
//! - **Password + OTP:** registration is held as a pending signup until a
//!   six-digit emailed code is verified; every password login requires a
//!   second-factor code. Codes live for ten minutes and resends are
//!   throttled.
//! - **OAuth delegation:** Google, GitHub, Discord, and LinkedIn via the
//!   authorization-code flow. A single `mode` flag (round-tripped through
//!   the provider's opaque `state`) selects login-vs-signup policy: login
//!   never creates accounts, signup creates a verified account from the
//!   normalized provider profile.
//! - **Wallet signature:** a one-time nonce challenge signed by the
//!   wallet proves control of an address; accounts are keyed by the
//!   lowercased address.
//!
//! ## Sessions
//!
//! Every successful credential exchange records a session with parsed
//! device metadata. Logins from an unseen (IP, device) pair trigger a
//! best-effort notification email, gated by the user's settings. Sessions
//! can be listed, terminated individually or in bulk, and are swept once
//! expired.

pub mod api;
pub mod cli;

pub use api::APP_USER_AGENT;
