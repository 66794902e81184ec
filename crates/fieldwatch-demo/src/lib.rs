#![forbid(unsafe_code)]

//! Fieldwatch demo
//!
//! A headless username form validated live as the user types: an async
//! availability check against a slow user repository, plus synchronous
//! character rules, both driven by one validator set.
//!
//! # Key Components
//!
//! - [`form::LoginForm`] - Validators, observers and the trigger policy
//! - [`repository::UserRepository`] - Mock user store with interruptible latency
//! - [`widgets`] - Display elements the observers update
//! - [`cli::Opts`] - Command-line and environment options

pub mod cli;
pub mod form;
pub mod repository;
pub mod widgets;
