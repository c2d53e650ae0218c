//! Privilege broker: acquires a short-lived sudo credential through a single
//! outstanding prompt and runs privileged argv with it piped on stdin.

pub mod broker;
pub mod credential;
pub mod prompt;

pub use broker::{running_as_root, PrivilegeBroker, PrivilegeError};
pub use credential::Credential;
pub use prompt::{HelperPrompt, SecretPrompt, TerminalPrompt};
