//! Browser automation engine over the Chrome debugging protocol.
//!
//! Drives a locally installed Chrome-family browser through its remote
//! debugging endpoint: launch and supervise the process, attach to the
//! page of interest, locate elements through ordered selector candidates,
//! and perform the clicks, fills, and key presses a publishing flow needs.
//! Sessions ride on persistent per-platform profiles so logins survive
//! between runs.

pub mod actions;
pub mod cdp;
pub mod error;
pub mod launch;
pub mod poller;
pub mod retry;
pub mod script;
pub mod selector;
pub mod session;

#[cfg(test)]
mod testutil;

pub use cdp::{CdpConnection, ListenerId};
pub use error::{EngineError, Result};
pub use launch::{Browser, TargetInfo};
pub use poller::{PollState, Poller};
pub use selector::{try_selectors, ResolveOptions, SelectorMatch};
pub use session::{get_page_session, PageSession};
