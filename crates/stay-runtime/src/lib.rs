//! Execution side of Stay: the Capability Bridge handed to each running
//! script, and the Injection Dispatcher that decides which scripts run on a
//! page and in what order.
//!
//! The host supplies the collaborators: a [`ScriptStore`], a
//! [`transport::Transport`] for network calls, a [`host::Document`] per
//! page, optionally a [`host::TabOpener`], and a [`dispatch::ScriptEngine`]
//! that evaluates script bodies.
//!
//! [`ScriptStore`]: stay_core::store::ScriptStore

pub mod bridge;
pub mod capability;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod menu;
pub mod transport;

#[cfg(test)]
mod fakes;

pub use bridge::{Bridge, BridgeFactory, BridgeOptions, PageContext, RuntimeInfo, ScriptInfo};
pub use dispatch::{
  DispatchHandle, DispatchReport, DispatchState, Dispatcher, ScriptEngine, ScriptOutcome,
};
pub use error::{CapabilityError, Error, Result, ScriptExecutionError, ScriptFailure};
