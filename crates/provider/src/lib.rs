// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jv-provider: Supervised agent subprocesses speaking a line-delimited
//! event protocol.

mod command;
mod event;
mod kill;
mod supervisor;

pub use command::{resolve_provider, ProviderCommand, ResolutionSource};
pub use event::{parse_line, ProviderEvent, SupervisorEvent};
pub use supervisor::{
    spawn, ProviderError, RunOutcome, RunTelemetry, RunningProvider, SupervisorConfig, TimeoutKind,
};
