// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for chatline
//!
//! Message types, the model catalog, provider endpoints, and the
//! retrying request dispatcher.

pub mod dispatch;
pub mod message;
pub mod models;
pub mod provider;
pub mod retry;

pub use dispatch::{Completion, Dispatcher};
pub use message::*;
pub use provider::*;
pub use retry::RetryPolicy;
