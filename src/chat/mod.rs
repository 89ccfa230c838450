// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session management
//!
//! Request composition, stream consumption, and the session that ties them
//! together with the dispatcher and the search tool.

pub mod compose;
pub mod locale;
pub mod session;
pub mod streaming;

pub use compose::{compose, normalize, ComposedRequest, RequestParams, ToolResult};
pub use locale::Language;
pub use session::{ChatSession, ChatSessionBuilder, SessionObserver, SessionOptions, SubmitOutcome};
pub use streaming::{SettleReason, Settlement, StreamConfig, StreamConsumer, StreamOutcome};
