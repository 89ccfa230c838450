// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tools the session can run before answering

pub mod search;

pub use search::{SearchHit, SearchRequest, SearchResponse, TavilyClient, WebSearch};
