// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Curated model catalog for the chat picker

/// Model selected when nothing else is configured
pub const DEFAULT_MODEL_ID: &str = "tngtech/deepseek-r1t-chimera:free";

/// Information about a selectable model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    /// Provider-qualified model identifier
    pub id: &'static str,
    /// Human-readable name
    pub display_name: &'static str,
    /// Organization that publishes the model
    pub provider: &'static str,
    pub description: &'static str,
}

const CATALOG: &[ModelInfo] = &[
    ModelInfo {
        id: DEFAULT_MODEL_ID,
        display_name: "DeepSeek R1T Chimera",
        provider: "TNG Tech",
        description: "Default model",
    },
    ModelInfo {
        id: "google/gemini-2.0-flash-exp:free",
        display_name: "Gemini 2.0 Flash",
        provider: "Google",
        description: "Fast response model",
    },
    ModelInfo {
        id: "arliai/qwq-32b-arliai-rpr-v1:free",
        display_name: "QWQ 32B",
        provider: "Arli AI",
        description: "High-performance general model",
    },
    ModelInfo {
        id: "nvidia/llama-3.1-nemotron-ultra-253b-v1:free",
        display_name: "Llama 3.1 Nemotron Ultra 253B",
        provider: "NVIDIA",
        description: "Ultra-large scale model",
    },
    ModelInfo {
        id: "meta-llama/llama-4-maverick:free",
        display_name: "Llama 4 Maverick",
        provider: "Meta",
        description: "Latest Llama series model",
    },
    ModelInfo {
        id: "deepseek/deepseek-v3-base:free",
        display_name: "DeepSeek V3 Base",
        provider: "DeepSeek",
        description: "Base version",
    },
    ModelInfo {
        id: "deepseek/deepseek-chat-v3-0324:free",
        display_name: "DeepSeek Chat V3",
        provider: "DeepSeek",
        description: "Chat-tuned version",
    },
];

/// All curated models, default first
pub fn catalog() -> &'static [ModelInfo] {
    CATALOG
}

/// Look up a curated model by id
pub fn find(id: &str) -> Option<&'static ModelInfo> {
    CATALOG.iter().find(|m| m.id == id)
}

/// Display name for a model id; unknown ids are shown as-is
pub fn display_name(id: &str) -> &str {
    find(id).map(|m| m.display_name).unwrap_or(id)
}
