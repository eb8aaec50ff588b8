use thiserror::Error;

use crate::transport::error_chain_text;

const MAX_ERROR_CHARS: usize = 2000;

/// Fatal outcomes of a pipeline run. The conversation is untouched when any
/// of these is returned, so the same input can be retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("request is empty")]
    EmptyRequest,
    #[error("{message}")]
    Synthesis { message: String },
    #[error("{message}")]
    Generation { message: String },
}

impl PipelineError {
    pub fn synthesis(err: &anyhow::Error) -> Self {
        Self::Synthesis {
            message: error_chain_text(err, MAX_ERROR_CHARS),
        }
    }

    pub fn generation(err: &anyhow::Error) -> Self {
        Self::Generation {
            message: error_chain_text(err, MAX_ERROR_CHARS),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyRequest => "empty_request",
            Self::Synthesis { .. } => "synthesis_failure",
            Self::Generation { .. } => "generation_failure",
        }
    }
}

/// Non-fatal conditions reported alongside a delivered outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineWarning {
    #[error("critique unavailable, treated as passed: {message}")]
    CritiqueUnavailable { message: String },
    #[error("repair failed, delivering the first attempt: {message}")]
    RepairFailed { message: String },
    #[error("memory write failed: {message}")]
    MemoryWriteFailed { message: String },
}

impl PipelineWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CritiqueUnavailable { .. } => "critique_unavailable",
            Self::RepairFailed { .. } => "repair_failed",
            Self::MemoryWriteFailed { .. } => "memory_write_failed",
        }
    }

    pub fn critique_unavailable(err: &anyhow::Error) -> Self {
        Self::CritiqueUnavailable {
            message: error_chain_text(err, MAX_ERROR_CHARS),
        }
    }

    pub fn repair_failed(err: &anyhow::Error) -> Self {
        Self::RepairFailed {
            message: error_chain_text(err, MAX_ERROR_CHARS),
        }
    }

    pub fn memory_write_failed(err: &anyhow::Error) -> Self {
        Self::MemoryWriteFailed {
            message: error_chain_text(err, MAX_ERROR_CHARS),
        }
    }
}
