//! Template Manager error types

use thiserror::Error;

/// Errors from Template Manager operations
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The Template Record itself could not be parsed
    #[error(transparent)]
    Decode(#[from] flowcol_protocol::DecodeError),

    /// Withdrawal or lookup named a Template ID this source never announced
    #[error("template {template_id} not found for domain {odid}")]
    NotFound { odid: u32, template_id: u16 },

    /// The per-domain Template ID space (256..=65535) is exhausted
    #[error("no free template id left for domain {odid}")]
    IdSpaceExhausted { odid: u32 },
}
