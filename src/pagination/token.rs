//! Pagination token guard

use crate::types::JsonValue;
use tracing::warn;

/// Stops pagination when a strategy hands back the token it just produced.
///
/// Tokens are opaque (an offset, a cursor string, a composite object); two
/// structurally equal consecutive tokens mean the next page would be the same
/// page again.
#[derive(Debug, Clone, Default)]
pub struct PaginationGuard {
    stream: String,
    last_token: Option<JsonValue>,
    pages: u64,
}

impl PaginationGuard {
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            ..Default::default()
        }
    }

    /// Accept the next token. Returns the token to request with, or `None`
    /// when pagination is over.
    pub fn advance(&mut self, token: Option<JsonValue>) -> Option<JsonValue> {
        let token = token?;
        if token.is_null() {
            return None;
        }
        if self.last_token.as_ref() == Some(&token) {
            warn!(
                stream = %self.stream,
                token = %token,
                pages = self.pages,
                "Paginator returned the same token twice in a row, stopping pagination"
            );
            return None;
        }
        self.pages += 1;
        self.last_token = Some(token.clone());
        Some(token)
    }

    /// Pages accepted so far
    pub fn pages(&self) -> u64 {
        self.pages
    }

    /// Forget the last token, e.g. after a pagination reset
    pub fn reset(&mut self) {
        self.last_token = None;
    }
}
