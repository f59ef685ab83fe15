//! Document-structure outline lookup.
//!
//! Editing agents get a heading outline of their target document injected
//! into the prompt. How the outline is produced (parsing markdown, querying a
//! store) belongs to the host.

use async_trait::async_trait;
use std::path::Path;

/// Produces an outline string for a document, or an empty string if none.
#[async_trait]
pub trait OutlineProvider: Send + Sync {
    async fn outline(&self, document: &Path) -> String;
}

/// An outline provider that never has anything to say.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOutline;

#[async_trait]
impl OutlineProvider for NoOutline {
    async fn outline(&self, _document: &Path) -> String {
        String::new()
    }
}
