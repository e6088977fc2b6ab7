//! The host page handed to the engine: document, location and storage.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::Document;
use crate::dom::{DomTree, ElementFixture};
use crate::location::Location;
use crate::storage::Storage;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("invalid page URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Serialized page snapshot: where the page is and what it renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageFixture {
    pub url: String,
    pub dom: ElementFixture,
}

#[derive(Clone)]
pub struct Page {
    pub document: Arc<Document>,
    pub location: Arc<Location>,
    pub storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("document", &self.document)
            .field("location", &self.location.href())
            .finish()
    }
}

impl Page {
    pub fn new(document: Document, location: Location, storage: Arc<dyn Storage>) -> Self {
        Self {
            document: Arc::new(document),
            location: Arc::new(location),
            storage,
        }
    }

    pub fn from_fixture(fixture: &PageFixture, storage: Arc<dyn Storage>) -> Result<Self, PageError> {
        let location = Location::new(&fixture.url)?;
        let document = Document::new(DomTree::from_fixture(&fixture.dom));
        Ok(Self::new(document, location, storage))
    }
}
