//! Host page model for the journey trigger engine — the element tree,
//! selector matching, click dispatch, location and keyed storage that a
//! browser would otherwise provide.
//!
//! # Modules
//!
//! - [`dom`] — Append-only element arena with document-order traversal
//! - [`selector`] — CSS subset parser and matcher used by exported triggers
//! - [`document`] — Live document with a shared click-listener registry
//! - [`location`] — Current page URL, replaceable on client-side navigation
//! - [`storage`] — Keyed string storage (in-memory and file backed)
//! - [`page`] — Bundle of the above handed to the engine

pub mod document;
pub mod dom;
pub mod location;
pub mod page;
pub mod selector;
pub mod storage;

pub use document::{ClickEvent, ClickListener, Document, ListenerId};
pub use dom::{DomTree, Element, ElementFixture, ElementId};
pub use location::Location;
pub use page::{Page, PageError, PageFixture};
pub use selector::{Selector, SelectorError};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
