//! Current page location. Client-side navigation replaces the URL in place,
//! so readers must re-read `href` on every check.

use parking_lot::RwLock;
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub struct Location {
    url: RwLock<Url>,
}

impl Location {
    pub fn new(href: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: RwLock::new(Url::parse(href)?),
        })
    }

    /// Serialized URL, normalised the way a browser reports `location.href`.
    pub fn href(&self) -> String {
        self.url.read().as_str().to_string()
    }

    pub fn navigate(&self, href: &str) -> Result<(), url::ParseError> {
        let next = Url::parse(href)?;
        debug!(from = %self.url.read(), to = %next, "Navigating");
        *self.url.write() = next;
        Ok(())
    }
}
