//! Identifier quoting against the server's reserved words.
//!
//! Whether an identifier needs brackets depends on the server's reserved keyword list, which is
//! queried once and kept in a [`KeywordCache`]. Connections sharing one `Arc<KeywordCache>`
//! share that single query: the first caller loads the list under the write lock while everyone
//! else waits, afterwards lookups only take the read lock.
use std::{
    collections::HashSet,
    sync::{PoisonError, RwLock},
};

use log::info;

use crate::error::ClientError;

/// Lower-cased reserved words, one per row.
pub const KEYWORD_QUERY: &str = "SELECT LOWER(keyword) FROM sys.exa_sql_keywords WHERE reserved";

#[derive(Debug, Default)]
pub struct KeywordCache {
    keywords: RwLock<Option<HashSet<String>>>,
}

impl KeywordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that is already populated and never queries the server.
    pub fn with_keywords<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = words.into_iter().map(|w| w.as_ref().to_lowercase()).collect();
        Self {
            keywords: RwLock::new(Some(set)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.keywords
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Looks `word` up, running `load` first if the cache is still empty.
    ///
    /// `load` runs at most once across concurrent callers. When it fails the cache stays empty
    /// and the error is returned to the caller that ran it.
    pub fn contains_or_load<F>(&self, word: &str, load: F) -> Result<bool, ClientError>
    where
        F: FnOnce() -> Result<HashSet<String>, ClientError>,
    {
        {
            let keywords = self.keywords.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(set) = keywords.as_ref() {
                return Ok(set.contains(word));
            }
        }

        let mut keywords = self.keywords.write().unwrap_or_else(PoisonError::into_inner);
        if keywords.is_none() {
            let set = load()?;
            info!("loaded {} reserved keywords", set.len());
            *keywords = Some(set);
        }
        Ok(keywords.as_ref().is_some_and(|set| set.contains(word)))
    }
}

/// Brackets `ident` when it is reserved (lower-cased) or does not start with an ASCII letter
/// (upper-cased). Anything else is returned as is. Characters inside the identifier are never
/// escaped.
pub fn quote_ident_with(ident: &str, reserved: bool) -> String {
    if reserved {
        format!("[{}]", ident.to_lowercase())
    } else if ident.chars().next().is_some_and(|c| !c.is_ascii_alphabetic()) {
        format!("[{}]", ident.to_uppercase())
    } else {
        ident.to_string()
    }
}
