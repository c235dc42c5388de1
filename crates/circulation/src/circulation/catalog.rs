use std::sync::Arc;

use super::domain::{Book, Identifier};
use super::error::CirculationError;
use super::repository::{CatalogStore, RepositoryError};

/// Typed book lookup and stock adjustment over a [`CatalogStore`].
pub struct BookCatalog<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for BookCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S> BookCatalog<S>
where
    S: CatalogStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolves a book under exactly the scheme carried by `identifier`.
    pub fn resolve(&self, identifier: &Identifier) -> Result<Book, CirculationError> {
        if identifier.is_blank() {
            return Err(CirculationError::InvalidIdentifier(
                identifier.value().to_string(),
            ));
        }
        let identifier = identifier.normalized();
        self.store
            .find_book(&identifier)?
            .ok_or(CirculationError::BookNotFound(identifier))
    }

    /// Resolves free-form input by trying the ISBN scheme, then the accession scheme.
    pub fn resolve_raw(&self, raw: &str) -> Result<Book, CirculationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CirculationError::InvalidIdentifier(raw.to_string()));
        }

        for candidate in [Identifier::isbn(trimmed), Identifier::accession(trimmed)] {
            if let Some(book) = self.store.find_book(&candidate)? {
                return Ok(book);
            }
        }

        Err(CirculationError::InvalidIdentifier(trimmed.to_string()))
    }

    pub fn register(&self, mut book: Book) -> Result<Book, CirculationError> {
        if book.identifier.is_blank() {
            return Err(CirculationError::InvalidIdentifier(
                book.identifier.value().to_string(),
            ));
        }
        book.identifier = book.identifier.normalized();
        Ok(self.store.insert_book(book)?)
    }

    pub fn decrement_stock(&self, identifier: &Identifier) -> Result<u32, CirculationError> {
        match self.store.adjust_stock(identifier, -1) {
            Ok(quantity) => Ok(quantity),
            Err(RepositoryError::OutOfStock) => {
                Err(CirculationError::BookUnavailable(identifier.clone()))
            }
            Err(RepositoryError::NotFound) => {
                Err(CirculationError::BookNotFound(identifier.clone()))
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn increment_stock(&self, identifier: &Identifier) -> Result<u32, CirculationError> {
        match self.store.adjust_stock(identifier, 1) {
            Ok(quantity) => Ok(quantity),
            Err(RepositoryError::NotFound) => {
                Err(CirculationError::BookNotFound(identifier.clone()))
            }
            Err(other) => Err(other.into()),
        }
    }
}
