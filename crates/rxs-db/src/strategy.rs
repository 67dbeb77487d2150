//! Matching and merge strategies, and the builder that wires them into a
//! [`Database`].

use crate::database::Database;
use crate::error::{DbError, Result, StrategyKind};
use crate::item_store::ItemStore;
use crate::observer::ChangeObserver;
use crate::record::{default_id_generator, IdGenerator, Record};
use rxs_core::{CellConfig, Collection, Mode};
use std::marker::PhantomData;
use std::sync::Arc;

/// Does a payload designate this record?
pub type EqualFn<P, T> = Arc<dyn Fn(&P, &T) -> bool + Send + Sync>;

/// Projects a record onto what searches are matched against.
pub type ToSearchFn<T, S> = Arc<dyn Fn(&T) -> S + Send + Sync>;

/// Merges an update payload into the record it matched.
pub type FromUpdateFn<U, T> = Arc<dyn Fn(&U, &T) -> T + Send + Sync>;

/// The four optional strategies of a database.
///
/// An operation whose strategy is missing fails with
/// [`DbError::MissingStrategy`] when called.
pub struct Strategies<T, U, R, S> {
    pub update_equal: Option<EqualFn<U, T>>,
    pub remove_equal: Option<EqualFn<R, T>>,
    pub to_search: Option<ToSearchFn<T, S>>,
    pub from_update: Option<FromUpdateFn<U, T>>,
}

impl<T, U, R, S> Strategies<T, U, R, S> {
    pub fn update_equal(&self) -> Result<EqualFn<U, T>> {
        self.update_equal
            .clone()
            .ok_or(DbError::MissingStrategy(StrategyKind::UpdateEqual))
    }

    pub fn remove_equal(&self) -> Result<EqualFn<R, T>> {
        self.remove_equal
            .clone()
            .ok_or(DbError::MissingStrategy(StrategyKind::RemoveEqual))
    }

    pub fn to_search(&self) -> Result<ToSearchFn<T, S>> {
        self.to_search
            .clone()
            .ok_or(DbError::MissingStrategy(StrategyKind::ToSearch))
    }

    pub fn from_update(&self) -> Result<FromUpdateFn<U, T>> {
        self.from_update
            .clone()
            .ok_or(DbError::MissingStrategy(StrategyKind::FromUpdate))
    }

    /// Both strategies an update needs, checked in that order.
    pub fn for_update(&self) -> Result<(EqualFn<U, T>, FromUpdateFn<U, T>)> {
        Ok((self.update_equal()?, self.from_update()?))
    }
}

impl<T, U, R, S> Default for Strategies<T, U, R, S> {
    fn default() -> Self {
        Self {
            update_equal: None,
            remove_equal: None,
            to_search: None,
            from_update: None,
        }
    }
}

impl<T, U, R, S> Clone for Strategies<T, U, R, S> {
    fn clone(&self) -> Self {
        Self {
            update_equal: self.update_equal.clone(),
            remove_equal: self.remove_equal.clone(),
            to_search: self.to_search.clone(),
            from_update: self.from_update.clone(),
        }
    }
}

/// Builder for a [`Database`].
pub struct DatabaseBuilder<T, M, I = T, U = T, R = T, S = T>
where
    T: Record,
    M: Mode,
{
    items: Collection<T>,
    cell_config: CellConfig,
    strategies: Strategies<T, U, R, S>,
    id_generator: Option<IdGenerator>,
    observer: Option<Arc<dyn ChangeObserver<T>>>,
    reporting: bool,
    _marker: PhantomData<fn(M, I)>,
}

impl<T, M, I, U, R, S> DatabaseBuilder<T, M, I, U, R, S>
where
    T: Record,
    M: Mode,
{
    pub fn new() -> Self {
        Self {
            items: Collection::new(),
            cell_config: CellConfig::default(),
            strategies: Strategies::default(),
            id_generator: None,
            observer: None,
            reporting: true,
            _marker: PhantomData,
        }
    }

    /// Records the database starts with.
    pub fn items(mut self, items: impl Into<Collection<T>>) -> Self {
        self.items = items.into();
        self
    }

    pub fn cell_config(mut self, config: CellConfig) -> Self {
        self.cell_config = config;
        self
    }

    pub fn update_equal(mut self, f: impl Fn(&U, &T) -> bool + Send + Sync + 'static) -> Self {
        self.strategies.update_equal = Some(Arc::new(f));
        self
    }

    pub fn remove_equal(mut self, f: impl Fn(&R, &T) -> bool + Send + Sync + 'static) -> Self {
        self.strategies.remove_equal = Some(Arc::new(f));
        self
    }

    pub fn to_search(mut self, f: impl Fn(&T) -> S + Send + Sync + 'static) -> Self {
        self.strategies.to_search = Some(Arc::new(f));
        self
    }

    pub fn from_update(mut self, f: impl Fn(&U, &T) -> T + Send + Sync + 'static) -> Self {
        self.strategies.from_update = Some(Arc::new(f));
        self
    }

    pub fn strategies(mut self, strategies: Strategies<T, U, R, S>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn id_generator(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.id_generator = Some(Arc::new(f));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ChangeObserver<T>>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Whether completed mutations are reported to the observer. On by default.
    pub fn reporting(mut self, enabled: bool) -> Self {
        self.reporting = enabled;
        self
    }

    /// Build over a fresh item store holding the configured items.
    pub fn build(mut self) -> Database<T, M, I, U, R, S> {
        let items = std::mem::take(&mut self.items);
        let store = ItemStore::with_config(items, self.cell_config.clone());
        self.build_on(store)
    }

    /// Build over an existing item store. Configured items are ignored.
    pub fn build_on(self, store: ItemStore<T, M>) -> Database<T, M, I, U, R, S> {
        Database::from_parts(
            store,
            self.strategies,
            self.id_generator.unwrap_or_else(default_id_generator),
            self.observer,
            self.reporting,
        )
    }
}

impl<T, M, I, U, R, S> Default for DatabaseBuilder<T, M, I, U, R, S>
where
    T: Record,
    M: Mode,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_missing_strategies_report_their_kind() {
        let strategies: Strategies<Value, Value, Value, Value> = Strategies::default();
        assert_eq!(
            strategies.remove_equal().err(),
            Some(DbError::MissingStrategy(StrategyKind::RemoveEqual))
        );
        assert_eq!(
            strategies.for_update().err(),
            Some(DbError::MissingStrategy(StrategyKind::UpdateEqual))
        );
    }

    #[test]
    fn test_for_update_needs_both() {
        let strategies: Strategies<Value, Value, Value, Value> = Strategies {
            update_equal: Some(Arc::new(|u: &Value, t: &Value| u["name"] == t["name"])),
            ..Strategies::default()
        };
        assert_eq!(
            strategies.for_update().err(),
            Some(DbError::MissingStrategy(StrategyKind::FromUpdate))
        );

        let equal = strategies.update_equal().unwrap();
        assert!(equal(&json!({ "name": "a" }), &json!({ "id": "1", "name": "a" })));
    }
}
