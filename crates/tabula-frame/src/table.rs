//! The table: a row index plus a directory of independently typed columns.
//!
//! Columns are stored by slot; the name directory maps names to slots and an
//! insertion-ordered list defines the externally visible column order. Slot
//! order is an implementation detail and changes when columns are removed.
//!
//! Every bulk operation acquires the table's lock once, for its whole body.
//! The engine helpers in the sibling modules assume it is already held.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tabula_core::config::TableConfig;
use tabula_core::error::{Error, Result};
use tabula_core::id::SlotId;
use tabula_core::types::Element;
use tabula_core::INDEX_NAME;
use tabula_exec::{DispatchStrategy, SpinLock, TaskPool};

use crate::column::{downcast_mut, downcast_ref, ColumnData};

/// How `load_column` reconciles a column whose length differs from the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LengthPolicy {
    /// Length must equal the index length.
    Strict,
    /// Shorter columns are padded with the sentinel; longer ones are rejected.
    #[default]
    PadWithNa,
    /// Longer columns are cut to the index length; shorter ones are stored as-is.
    Truncate,
}

/// Where a named key lives. The index is its own case, never a column slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeySource {
    Index,
    Slot(SlotId),
}

pub struct Table<I: Element> {
    pub(crate) index: Vec<I>,
    pub(crate) columns: Vec<Box<dyn ColumnData>>,
    directory: HashMap<String, SlotId>,
    order: Vec<(String, SlotId)>,
    own_lock: SpinLock,
    shared_lock: Option<SpinLock>,
    config: TableConfig,
    pool: Arc<TaskPool>,
}

impl<I: Element> Default for Table<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Element> Table<I> {
    /// Empty table on the process-wide task pool.
    pub fn new() -> Self {
        Self::with_pool(TableConfig::default(), TaskPool::global())
    }

    /// Empty table with its own task pool sized by `config`.
    pub fn with_config(config: TableConfig) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(TaskPool::new(config.thread_pool_size)?);
        Ok(Self::with_pool(config, pool))
    }

    pub fn with_pool(config: TableConfig, pool: Arc<TaskPool>) -> Self {
        Self {
            index: Vec::new(),
            columns: Vec::new(),
            directory: HashMap::new(),
            order: Vec::new(),
            own_lock: SpinLock::new(),
            shared_lock: None,
            config,
            pool,
        }
    }

    pub fn from_index(index: Vec<I>) -> Self {
        let mut table = Self::new();
        table.index = index;
        table
    }

    /// Empty table of another index type sharing this table's config and pool.
    pub(crate) fn empty_like<J: Element>(&self) -> Table<J> {
        Table::with_pool(self.config.clone(), Arc::clone(&self.pool))
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<TaskPool> {
        &self.pool
    }

    pub fn strategy(&self) -> DispatchStrategy {
        DispatchStrategy::new(&self.config, self.pool.threads())
    }

    // ----- lock -----

    /// The lock guarding this table's column storage.
    pub fn lock(&self) -> &SpinLock {
        self.shared_lock.as_ref().unwrap_or(&self.own_lock)
    }

    /// Coordinate with other tables through an externally supplied lock.
    pub fn attach_lock(&mut self, lock: SpinLock) {
        self.shared_lock = Some(lock);
    }

    /// Revert to the table's private lock, returning the detached one.
    pub fn detach_lock(&mut self) -> Option<SpinLock> {
        self.shared_lock.take()
    }

    // ----- shape -----

    pub fn index(&self) -> &[I] {
        &self.index
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn num_columns(&self) -> usize {
        self.order.len()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_columns())
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_shapeless(&self) -> bool {
        self.is_empty() && self.columns.is_empty()
    }

    /// Column names in external order.
    pub fn column_names(&self) -> Vec<&str> {
        self.order.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        name == INDEX_NAME || self.directory.contains_key(name)
    }

    pub fn column_type_name(&self, name: &str) -> Result<&'static str> {
        Ok(self.source(self.key_source(name)?).type_label())
    }

    // ----- typed access -----

    pub fn column<T: Element>(&self, name: &str) -> Result<&[T]> {
        if name == INDEX_NAME {
            let index: &dyn Any = &self.index;
            return index
                .downcast_ref::<Vec<T>>()
                .map(|v| v.as_slice())
                .ok_or_else(|| Error::type_mismatch(name, I::type_label(), T::type_label()));
        }
        let slot = self.slot_of(name)?;
        downcast_ref::<T>(self.columns[slot.get()].as_ref(), name).map(|v| v.as_slice())
    }

    pub fn column_mut<T: Element>(&mut self, name: &str) -> Result<&mut Vec<T>> {
        if name == INDEX_NAME {
            let index: &mut dyn Any = &mut self.index;
            return index
                .downcast_mut::<Vec<T>>()
                .ok_or_else(|| Error::type_mismatch(name, I::type_label(), T::type_label()));
        }
        let slot = self.slot_of(name)?;
        downcast_mut::<T>(self.columns[slot.get()].as_mut(), name)
    }

    // ----- loading -----

    /// Replace the index. Columns are left untouched; call `make_consistent`
    /// to re-align them.
    pub fn load_index(&mut self, index: Vec<I>) -> usize {
        let _guard = self.lock().acquire();
        self.index = index;
        self.index.len()
    }

    /// Insert or replace a column. Returns the stored length.
    pub fn load_column<T: Element>(
        &mut self,
        name: &str,
        mut values: Vec<T>,
        policy: LengthPolicy,
    ) -> Result<usize> {
        let _guard = self.lock().acquire();
        let rows = self.index.len();

        if name == INDEX_NAME {
            let boxed: Box<dyn Any> = Box::new(values);
            let index = boxed
                .downcast::<Vec<I>>()
                .map_err(|_| Error::type_mismatch(name, I::type_label(), T::type_label()))?;
            self.index = *index;
            return Ok(self.index.len());
        }

        match policy {
            LengthPolicy::Strict if values.len() != rows => {
                return Err(Error::InconsistentData(format!(
                    "column '{name}' has {} values, index has {rows}",
                    values.len()
                )));
            }
            LengthPolicy::PadWithNa if values.len() > rows => {
                return Err(Error::InconsistentData(format!(
                    "column '{name}' has {} values, longer than index ({rows})",
                    values.len()
                )));
            }
            LengthPolicy::PadWithNa => values.resize(rows, T::na()),
            LengthPolicy::Truncate => values.truncate(rows),
            LengthPolicy::Strict => {}
        }

        let len = values.len();
        self.insert_boxed(name, Box::new(values));
        tracing::trace!(column = name, len, "loaded column");
        Ok(len)
    }

    /// Replace the index and load several same-typed columns (strict lengths).
    pub fn load_data<T: Element>(&mut self, index: Vec<I>, columns: Vec<(&str, Vec<T>)>) -> Result<usize> {
        let rows = index.len();
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != rows) {
            return Err(Error::InconsistentData(format!(
                "column '{name}' has {} values, index has {rows}",
                values.len()
            )));
        }
        self.load_index(index);
        for (name, values) in columns {
            self.load_column(name, values, LengthPolicy::Strict)?;
        }
        Ok(rows)
    }

    pub(crate) fn insert_boxed(&mut self, name: &str, column: Box<dyn ColumnData>) {
        match self.directory.get(name) {
            Some(slot) => self.columns[slot.get()] = column,
            None => {
                let slot = SlotId::new(self.columns.len());
                self.columns.push(column);
                self.directory.insert(name.to_string(), slot);
                self.order.push((name.to_string(), slot));
            }
        }
    }

    // ----- structural edits -----

    pub fn remove_column(&mut self, name: &str) -> Result<()> {
        if name == INDEX_NAME {
            return Err(Error::InconsistentData("the index cannot be removed".into()));
        }
        let slot = self.slot_of(name)?;
        let _guard = self.lock().acquire();

        self.columns.swap_remove(slot.get());
        self.directory.remove(name);
        self.order.retain(|(n, _)| n != name);

        // The former last slot now lives where the removed column was.
        let moved = SlotId::new(self.columns.len());
        if moved != slot {
            for (_, s) in self.order.iter_mut().filter(|(_, s)| *s == moved) {
                *s = slot;
            }
            for s in self.directory.values_mut().filter(|s| **s == moved) {
                *s = slot;
            }
        }
        Ok(())
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        if from == INDEX_NAME || to == INDEX_NAME {
            return Err(Error::InconsistentData("the index cannot be renamed".into()));
        }
        if self.directory.contains_key(to) {
            return Err(Error::InconsistentData(format!("column '{to}' already exists")));
        }
        let slot = self.slot_of(from)?;
        let _guard = self.lock().acquire();
        self.directory.remove(from);
        self.directory.insert(to.to_string(), slot);
        if let Some(entry) = self.order.iter_mut().find(|(n, _)| n == from) {
            entry.0 = to.to_string();
        }
        Ok(())
    }

    /// Pad or truncate every column to the index length.
    pub fn make_consistent(&mut self) {
        let _guard = self.lock().acquire();
        self.make_consistent_unlocked();
    }

    pub(crate) fn make_consistent_unlocked(&mut self) {
        let rows = self.index.len();
        for column in self.columns.iter_mut().filter(|c| c.len() != rows) {
            column.resize_na(rows);
        }
    }

    /// Copy of rows `rows` (index and every column) as a new table.
    pub fn slice_rows(&self, rows: Range<usize>) -> Result<Table<I>> {
        if rows.start > rows.end || rows.end > self.num_rows() {
            return Err(Error::InconsistentData(format!(
                "row range {rows:?} outside 0..{}",
                self.num_rows()
            )));
        }
        let _guard = self.lock().acquire();
        let mut out = self.empty_like::<I>();
        out.index = self.index[rows.clone()].to_vec();
        for (name, slot) in &self.order {
            out.insert_boxed(name, self.columns[slot.get()].slice(rows.clone()));
        }
        Ok(out)
    }

    // ----- name resolution -----

    pub(crate) fn slot_of(&self, name: &str) -> Result<SlotId> {
        self.directory
            .get(name)
            .copied()
            .ok_or_else(|| Error::column_not_found(name))
    }

    pub(crate) fn key_source(&self, name: &str) -> Result<KeySource> {
        if name == INDEX_NAME {
            Ok(KeySource::Index)
        } else {
            self.slot_of(name).map(KeySource::Slot)
        }
    }

    pub(crate) fn source(&self, key: KeySource) -> &dyn ColumnData {
        match key {
            KeySource::Index => &self.index,
            KeySource::Slot(slot) => self.columns[slot.get()].as_ref(),
        }
    }

    /// (name, slot) pairs in external order.
    pub(crate) fn ordered_slots(&self) -> &[(String, SlotId)] {
        &self.order
    }
}

impl<I: Element> Clone for Table<I> {
    /// The copy gets its own private lock; an attached lock is not carried over.
    fn clone(&self) -> Self {
        let _guard = self.lock().acquire();
        Self {
            index: self.index.clone(),
            columns: self.columns.iter().map(|c| c.clone_box()).collect(),
            directory: self.directory.clone(),
            order: self.order.clone(),
            own_lock: SpinLock::new(),
            shared_lock: None,
            config: self.config.clone(),
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<I: Element> Drop for Table<I> {
    fn drop(&mut self) {
        let _guard = self.lock().acquire();
        self.columns.clear();
    }
}

impl<I: Element> fmt::Debug for Table<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("rows", &self.num_rows())
            .field("columns", &self.column_names())
            .finish()
    }
}
