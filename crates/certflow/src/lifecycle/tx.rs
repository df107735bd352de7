//! Explicit transaction context threaded through lifecycle calls.

use std::cell::{Cell, RefCell};
use std::ops::Deref;

use rusqlite::Connection;

use super::events::LifecycleEvent;
use crate::db::DatabaseError;
use crate::error::LifecycleError;

/// An open store transaction plus the events its operations have produced.
///
/// Obtained from
/// [`LifecycleCoordinator::in_transaction`](super::LifecycleCoordinator::in_transaction).
/// Events collected here are dispatched only once the owning transaction
/// commits; a rolled-back transaction drops them.
pub struct TxContext<'a> {
    conn: &'a Connection,
    events: RefCell<Vec<LifecycleEvent>>,
    depth: Cell<u32>,
}

impl<'a> TxContext<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            events: RefCell::new(Vec::new()),
            depth: Cell::new(0),
        }
    }

    pub fn conn(&self) -> &Connection {
        self.conn
    }

    pub(crate) fn defer(&self, event: LifecycleEvent) {
        self.events.borrow_mut().push(event);
    }

    pub(crate) fn into_events(self) -> Vec<LifecycleEvent> {
        self.events.into_inner()
    }

    /// Runs one operation inside a savepoint of the joined transaction.
    ///
    /// A failing operation leaves neither rows nor queued events behind, so
    /// the caller may handle the error and keep using the transaction.
    pub(crate) fn step<T, F>(&self, f: F) -> Result<T, LifecycleError>
    where
        F: FnOnce() -> Result<T, LifecycleError>,
    {
        let depth = self.depth.get() + 1;
        let name = format!("lifecycle_step_{}", depth);
        let mark = self.events.borrow().len();

        self.conn
            .execute_batch(&format!("SAVEPOINT {}", name))
            .map_err(DatabaseError::from)?;
        self.depth.set(depth);

        let result = f();
        self.depth.set(depth - 1);

        match result {
            Ok(value) => {
                self.conn
                    .execute_batch(&format!("RELEASE {}", name))
                    .map_err(DatabaseError::from)?;
                Ok(value)
            }
            Err(err) => {
                self.conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))
                    .map_err(DatabaseError::from)?;
                self.events.borrow_mut().truncate(mark);
                Err(err)
            }
        }
    }
}

impl Deref for TxContext<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

/// Per-call options for lifecycle operations.
#[derive(Default, Clone, Copy)]
pub struct TransitionOptions<'a> {
    /// Join this transaction instead of opening one. The caller then owns
    /// commit and rollback.
    pub transaction: Option<&'a TxContext<'a>>,
}

impl<'a> TransitionOptions<'a> {
    pub fn within(ctx: &'a TxContext<'a>) -> Self {
        Self {
            transaction: Some(ctx),
        }
    }
}
