//! Extension points around validation and persistence.
//!
//! Hooks are plain callback lists keyed by [`HookEvent`]. Records fire the validate and persist
//! events from `save`; the mapper fires the get and remove events. Within one save the order is
//! always `BeforeValidate`, `AfterValidate`, `BeforeInsert`/`BeforeUpdate`,
//! `AfterInsert`/`AfterUpdate`. A callback returning an error aborts the operation.

use bson::Document;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::trace;

use crate::error::DocmapResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeValidate,
    AfterValidate,
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
    AfterGet,
    BeforeRemove,
    AfterRemove,
}

pub type HookFn = Arc<dyn Fn(HookEvent, &Document) -> DocmapResult<()> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Hooks {
    listeners: HashMap<HookEvent, Vec<HookFn>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `event`. Callbacks run in registration order.
    pub fn on<F>(&mut self, event: HookEvent, callback: F) -> &mut Self
    where
        F: Fn(HookEvent, &Document) -> DocmapResult<()> + Send + Sync + 'static,
    {
        self.listeners.entry(event).or_default().push(Arc::new(callback));
        self
    }

    pub fn count(&self, event: HookEvent) -> usize {
        self.listeners.get(&event).map_or(0, Vec::len)
    }

    /// Runs the callbacks for `event`, stopping at the first error.
    pub fn emit(&self, event: HookEvent, document: &Document) -> DocmapResult<()> {
        let Some(listeners) = self.listeners.get(&event) else {
            return Ok(());
        };

        trace!(?event, listeners = listeners.len(), "emitting hook");
        for listener in listeners {
            listener(event, document)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events = self.listeners.keys().collect::<Vec<_>>();
        events.sort_by_key(|event| format!("{event:?}"));
        f.debug_struct("Hooks").field("events", &events).finish()
    }
}
