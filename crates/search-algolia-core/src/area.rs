//! Search areas and the registry that resolves them.
//!
//! The host owns access control. The engine only asks a registered area
//! whether the requesting user may see an item, once per candidate hit.

use std::collections::HashMap;

use crate::models::AccessResult;

/// A host search area that can answer access checks for its items.
pub trait SearchArea: Send + Sync {
    /// Area identifier as stored in the `areaid` facet.
    fn area_id(&self) -> &str;

    /// Whether the requesting user may see `item_id`.
    ///
    /// Must be idempotent and side-effect free for granted/denied outcomes.
    fn check_access(&self, item_id: i64) -> AccessResult;
}

/// Resolves area ids to registered areas.
pub trait AreaRegistry {
    fn lookup_area(&self, area_id: &str) -> Option<&dyn SearchArea>;
}

/// An area whose access checks are answered by a closure.
pub struct CallbackArea<F> {
    id: String,
    check: F,
}

impl<F> CallbackArea<F>
where
    F: Fn(i64) -> AccessResult + Send + Sync,
{
    pub fn new(id: impl Into<String>, check: F) -> Self {
        Self {
            id: id.into(),
            check,
        }
    }
}

impl<F> SearchArea for CallbackArea<F>
where
    F: Fn(i64) -> AccessResult + Send + Sync,
{
    fn area_id(&self) -> &str {
        &self.id
    }

    fn check_access(&self, item_id: i64) -> AccessResult {
        (self.check)(item_id)
    }
}

/// An area that grants every item. Used by diagnostics tooling.
pub struct OpenArea {
    id: String,
}

impl OpenArea {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl SearchArea for OpenArea {
    fn area_id(&self) -> &str {
        &self.id
    }

    fn check_access(&self, _item_id: i64) -> AccessResult {
        AccessResult::Granted
    }
}

/// Map-backed [`AreaRegistry`].
#[derive(Default)]
pub struct AreaSet {
    areas: HashMap<String, Box<dyn SearchArea>>,
}

impl AreaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an area, replacing any previous area with the same id.
    pub fn register(&mut self, area: Box<dyn SearchArea>) {
        self.areas.insert(area.area_id().to_string(), area);
    }

    pub fn with(mut self, area: impl SearchArea + 'static) -> Self {
        self.register(Box::new(area));
        self
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

impl AreaRegistry for AreaSet {
    fn lookup_area(&self, area_id: &str) -> Option<&dyn SearchArea> {
        self.areas.get(area_id).map(|a| a.as_ref())
    }
}
