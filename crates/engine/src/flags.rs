//! Named boolean event flags with change notification.
//!
//! Flags are the only channel puzzles, doors and NPCs use to talk to each
//! other. A mutator that changes a value notifies every subscriber of that flag
//! exactly once, in subscription order, before it returns. A mutator that leaves
//! the value unchanged notifies nobody.
//!
//! Subscribers receive the new value only. They cannot reach the registry from
//! inside the callback, so a subscriber can never mutate the flag that is
//! notifying it.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlagId(u32);

impl FlagId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagChange {
    pub flag: FlagId,
    pub value: bool,
}

/// Plain name to value pairs, used by persistence.
pub type FlagSnapshot = BTreeMap<String, bool>;

type FlagCallback = Box<dyn FnMut(FlagChange)>;

struct FlagCell {
    name: String,
    value: bool,
    default_value: bool,
    subscribers: Vec<(SubscriptionId, FlagCallback)>,
}

#[derive(Default)]
pub struct FlagRegistry {
    cells: Vec<FlagCell>,
    ids_by_name: HashMap<String, FlagId>,
    next_subscription: u64,
}

impl fmt::Debug for FlagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.cells.iter().map(|cell| (&cell.name, cell.value)))
            .finish()
    }
}

impl FlagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a flag, or returns the existing id when the name is taken.
    pub fn register(&mut self, name: &str, default_value: bool) -> FlagId {
        if let Some(existing) = self.ids_by_name.get(name) {
            return *existing;
        }
        let id = FlagId(self.cells.len() as u32);
        self.cells.push(FlagCell {
            name: name.to_string(),
            value: default_value,
            default_value,
            subscribers: Vec::new(),
        });
        self.ids_by_name.insert(name.to_string(), id);
        id
    }

    pub fn id(&self, name: &str) -> Option<FlagId> {
        self.ids_by_name.get(name).copied()
    }

    pub fn name(&self, id: FlagId) -> Option<&str> {
        self.cells.get(id.index()).map(|cell| cell.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_active(&self, id: FlagId) -> bool {
        self.cells.get(id.index()).is_some_and(|cell| cell.value)
    }

    /// Sets the flag to true. Toggling an active flag is a no-op.
    pub fn toggle(&mut self, id: FlagId) -> bool {
        self.set_active(id, true)
    }

    /// Returns whether the value changed.
    pub fn set_active(&mut self, id: FlagId, value: bool) -> bool {
        let Some(cell) = self.cells.get_mut(id.index()) else {
            warn!(flag = id.0, "flag_set_unknown_id");
            return false;
        };
        if cell.value == value {
            return false;
        }
        cell.value = value;
        debug!(flag = %cell.name, value, subscribers = cell.subscribers.len(), "flag_changed");
        let change = FlagChange { flag: id, value };
        for (_, callback) in cell.subscribers.iter_mut() {
            callback(change);
        }
        true
    }

    pub fn reset(&mut self, id: FlagId) -> bool {
        let Some(default_value) = self.cells.get(id.index()).map(|cell| cell.default_value) else {
            return false;
        };
        self.set_active(id, default_value)
    }

    pub fn reset_all(&mut self) {
        for index in 0..self.cells.len() {
            self.reset(FlagId(index as u32));
        }
    }

    pub fn subscribe<F>(&mut self, id: FlagId, callback: F) -> Option<SubscriptionId>
    where
        F: FnMut(FlagChange) + 'static,
    {
        let Some(cell) = self.cells.get_mut(id.index()) else {
            warn!(flag = id.0, "flag_subscribe_unknown_id");
            return None;
        };
        let subscription = SubscriptionId(self.next_subscription);
        self.next_subscription = self.next_subscription.saturating_add(1);
        cell.subscribers.push((subscription, Box::new(callback)));
        Some(subscription)
    }

    pub fn unsubscribe(&mut self, id: FlagId, subscription: SubscriptionId) -> bool {
        let Some(cell) = self.cells.get_mut(id.index()) else {
            return false;
        };
        let before = cell.subscribers.len();
        cell.subscribers.retain(|(existing, _)| *existing != subscription);
        before != cell.subscribers.len()
    }

    pub fn subscriber_count(&self, id: FlagId) -> usize {
        self.cells
            .get(id.index())
            .map_or(0, |cell| cell.subscribers.len())
    }

    pub fn snapshot(&self) -> FlagSnapshot {
        self.cells
            .iter()
            .map(|cell| (cell.name.clone(), cell.value))
            .collect()
    }

    /// Applies known names through `set_active`, so subscribers observe restored values.
    pub fn restore(&mut self, snapshot: &FlagSnapshot) {
        for (name, value) in snapshot {
            match self.id(name) {
                Some(id) => {
                    self.set_active(id, *value);
                }
                None => warn!(flag = %name, "flag_restore_unknown_name"),
            }
        }
    }
}

/// Visibility cell that follows a flag, e.g. an NPC that appears once a quest starts.
#[derive(Debug)]
pub struct FlagVisibility {
    flag: FlagId,
    subscription: Option<SubscriptionId>,
    visible: Rc<Cell<bool>>,
}

impl FlagVisibility {
    pub fn bind(registry: &mut FlagRegistry, flag: FlagId, active_when_true: bool) -> Self {
        let visible = Rc::new(Cell::new(registry.is_active(flag) == active_when_true));
        let cell = Rc::clone(&visible);
        let subscription = registry.subscribe(flag, move |change| {
            cell.set(change.value == active_when_true);
        });
        Self {
            flag,
            subscription,
            visible,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn unbind(&mut self, registry: &mut FlagRegistry) {
        if let Some(subscription) = self.subscription.take() {
            registry.unsubscribe(self.flag, subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn recorder(registry: &mut FlagRegistry, id: FlagId) -> Rc<RefCell<Vec<bool>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        registry
            .subscribe(id, move |change| sink.borrow_mut().push(change.value))
            .expect("subscribe");
        seen
    }

    #[test]
    fn register_is_idempotent_by_name() {
        let mut registry = FlagRegistry::new();
        let a = registry.register("door_open", false);
        let b = registry.register("door_open", true);
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_active(a));
    }

    #[test]
    fn toggle_sets_true_and_notifies_once() {
        let mut registry = FlagRegistry::new();
        let id = registry.register("keys_found", false);
        let seen = recorder(&mut registry, id);

        assert!(registry.toggle(id));
        assert!(!registry.toggle(id));

        assert!(registry.is_active(id));
        assert_eq!(*seen.borrow(), vec![true]);
    }

    #[test]
    fn unchanged_value_does_not_notify() {
        let mut registry = FlagRegistry::new();
        let id = registry.register("quiet", false);
        let seen = recorder(&mut registry, id);

        assert!(!registry.set_active(id, false));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn subscribers_run_in_subscription_order() {
        let mut registry = FlagRegistry::new();
        let id = registry.register("ordered", false);
        let order = Rc::new(RefCell::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let sink = Rc::clone(&order);
            registry
                .subscribe(id, move |_| sink.borrow_mut().push(label))
                .expect("subscribe");
        }

        registry.set_active(id, true);

        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let mut registry = FlagRegistry::new();
        let id = registry.register("watched", false);
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        let subscription = registry
            .subscribe(id, move |_| sink.set(sink.get() + 1))
            .expect("subscribe");

        registry.set_active(id, true);
        assert!(registry.unsubscribe(id, subscription));
        assert!(!registry.unsubscribe(id, subscription));
        registry.set_active(id, false);

        assert_eq!(count.get(), 1);
        assert_eq!(registry.subscriber_count(id), 0);
    }

    #[test]
    fn reset_restores_declared_default() {
        let mut registry = FlagRegistry::new();
        let on_by_default = registry.register("lights", true);
        let off_by_default = registry.register("alarm", false);
        registry.set_active(on_by_default, false);
        registry.set_active(off_by_default, true);

        registry.reset_all();

        assert!(registry.is_active(on_by_default));
        assert!(!registry.is_active(off_by_default));
    }

    #[test]
    fn snapshot_and_restore_use_names() {
        let mut source = FlagRegistry::new();
        let quest = source.register("quest_started", false);
        source.register("keys_found", false);
        source.toggle(quest);

        let snapshot = source.snapshot();
        assert_eq!(snapshot.get("quest_started"), Some(&true));
        assert_eq!(snapshot.get("keys_found"), Some(&false));

        let mut target = FlagRegistry::new();
        let restored = target.register("quest_started", false);
        let seen = recorder(&mut target, restored);
        target.restore(&snapshot);

        assert!(target.is_active(restored));
        assert_eq!(*seen.borrow(), vec![true]);
    }

    #[test]
    fn visibility_follows_flag_with_polarity() {
        let mut registry = FlagRegistry::new();
        let id = registry.register("janitor_left", false);
        let mut shown_until_set = FlagVisibility::bind(&mut registry, id, false);
        let shown_after_set = FlagVisibility::bind(&mut registry, id, true);
        assert!(shown_until_set.is_visible());
        assert!(!shown_after_set.is_visible());

        registry.toggle(id);
        assert!(!shown_until_set.is_visible());
        assert!(shown_after_set.is_visible());

        shown_until_set.unbind(&mut registry);
        assert_eq!(registry.subscriber_count(id), 1);
    }
}
