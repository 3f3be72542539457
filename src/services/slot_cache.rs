use crate::models::{Slot, SlotId, SlotSpan};

/// Slots of one teacher, kept ordered by `(date, start_time)`.
///
/// Every mutation preserves the ordering. Ids are unique; a temporary
/// placeholder may share its span with a confirmed slot only until the
/// reconciler collapses the two.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotCache {
    slots: Vec<Slot>,
}

impl SlotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: Vec<Slot>) -> Self {
        let mut cache = Self::new();
        cache.replace_all(slots);
        cache
    }

    /// Stable ordered insert: a slot lands after existing slots with the same
    /// key. Returns `false` when the id is already present.
    pub fn insert(&mut self, slot: Slot) -> bool {
        if self.contains(&slot.id) {
            return false;
        }
        let key = slot.order_key();
        let at = self.slots.partition_point(|s| s.order_key() <= key);
        self.slots.insert(at, slot);
        true
    }

    pub fn remove(&mut self, id: &SlotId) -> Option<Slot> {
        let pos = self.slots.iter().position(|s| &s.id == id)?;
        Some(self.slots.remove(pos))
    }

    /// Full resync from the pull endpoint. Temporary entries survive unless a
    /// confirmed slot in `incoming` covers the same span.
    pub fn replace_all(&mut self, incoming: Vec<Slot>) {
        let unconfirmed: Vec<Slot> = self
            .slots
            .drain(..)
            .filter(|s| s.is_temporary())
            .filter(|temp| {
                !incoming
                    .iter()
                    .any(|s| !s.is_temporary() && s.same_span(temp))
            })
            .collect();

        let mut incoming = incoming;
        incoming.sort_by_key(Slot::order_key);
        for slot in incoming.into_iter().chain(unconfirmed) {
            self.insert(slot);
        }
    }

    pub fn find<P>(&self, mut predicate: P) -> Option<&Slot>
    where
        P: FnMut(&Slot) -> bool,
    {
        self.slots.iter().find(|s| predicate(s))
    }

    pub fn find_span(&self, span: &SlotSpan) -> Option<&Slot> {
        self.find(|s| s.span() == *span)
    }

    pub fn get(&self, id: &SlotId) -> Option<&Slot> {
        self.find(|s| &s.id == id)
    }

    pub fn contains(&self, id: &SlotId) -> bool {
        self.get(id).is_some()
    }

    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&Slot) -> bool,
    {
        self.slots.retain(f);
    }

    pub fn to_ordered_list(&self) -> Vec<Slot> {
        self.slots.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
