use shared::protocol::{ChapterSummary, ContentItemSummary, ModuleSummary};

/// An element of a reorderable sequence. Position is implied by its index.
pub trait OrderedItem: Clone + PartialEq + Send + Sync + 'static {
    fn item_id(&self) -> i64;
}

impl OrderedItem for ModuleSummary {
    fn item_id(&self) -> i64 {
        self.module_id.0
    }
}

impl OrderedItem for ChapterSummary {
    fn item_id(&self) -> i64 {
        self.chapter_id.0
    }
}

impl OrderedItem for ContentItemSummary {
    fn item_id(&self) -> i64 {
        self.content_item_id.0
    }
}

/// A single user-requested move together with the full order it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderOperation {
    pub moved_item_id: i64,
    pub from_index: usize,
    pub to_index: usize,
    pub ordered_item_ids: Vec<i64>,
}

/// Removes the element at `from` and reinserts it at `to`.
///
/// Returns `None` for a no-op move or an index outside the sequence.
pub fn array_move<T: Clone>(items: &[T], from: usize, to: usize) -> Option<Vec<T>> {
    if from == to || from >= items.len() || to >= items.len() {
        return None;
    }
    let mut next = items.to_vec();
    let moved = next.remove(from);
    next.insert(to, moved);
    Some(next)
}

/// Validates a move against the current sequence and produces the new one.
///
/// The item at `from` must carry `moved_item_id`, otherwise the request was
/// built against a stale view and is dropped.
pub fn plan_move<T: OrderedItem>(
    items: &[T],
    moved_item_id: i64,
    from: usize,
    to: usize,
) -> Option<(Vec<T>, ReorderOperation)> {
    if items.get(from)?.item_id() != moved_item_id {
        return None;
    }
    let next = array_move(items, from, to)?;
    let operation = ReorderOperation {
        moved_item_id,
        from_index: from,
        to_index: to,
        ordered_item_ids: item_ids(&next),
    };
    Some((next, operation))
}

/// Resolves a drag-and-drop gesture to `(from, to)` indices by id lookup.
pub fn drag_indices<T: OrderedItem>(
    items: &[T],
    active_id: i64,
    over_id: Option<i64>,
) -> Option<(usize, usize)> {
    let over_id = over_id?;
    if active_id == over_id {
        return None;
    }
    let from = position_of(items, active_id)?;
    let to = position_of(items, over_id)?;
    Some((from, to))
}

pub fn position_of<T: OrderedItem>(items: &[T], item_id: i64) -> Option<usize> {
    items.iter().position(|item| item.item_id() == item_id)
}

pub fn item_ids<T: OrderedItem>(items: &[T]) -> Vec<i64> {
    items.iter().map(OrderedItem::item_id).collect()
}
