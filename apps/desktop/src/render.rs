use std::fmt::Write as _;

use client_core::{OrderedItem, ReorderNotice, ReorderStatus, ReorderView};
use shared::protocol::{ChapterSummary, ContentItemSummary, ModuleSummary};

/// One-line label for an item of an ordered list.
pub trait Labelled: OrderedItem {
    fn label(&self) -> String;
}

impl Labelled for ModuleSummary {
    fn label(&self) -> String {
        self.title.clone()
    }
}

impl Labelled for ChapterSummary {
    fn label(&self) -> String {
        match self.module_id {
            Some(module_id) => format!("{} (module {module_id})", self.title),
            None => self.title.clone(),
        }
    }
}

impl Labelled for ContentItemSummary {
    fn label(&self) -> String {
        format!("{} [{}]", self.title, self.kind.as_str())
    }
}

pub fn describe_state<T>(view: &ReorderView<T>) -> &'static str {
    match view.status {
        ReorderStatus::Pending if view.is_saving => "saving",
        ReorderStatus::Pending => "save queued",
        ReorderStatus::Success => "saved",
        ReorderStatus::Error => "save failed, order reverted",
        ReorderStatus::Idle if view.pending_changes && view.is_reorder_mode => {
            "reorder mode, unsaved changes"
        }
        ReorderStatus::Idle if view.pending_changes => "unsaved changes",
        ReorderStatus::Idle if view.is_reorder_mode => "reorder mode",
        ReorderStatus::Idle => "up to date",
    }
}

pub fn status_line<T>(view: &ReorderView<T>) -> String {
    format!("{}: {}", view.scope, describe_state(view))
}

pub fn render_list<T: Labelled>(view: &ReorderView<T>) -> String {
    let mut out = status_line(view);
    if view.items.is_empty() {
        out.push_str("\n  (empty)");
    }
    for (index, item) in view.items.iter().enumerate() {
        let _ = write!(out, "\n  {:>2}. [{}] {}", index + 1, item.item_id(), item.label());
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unreachable,
    Rejected,
    Other,
}

impl FailureKind {
    pub fn summary(self) -> &'static str {
        match self {
            FailureKind::Unreachable => "server unreachable",
            FailureKind::Rejected => "server rejected the new order",
            FailureKind::Other => "save failed",
        }
    }
}

pub fn classify_failure(message: &str) -> FailureKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("error sending request")
        || lower.contains("connection refused")
        || lower.contains("failed to connect")
        || lower.contains("timed out")
    {
        return FailureKind::Unreachable;
    }
    if lower.contains("server rejected request") || lower.contains("validation") {
        return FailureKind::Rejected;
    }
    FailureKind::Other
}

pub fn describe_notice(notice: &ReorderNotice) -> String {
    match notice {
        ReorderNotice::Saved {
            scope,
            ordered_item_ids,
        } => format!("{scope}: saved order {ordered_item_ids:?}"),
        ReorderNotice::Failed { scope, message } => format!(
            "{scope}: {}, order reverted ({message})",
            classify_failure(message).summary()
        ),
    }
}
