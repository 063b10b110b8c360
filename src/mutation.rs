//! Turns card mutation payloads into document-level write operations.
//!
//! Each record yields an optional attachment pull followed by an upsert that
//! replaces the mutable fields, applies insert-only defaults on first write and
//! merges the surviving attachments by id. The upsert always comes after the
//! pull, so an id that is both removed and re-added ends up present.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::{Attachment, Card, CardId, CardType};

/// Mutable fields, replaced wholesale on every write.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    pub board_id: String,
    pub category_id: String,
    pub name: String,
    pub content: String,
    pub position: i32,
    pub tags: Vec<String>,
}

/// Write-once fields, only applied when the upsert creates the document.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertDefaults {
    pub owner_id: String,
    pub card_type: CardType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    PullAttachments {
        card_id: CardId,
        attachment_ids: Vec<String>,
    },
    Upsert {
        card_id: CardId,
        set: FieldSet,
        set_on_insert: InsertDefaults,
        add_to_set: Vec<Attachment>,
    },
}

impl WriteOp {
    pub fn card_id(&self) -> &str {
        match self {
            WriteOp::PullAttachments { card_id, .. } | WriteOp::Upsert { card_id, .. } => card_id,
        }
    }

    /// Applies the operation to the current state of its document.
    /// `None` means the document does not exist (before or after).
    pub fn apply(&self, current: Option<Card>) -> Option<Card> {
        match self {
            WriteOp::PullAttachments { attachment_ids, .. } => current.map(|mut card| {
                card.attachments.retain(|a| !attachment_ids.contains(&a.attachment_id));
                card
            }),
            WriteOp::Upsert { card_id, set, set_on_insert, add_to_set } => {
                let mut card = current.unwrap_or_else(|| Card {
                    card_id: card_id.clone(),
                    owner_id: set_on_insert.owner_id.clone(),
                    board_id: String::new(),
                    category_id: String::new(),
                    name: String::new(),
                    card_type: set_on_insert.card_type,
                    content: String::new(),
                    position: 0,
                    created_at: set_on_insert.created_at,
                    tags: Vec::new(),
                    attachments: Vec::new(),
                });
                card.board_id = set.board_id.clone();
                card.category_id = set.category_id.clone();
                card.name = set.name.clone();
                card.content = set.content.clone();
                card.position = set.position;
                card.tags = set.tags.clone();
                merge_attachments(&mut card.attachments, add_to_set);
                Some(card)
            }
        }
    }
}

/// Adds each attachment unless its id is already stored, in which case the
/// stored entry takes the incoming metadata.
pub fn merge_attachments(stored: &mut Vec<Attachment>, incoming: &[Attachment]) {
    for att in incoming {
        match stored.iter_mut().find(|s| s.attachment_id == att.attachment_id) {
            Some(existing) => existing.metadata = att.metadata.clone(),
            None => stored.push(Attachment { delete: false, ..att.clone() }),
        }
    }
}

/// Collapses repeated attachment ids, keeping the last occurrence.
fn dedup_last_wins(attachments: &[Attachment]) -> Vec<Attachment> {
    let mut seen = HashSet::new();
    let mut out: Vec<Attachment> = attachments
        .iter()
        .rev()
        .filter(|a| seen.insert(a.attachment_id.as_str()))
        .cloned()
        .collect();
    out.reverse();
    out
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePlan {
    pub ops: Vec<WriteOp>,
    pub records: usize,
}

impl WritePlan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

pub fn plan_one(card: &Card) -> Vec<WriteOp> {
    let attachments = dedup_last_wins(&card.attachments);
    let (removed, added): (Vec<_>, Vec<_>) = attachments.into_iter().partition(|a| a.delete);

    let mut ops = Vec::with_capacity(2);
    if !removed.is_empty() {
        ops.push(WriteOp::PullAttachments {
            card_id: card.card_id.clone(),
            attachment_ids: removed.into_iter().map(|a| a.attachment_id).collect(),
        });
    }
    ops.push(WriteOp::Upsert {
        card_id: card.card_id.clone(),
        set: FieldSet {
            board_id: card.board_id.clone(),
            category_id: card.category_id.clone(),
            name: card.name.clone(),
            content: card.content.clone(),
            position: card.position,
            tags: card.tags.clone(),
        },
        set_on_insert: InsertDefaults {
            owner_id: card.owner_id.clone(),
            card_type: card.card_type,
            created_at: card.created_at,
        },
        add_to_set: added,
    });
    ops
}

pub fn plan(cards: &[Card]) -> WritePlan {
    WritePlan {
        ops: cards.iter().flat_map(plan_one).collect(),
        records: cards.len(),
    }
}
