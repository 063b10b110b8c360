//! Translates a [`Filter`] into a store-agnostic [`Predicate`].
//!
//! A predicate is the AND of "field ∈ values" constraints, one per non-empty
//! filter list. Backends either evaluate it in process ([`Predicate::matches`])
//! or render it into their own query language.

use crate::models::{Card, Filter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardField {
    CardId,
    Type,
    Tags,
    OwnerId,
    BoardId,
    CategoryId,
}

impl CardField {
    pub fn column(&self) -> &'static str {
        match self {
            CardField::CardId => "card_id",
            CardField::Type => "type",
            CardField::Tags => "tags",
            CardField::OwnerId => "owner_id",
            CardField::BoardId => "board_id",
            CardField::CategoryId => "category_id",
        }
    }

    /// Multi-valued fields match when any element is in the constraint list.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, CardField::Tags)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub field: CardField,
    pub values: Vec<String>,
}

impl Constraint {
    fn matches(&self, card: &Card) -> bool {
        let has = |v: &str| self.values.iter().any(|x| x == v);
        match self.field {
            CardField::CardId => has(&card.card_id),
            CardField::Type => has(card.card_type.as_str()),
            CardField::Tags => card.tags.iter().any(|t| has(t)),
            CardField::OwnerId => has(&card.owner_id),
            CardField::BoardId => has(&card.board_id),
            CardField::CategoryId => has(&card.category_id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    constraints: Vec<Constraint>,
}

impl Predicate {
    /// Matches every card.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn is_unconstrained(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn matches(&self, card: &Card) -> bool {
        self.constraints.iter().all(|c| c.matches(card))
    }

    fn push(&mut self, field: CardField, values: Vec<String>) {
        if !values.is_empty() {
            self.constraints.push(Constraint { field, values });
        }
    }
}

pub fn build(filter: &Filter) -> Predicate {
    let mut p = Predicate::all();
    p.push(CardField::CardId, filter.card_ids.clone());
    p.push(CardField::Type, filter.types.iter().map(|t| t.as_str().to_string()).collect());
    p.push(CardField::Tags, filter.tags.clone());
    p.push(CardField::OwnerId, filter.owner_ids.clone());
    p.push(CardField::BoardId, filter.board_ids.clone());
    p.push(CardField::CategoryId, filter.category_ids.clone());
    p
}
