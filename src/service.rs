use std::sync::Arc;

use tracing::debug;

use crate::error::StoreResult;
use crate::models::*;
use crate::paging::{resolve_total, Total};
use crate::repo::CardStore;

/// Request-facing operations over a [`CardStore`]. Payloads arrive validated.
#[derive(Clone)]
pub struct CardService {
    store: Arc<dyn CardStore>,
}

impl CardService {
    pub fn new(store: Arc<dyn CardStore>) -> Self {
        Self { store }
    }

    pub async fn create_card(&self, req: CreateCardRequest) -> StoreResult<()> {
        self.store.save(req.into()).await
    }

    pub async fn update_card(&self, req: UpdateCardRequest) -> StoreResult<()> {
        self.store.save(req.into()).await
    }

    pub async fn update_many_cards(&self, req: UpdateManyCardsRequest) -> StoreResult<()> {
        self.store.save_many(req.cards.into_iter().map(Card::from).collect()).await
    }

    pub async fn delete_card(&self, req: DeleteCardRequest) -> StoreResult<()> {
        self.store.delete(&req.card_id).await
    }

    pub async fn get_cards(&self, req: CardsRequest) -> StoreResult<CardsPage> {
        let filter = Filter::from(&req);
        let cards = self.store.find(&filter, req.page_index, req.page_size).await?;

        let total = match resolve_total(!req.card_ids.is_empty(), req.page_size, cards.len()) {
            Total::Exact(n) => n,
            Total::NeedsCount => {
                debug!(page_size = req.page_size, "page full, counting matches");
                self.store.count(&filter).await?
            }
        };

        Ok(CardsPage { cards: cards.into_iter().map(CardView::from).collect(), total })
    }
}
