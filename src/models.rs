use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CardId = String;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardType {
    #[default]
    Text,
    Checklist,
    Image,
    File,
    Link,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Text => "TEXT",
            CardType::Checklist => "CHECKLIST",
            CardType::Image => "IMAGE",
            CardType::File => "FILE",
            CardType::Link => "LINK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(CardType::Text),
            "CHECKLIST" => Some(CardType::Checklist),
            "IMAGE" => Some(CardType::Image),
            "FILE" => Some(CardType::File),
            "LINK" => Some(CardType::Link),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub attachment_id: String,
    pub metadata: String,
    #[serde(skip)]
    pub delete: bool, // request-only removal marker, never persisted
}

impl Attachment {
    pub fn new(attachment_id: impl Into<String>, metadata: impl Into<String>) -> Self {
        Self { attachment_id: attachment_id.into(), metadata: metadata.into(), delete: false }
    }

    pub fn removal(attachment_id: impl Into<String>) -> Self {
        Self { attachment_id: attachment_id.into(), metadata: String::new(), delete: true }
    }
}

/// The persisted aggregate. Also used as the mutation payload handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub card_id: CardId,
    pub owner_id: String,
    pub board_id: String,
    pub category_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub content: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub card_ids: Vec<CardId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<CardType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub board_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category_ids: Vec<String>,
}

// ---------------- request payloads (already validated upstream) ----------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttachment {
    pub attachment_id: String,
    pub metadata: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCardRequest {
    pub card_id: CardId,
    pub owner_id: String,
    pub board_id: String,
    pub category_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub content: String,
    pub position: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAttachment {
    pub attachment_id: String,
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub delete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCardRequest {
    pub card_id: CardId,
    pub board_id: String,
    pub category_id: String,
    pub name: String,
    pub content: String,
    pub position: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<UpdateAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateManyCardsRequest {
    pub cards: Vec<UpdateCardRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteCardRequest {
    pub card_id: CardId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardsRequest {
    #[serde(default)]
    pub card_ids: Vec<CardId>,
    #[serde(default)]
    pub types: Vec<CardType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub owner_ids: Vec<String>,
    #[serde(default)]
    pub board_ids: Vec<String>,
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub page_index: u64,
    #[serde(default)]
    pub page_size: u32,
}

impl From<CreateCardRequest> for Card {
    fn from(req: CreateCardRequest) -> Self {
        Card {
            card_id: req.card_id,
            owner_id: req.owner_id,
            board_id: req.board_id,
            category_id: req.category_id,
            name: req.name,
            card_type: req.card_type,
            content: req.content,
            position: req.position,
            created_at: Utc::now(),
            tags: req.tags,
            attachments: req
                .attachments
                .into_iter()
                .map(|a| Attachment::new(a.attachment_id, a.metadata))
                .collect(),
        }
    }
}

/// Update payloads carry no owner/type; those stay at defaults and only take
/// effect if the update is the first write for this card id.
impl From<UpdateCardRequest> for Card {
    fn from(req: UpdateCardRequest) -> Self {
        Card {
            card_id: req.card_id,
            owner_id: String::new(),
            board_id: req.board_id,
            category_id: req.category_id,
            name: req.name,
            card_type: CardType::default(),
            content: req.content,
            position: req.position,
            created_at: Utc::now(),
            tags: req.tags,
            attachments: req
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    attachment_id: a.attachment_id,
                    metadata: a.metadata,
                    delete: a.delete,
                })
                .collect(),
        }
    }
}

impl From<&CardsRequest> for Filter {
    fn from(req: &CardsRequest) -> Self {
        Filter {
            card_ids: req.card_ids.clone(),
            types: req.types.clone(),
            tags: req.tags.clone(),
            owner_ids: req.owner_ids.clone(),
            board_ids: req.board_ids.clone(),
            category_ids: req.category_ids.clone(),
        }
    }
}

// ---------------- response projection ----------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentView {
    pub attachment_id: String,
    pub metadata: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardView {
    pub card_id: CardId,
    pub owner_id: String,
    pub board_id: String,
    pub category_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub content: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub attachments: Vec<AttachmentView>,
}

impl From<Card> for CardView {
    fn from(c: Card) -> Self {
        CardView {
            card_id: c.card_id,
            owner_id: c.owner_id,
            board_id: c.board_id,
            category_id: c.category_id,
            name: c.name,
            card_type: c.card_type,
            content: c.content,
            position: c.position,
            created_at: c.created_at,
            tags: c.tags,
            attachments: c
                .attachments
                .into_iter()
                .map(|a| AttachmentView { attachment_id: a.attachment_id, metadata: a.metadata })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardsPage {
    pub cards: Vec<CardView>,
    pub total: u64,
}
