use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::ClientError;
use crate::entries::repo_types::Sticker;

/// A day card as the API returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayCard {
    pub id: Uuid,
    pub date: String,
    pub caption: Option<String>,
    pub photo_path: Option<String>,
    pub photo_url: Option<String>,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// What the user is trying to save.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCardDraft {
    #[serde(skip)]
    pub date: String,
    pub caption: Option<String>,
    pub photo_path: Option<String>,
    pub stickers: Vec<Sticker>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayCardState {
    pub date: Option<String>,
    pub card: Option<DayCard>,
    pub loading: bool,
    /// Set while an optimistic write is in flight.
    pub pending: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait EntryBackend: Send + Sync {
    async fn fetch_day_card(&self, date: &str) -> Result<Option<DayCard>, ClientError>;
    async fn upsert_day_card(&self, draft: &DayCardDraft) -> Result<DayCard, ClientError>;
}

/// State of the day card being viewed or edited, published through a `watch`
/// channel. Writes are optimistic: the draft shows at once with `pending` set,
/// then gets replaced by the server's copy or rolled back.
pub struct DayCardStore {
    backend: Arc<dyn EntryBackend>,
    state: watch::Sender<DayCardState>,
    editing: AtomicBool,
    generation: AtomicU64,
}

/// Same cleanup the server applies: trimmed, blank becomes `None`.
fn clean_caption(caption: Option<&str>) -> Option<String> {
    caption.map(str::trim).filter(|c| !c.is_empty()).map(str::to_string)
}

fn optimistic(previous: Option<&DayCard>, draft: &DayCardDraft) -> DayCard {
    let same_day = previous.filter(|c| c.date == draft.date);
    DayCard {
        id: same_day.map(|c| c.id).unwrap_or_else(Uuid::nil),
        date: draft.date.clone(),
        caption: clean_caption(draft.caption.as_deref()),
        photo_path: draft.photo_path.clone(),
        // Keep the old URL only while it still points at the same photo.
        photo_url: same_day
            .filter(|c| c.photo_path == draft.photo_path)
            .and_then(|c| c.photo_url.clone()),
        stickers: draft.stickers.clone(),
        is_favorite: same_day.map(|c| c.is_favorite).unwrap_or(false),
        created_at: same_day.and_then(|c| c.created_at.clone()),
        updated_at: same_day.and_then(|c| c.updated_at.clone()),
    }
}

impl DayCardStore {
    pub fn new(backend: Arc<dyn EntryBackend>) -> Self {
        let (state, _) = watch::channel(DayCardState::default());
        Self {
            backend,
            state,
            editing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DayCardState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DayCardState {
        self.state.borrow().clone()
    }

    /// While editing, background loads are skipped so they cannot clobber
    /// the form.
    pub fn set_editing(&self, editing: bool) {
        self.editing.store(editing, Ordering::SeqCst);
    }

    pub fn is_editing(&self) -> bool {
        self.editing.load(Ordering::SeqCst)
    }

    fn is_current(&self, date: &str) -> bool {
        self.state.borrow().date.as_deref() == Some(date)
    }

    /// Fetch the card for `date`. A missing card is an empty state, not an
    /// error. Results that arrive after a newer write, or after the view
    /// moved to another date, are dropped.
    pub async fn load(&self, date: &str) {
        if self.is_editing() {
            debug!(date, "load skipped while editing");
            return;
        }
        let generation = self.generation.load(Ordering::SeqCst);
        self.state.send_modify(|s| {
            if s.date.as_deref() != Some(date) {
                // A write still in flight belongs to the date being left.
                s.card = None;
                s.pending = false;
            }
            s.date = Some(date.to_string());
            s.loading = true;
            s.error = None;
        });

        let result = self.backend.fetch_day_card(date).await;

        if self.generation.load(Ordering::SeqCst) != generation || !self.is_current(date) {
            debug!(date, "stale day card fetch discarded");
            return;
        }
        self.state.send_modify(|s| {
            s.loading = false;
            match result {
                Ok(card) => s.card = card,
                Err(e) => {
                    warn!(error = %e, date, "day card fetch failed");
                    s.error = Some(e.user_message());
                }
            }
        });
    }

    /// Save `draft` optimistically. Returns the stored card, or `None` when
    /// the save failed; the reason is left in the state's `error`.
    ///
    /// The outcome only rewrites the state while this is still the latest
    /// write and the view still shows `draft.date`. Otherwise a failure is
    /// reported through `error` and the newer view is kept.
    pub async fn upsert(&self, draft: DayCardDraft) -> Option<DayCard> {
        let before = self.snapshot();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let guess = optimistic(before.card.as_ref(), &draft);
        self.state.send_replace(DayCardState {
            date: Some(draft.date.clone()),
            card: Some(guess),
            loading: false,
            pending: true,
            error: None,
        });

        let result = self.backend.upsert_day_card(&draft).await;
        let owns_view = self.generation.load(Ordering::SeqCst) == generation && self.is_current(&draft.date);

        match result {
            Ok(saved) => {
                if owns_view {
                    self.state.send_modify(|s| {
                        s.card = Some(saved.clone());
                        s.pending = false;
                        s.error = None;
                    });
                } else {
                    debug!(date = %draft.date, "save landed after the view moved on");
                }
                Some(saved)
            }
            Err(e) if owns_view => {
                warn!(error = %e, date = %draft.date, "day card save failed, rolling back");
                let mut restored = before;
                restored.error = Some(e.user_message());
                self.state.send_replace(restored);
                None
            }
            Err(e) => {
                warn!(error = %e, date = %draft.date, "day card save failed after the view moved on");
                self.state.send_modify(|s| s.error = Some(e.user_message()));
                None
            }
        }
    }
}
