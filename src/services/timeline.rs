// SPDX-License-Identifier: MIT

//! Activity feed engine: posts, comments, likes, and pagination.
//!
//! Pagination is offset-less "load more": every page re-issues the ordered
//! query with a grown limit instead of resuming from a cursor, and the merge
//! into local state deduplicates by post id so a post landing between loads
//! cannot appear twice.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::db::collections::TIMELINE;
use crate::db::store::{server_timestamp, to_value, DocumentStore, FieldOp, Query};
use crate::error::{AppError, Result};
use crate::models::{Comment, Notification, NotificationKind, TimelinePost};
use crate::services::notifications::publish;
use crate::session::Session;
use crate::time_utils::now_rfc3339;

/// Local copy of a remotely-stored entity, tracking an in-flight optimistic
/// write.
///
/// An optimistic change is applied as `Pending` with the pre-change value
/// stashed for rollback; remote success confirms, remote failure reverts.
#[derive(Debug, Clone, PartialEq)]
pub enum Optimistic<T> {
    /// Matches the last remotely-confirmed state.
    Confirmed(T),
    /// Locally changed ahead of remote confirmation.
    Pending { value: T, rollback: T },
}

impl<T: Clone> Optimistic<T> {
    /// The locally-visible value.
    pub fn value(&self) -> &T {
        match self {
            Self::Confirmed(value) => value,
            Self::Pending { value, .. } => value,
        }
    }

    pub fn value_mut(&mut self) -> &mut T {
        match self {
            Self::Confirmed(value) => value,
            Self::Pending { value, .. } => value,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Apply an optimistic change. A change stacked on an already-pending
    /// entry keeps the original rollback value.
    pub fn apply(&mut self, value: T) {
        *self = match std::mem::replace(self, Self::Confirmed(value.clone())) {
            Self::Confirmed(previous) => Self::Pending {
                value,
                rollback: previous,
            },
            Self::Pending { rollback, .. } => Self::Pending { value, rollback },
        };
    }

    /// The remote write succeeded; the local value is now confirmed.
    pub fn confirm(&mut self) {
        if let Self::Pending { value, .. } = self {
            *self = Self::Confirmed(value.clone());
        }
    }

    /// The remote write failed; restore the pre-change value.
    pub fn revert(&mut self) {
        if let Self::Pending { rollback, .. } = self {
            *self = Self::Confirmed(rollback.clone());
        }
    }
}

/// Observable feed state.
#[derive(Debug, Clone)]
pub struct FeedState {
    /// Newest first.
    pub posts: Vec<Optimistic<TimelinePost>>,
    pub loading: bool,
    /// Heuristic: true exactly when the last load returned a full page.
    /// Can cost one extra empty fetch at the true end of the feed.
    pub has_more: bool,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            posts: Vec::new(),
            loading: true,
            has_more: true,
        }
    }
}

impl FeedState {
    /// The posts as the UI sees them.
    pub fn visible_posts(&self) -> Vec<TimelinePost> {
        self.posts.iter().map(|entry| entry.value().clone()).collect()
    }
}

/// Paginated activity feed, optionally filtered to a single author.
pub struct Timeline {
    store: Arc<dyn DocumentStore>,
    session: Session,
    page_size: usize,
    author: Option<String>,
    state: Arc<watch::Sender<FeedState>>,
    pages_loaded: AtomicUsize,
}

impl Timeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        session: Session,
        page_size: usize,
        author: Option<String>,
    ) -> Self {
        let (tx, _) = watch::channel(FeedState::default());
        Self {
            store,
            session,
            page_size,
            author,
            state: Arc::new(tx),
            pages_loaded: AtomicUsize::new(0),
        }
    }

    /// Observe feed state changes.
    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    /// Current feed state.
    pub fn current(&self) -> FeedState {
        self.state.borrow().clone()
    }

    /// Load the first page, or grow the window by one page.
    ///
    /// Read failures degrade to the current state instead of surfacing; the
    /// feed is a read path and the caller has nothing to roll back.
    pub async fn load_posts(&self, initial: bool) {
        if !initial && !self.state.borrow().has_more {
            return;
        }

        let pages = if initial {
            1
        } else {
            self.pages_loaded.load(Ordering::SeqCst) + 1
        };
        let limit = pages * self.page_size;

        let mut query = Query::collection(TIMELINE)
            .order_by_desc("created_at")
            .limit(limit);
        if let Some(author) = &self.author {
            query = query.filter_eq("user_id", json!(author));
        }

        let docs = match self.store.query(&query).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load posts");
                self.state.send_modify(|state| state.loading = false);
                return;
            }
        };

        let fetched: Vec<TimelinePost> = docs
            .iter()
            .filter_map(|doc| match doc.decode() {
                Ok(post) => Some(post),
                Err(e) => {
                    tracing::warn!(error = %e, id = %doc.id, "Skipping undecodable post");
                    None
                }
            })
            .collect();
        let full_page = fetched.len() == limit;

        self.state.send_modify(|state| {
            state.posts = if initial {
                fetched.into_iter().map(Optimistic::Confirmed).collect()
            } else {
                merge_pages(&state.posts, fetched)
            };
            state.has_more = full_page;
            state.loading = false;
        });
        self.pages_loaded.store(pages, Ordering::SeqCst);
    }

    /// Grow the feed window by one page.
    pub async fn load_more(&self) {
        self.load_posts(false).await;
    }

    /// Create a post.
    ///
    /// The remote write carries a server-assigned creation time; the local
    /// copy prepended afterwards uses the client clock. The two can diverge
    /// and no reconciliation pass corrects it.
    pub async fn add_post(
        &self,
        content: &str,
        movie: Option<(u64, &str)>,
    ) -> Result<TimelinePost> {
        let identity = self.session.require()?;
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("post content is empty".to_string()));
        }

        let mut fields = serde_json::Map::new();
        fields.insert("user_id".to_string(), json!(identity.id));
        fields.insert("user_email".to_string(), json!(identity.email));
        fields.insert("content".to_string(), json!(content));
        fields.insert("created_at".to_string(), server_timestamp());
        fields.insert("likes".to_string(), json!([]));
        fields.insert("comments".to_string(), json!([]));
        if let Some((movie_id, movie_title)) = movie {
            fields.insert("movie_id".to_string(), json!(movie_id));
            fields.insert("movie_title".to_string(), json!(movie_title));
        }

        let id = self.store.create(TIMELINE, fields).await?;

        let post = TimelinePost {
            id,
            user_id: identity.id,
            user_email: identity.email,
            content: content.to_string(),
            created_at: now_rfc3339(),
            likes: Vec::new(),
            comments: Vec::new(),
            movie_id: movie.map(|(id, _)| id),
            movie_title: movie.map(|(_, title)| title.to_string()),
        };

        self.state.send_modify(|state| {
            state.posts.insert(0, Optimistic::Confirmed(post.clone()));
        });
        Ok(post)
    }

    /// Append a comment to a post.
    ///
    /// The comment carries a client-generated id and client clock; the remote
    /// append is a union-insert keyed by the full value, so a retry cannot
    /// duplicate it. The same comment is mirrored into local state on
    /// success.
    pub async fn add_comment(&self, post_id: &str, content: &str) -> Result<Comment> {
        let identity = self.session.require()?;
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("comment content is empty".to_string()));
        }

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            user_id: identity.id.clone(),
            user_email: identity.email.clone(),
            content: content.to_string(),
            created_at: now_rfc3339(),
        };

        self.store
            .update(
                TIMELINE,
                post_id,
                vec![(
                    "comments".to_string(),
                    FieldOp::ArrayUnion(to_value(&comment)?),
                )],
            )
            .await?;

        let mut post_author: Option<(String, String)> = None;
        self.state.send_modify(|state| {
            if let Some(entry) = state
                .posts
                .iter_mut()
                .find(|entry| entry.value().id == post_id)
            {
                post_author = Some((
                    entry.value().user_id.clone(),
                    entry.value().content.clone(),
                ));
                entry.value_mut().comments.push(comment.clone());
            }
        });

        if let Some((author_id, post_content)) = post_author {
            if author_id != identity.id {
                publish(
                    self.store.as_ref(),
                    Notification::new(
                        NotificationKind::Comment {
                            post_id: post_id.to_string(),
                            post_content,
                        },
                        &identity.id,
                        &identity.email,
                        &author_id,
                    ),
                )
                .await;
            }
        }

        Ok(comment)
    }

    /// Flip the signed-in user's like on a post.
    ///
    /// The flip is applied optimistically, then the matching union/remove
    /// update is issued; failure rolls the local state back and surfaces the
    /// error. The remote operation is idempotent, so callers may retry, but
    /// nothing here retries automatically. Unknown post ids are a silent
    /// no-op.
    pub async fn toggle_like(&self, post_id: &str) -> Result<()> {
        let identity = self.session.require()?;

        let mut was_liked: Option<bool> = None;
        let mut post_author: Option<(String, String)> = None;
        self.state.send_modify(|state| {
            if let Some(entry) = state
                .posts
                .iter_mut()
                .find(|entry| entry.value().id == post_id)
            {
                let liked = entry.value().liked_by(&identity.id);
                let mut next = entry.value().clone();
                if liked {
                    next.likes.retain(|id| id != &identity.id);
                } else {
                    next.likes.push(identity.id.clone());
                }
                post_author = Some((next.user_id.clone(), next.content.clone()));
                entry.apply(next);
                was_liked = Some(liked);
            }
        });
        let Some(was_liked) = was_liked else {
            return Ok(());
        };

        let op = if was_liked {
            FieldOp::ArrayRemove(json!(identity.id))
        } else {
            FieldOp::ArrayUnion(json!(identity.id))
        };

        match self
            .store
            .update(TIMELINE, post_id, vec![("likes".to_string(), op)])
            .await
        {
            Ok(()) => {
                self.resolve_pending(post_id, true);
                if !was_liked {
                    if let Some((author_id, post_content)) = post_author {
                        if author_id != identity.id {
                            publish(
                                self.store.as_ref(),
                                Notification::new(
                                    NotificationKind::Like {
                                        post_id: post_id.to_string(),
                                        post_content,
                                    },
                                    &identity.id,
                                    &identity.email,
                                    &author_id,
                                ),
                            )
                            .await;
                        }
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.resolve_pending(post_id, false);
                Err(e)
            }
        }
    }

    fn resolve_pending(&self, post_id: &str, confirmed: bool) {
        self.state.send_modify(|state| {
            if let Some(entry) = state
                .posts
                .iter_mut()
                .find(|entry| entry.value().id == post_id)
            {
                if confirmed {
                    entry.confirm();
                } else {
                    entry.revert();
                }
            }
        });
    }
}

/// Merge a freshly-fetched window into the existing feed.
///
/// Pending local entries the query does not know about yet are kept in
/// front; fetched posts are appended in query order, skipping ids already
/// present.
fn merge_pages(
    existing: &[Optimistic<TimelinePost>],
    fetched: Vec<TimelinePost>,
) -> Vec<Optimistic<TimelinePost>> {
    let fetched_ids: HashSet<&str> = fetched.iter().map(|post| post.id.as_str()).collect();

    let mut merged: Vec<Optimistic<TimelinePost>> = existing
        .iter()
        .filter(|entry| entry.is_pending() && !fetched_ids.contains(entry.value().id.as_str()))
        .cloned()
        .collect();

    let mut seen: HashSet<String> = merged
        .iter()
        .map(|entry| entry.value().id.clone())
        .collect();
    for post in fetched {
        if seen.insert(post.id.clone()) {
            merged.push(Optimistic::Confirmed(post));
        }
    }
    merged
}
