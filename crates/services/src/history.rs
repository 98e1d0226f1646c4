use std::sync::Arc;

use reading_core::analytics::{self, AnalyticsView};
use reading_core::model::{BookId, ReadingSession, SessionForm, SessionId};
use reading_core::organize::{
    self, DateFilter, GroupBy, OrganizeOptions, PageInfo, SessionView, SortOrder,
};
use reading_core::{Clock, Zone};
use storage::repository::{SessionRepository, StorageError};

use crate::error::HistoryError;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Page sizes offered to the user.
pub const PAGE_SIZE_CHOICES: [u32; 3] = [5, 10, 20];

/// Page size used when walking the whole collection for analytics.
const ANALYTICS_PAGE_SIZE: u32 = 100;

/// Browses persisted sessions page by page and supports delete with a single
/// level of undo.
///
/// Rows are fetched from the repository; filtering, sorting and grouping are
/// applied to the current page only.
pub struct SessionHistoryService {
    repo: Arc<dyn SessionRepository>,
    clock: Clock,
    zone: Zone,
    book: Option<BookId>,
    options: OrganizeOptions,
    page: PageInfo,
    rows: Vec<ReadingSession>,
    loaded: bool,
    last_deleted: Option<ReadingSession>,
}

impl SessionHistoryService {
    /// # Errors
    ///
    /// Returns `HistoryError::InvalidPage` if `DEFAULT_PAGE_SIZE` is zero.
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        clock: Clock,
        zone: Zone,
    ) -> Result<Self, HistoryError> {
        Ok(Self {
            repo,
            clock,
            zone,
            book: None,
            options: OrganizeOptions::default(),
            page: PageInfo::new(1, DEFAULT_PAGE_SIZE, 0)?,
            rows: Vec::new(),
            loaded: false,
            last_deleted: None,
        })
    }

    /// Restrict rows and analytics to one book.
    #[must_use]
    pub fn for_book(mut self, book_id: BookId) -> Self {
        self.book = Some(book_id);
        self
    }

    /// # Errors
    ///
    /// Returns `HistoryError::InvalidPage` for a zero size.
    pub fn with_page_size(mut self, size: u32) -> Result<Self, HistoryError> {
        self.page = PageInfo::new(1, size, 0)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_options(mut self, options: OrganizeOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn book(&self) -> Option<BookId> {
        self.book
    }

    #[must_use]
    pub fn options(&self) -> OrganizeOptions {
        self.options
    }

    #[must_use]
    pub fn page(&self) -> PageInfo {
        self.page
    }

    #[must_use]
    pub fn rows(&self) -> &[ReadingSession] {
        &self.rows
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.last_deleted.is_some()
    }

    /// Organized view of the rows currently held.
    #[must_use]
    pub fn view(&self) -> SessionView {
        organize::organize(
            &self.rows,
            &self.options,
            self.page,
            self.clock.now(),
            self.zone,
        )
    }

    fn keep_for_book(&self, sessions: Vec<ReadingSession>) -> Vec<ReadingSession> {
        match self.book {
            Some(book_id) => sessions
                .into_iter()
                .filter(|s| s.book_id() == book_id)
                .collect(),
            None => sessions,
        }
    }

    /// Fetch a page without touching the current state.
    async fn fetch(
        &self,
        number: u32,
        size: u32,
    ) -> Result<(PageInfo, Vec<ReadingSession>), HistoryError> {
        PageInfo::new(number, size, 0)?;
        let fetched = self.repo.list_sessions(number, size).await.map_err(|e| {
            tracing::warn!(page = number, error = %e, "failed to load sessions");
            HistoryError::Load(e)
        })?;
        let page = PageInfo::new(number, size, fetched.count)?;
        tracing::debug!(
            page = number,
            rows = fetched.results.len(),
            total = fetched.count,
            "loaded session page"
        );
        Ok((page, self.keep_for_book(fetched.results)))
    }

    fn apply(&mut self, page: PageInfo, rows: Vec<ReadingSession>) -> SessionView {
        self.page = page;
        self.rows = rows;
        self.loaded = true;
        self.view()
    }

    /// Fetch page `number` and make it current.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::InvalidPage` for page 0 and `HistoryError::Load` if the
    /// repository call fails; previously loaded rows are kept on failure.
    pub async fn load_page(&mut self, number: u32) -> Result<SessionView, HistoryError> {
        let (page, rows) = self.fetch(number, self.page.size()).await?;
        Ok(self.apply(page, rows))
    }

    /// Reload the current page.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Load` if the repository call fails.
    pub async fn refresh(&mut self) -> Result<SessionView, HistoryError> {
        self.load_page(self.page.number()).await
    }

    /// # Errors
    ///
    /// Returns `HistoryError::PageOutOfRange` for page 0 or a page past the last
    /// known page, and `HistoryError::Load` if the repository call fails.
    pub async fn go_to_page(&mut self, number: u32) -> Result<SessionView, HistoryError> {
        if self.loaded && number == self.page.number() {
            return Ok(self.view());
        }
        let last = self.page.total_pages().max(1);
        if number == 0 || (self.loaded && u64::from(number) > last) {
            return Err(HistoryError::PageOutOfRange { page: number });
        }
        self.load_page(number).await
    }

    /// Change the page size and go back to the first page.
    ///
    /// Nothing changes unless the first page at the new size loads.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::InvalidPage` for a zero size and `HistoryError::Load`
    /// if the repository call fails.
    pub async fn set_page_size(&mut self, size: u32) -> Result<SessionView, HistoryError> {
        let (page, rows) = self.fetch(1, size).await?;
        Ok(self.apply(page, rows))
    }

    /// # Errors
    ///
    /// Returns `HistoryError::Load` if the repository call fails; the previous
    /// order is kept.
    pub async fn set_sort(&mut self, sort: SortOrder) -> Result<SessionView, HistoryError> {
        let (page, rows) = self.fetch(self.page.number(), self.page.size()).await?;
        self.options.sort = sort;
        Ok(self.apply(page, rows))
    }

    /// # Errors
    ///
    /// Returns `HistoryError::Load` if the repository call fails; the previous
    /// filter is kept.
    pub async fn set_filter(&mut self, filter: DateFilter) -> Result<SessionView, HistoryError> {
        let (page, rows) = self.fetch(self.page.number(), self.page.size()).await?;
        self.options.filter = filter;
        Ok(self.apply(page, rows))
    }

    /// Regroup the current rows; nothing is fetched.
    pub fn set_group_by(&mut self, group_by: GroupBy) -> SessionView {
        self.options.group_by = group_by;
        self.view()
    }

    /// Reload after a mutation, stepping back a page if the current one emptied out.
    async fn reload(&mut self) -> Result<SessionView, HistoryError> {
        match self.refresh().await {
            Err(HistoryError::Load(StorageError::NotFound)) if self.page.number() > 1 => {
                self.load_page(self.page.number() - 1).await
            }
            other => other,
        }
    }

    /// Delete a session shown on the current page, keeping it for `undo_delete`.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::NotOnPage` if the session is not among the current
    /// rows and `HistoryError::Delete` if the repository call fails, in which case
    /// the undo slot keeps its previous content.
    pub async fn delete_session(&mut self, id: SessionId) -> Result<SessionView, HistoryError> {
        let row = self
            .rows
            .iter()
            .find(|s| s.id() == Some(id))
            .cloned()
            .ok_or(HistoryError::NotOnPage(id))?;

        let previous = self.last_deleted.replace(row);
        if let Err(e) = self.repo.delete_session(id).await {
            tracing::warn!(session_id = %id, error = %e, "failed to delete session");
            self.last_deleted = previous;
            return Err(HistoryError::Delete(e));
        }
        tracing::info!(session_id = %id, "session deleted");
        self.reload().await
    }

    /// Re-create the most recently deleted session under a new id.
    ///
    /// The undo slot is cleared whether or not the call succeeds.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::NothingToUndo` with an empty slot and
    /// `HistoryError::Undo` if the repository call fails.
    pub async fn undo_delete(&mut self) -> Result<SessionView, HistoryError> {
        let deleted = self.last_deleted.take().ok_or(HistoryError::NothingToUndo)?;
        let restored = self
            .repo
            .create_session(&deleted.to_new_session())
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to restore deleted session");
                HistoryError::Undo(e)
            })?;
        tracing::info!(
            deleted_id = ?deleted.id(),
            restored_id = ?restored.id(),
            "deleted session restored"
        );
        self.reload().await
    }

    /// Replace a session's fields with the values of an edit form.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::InvalidForm` before any call for bad input and
    /// `HistoryError::Update` if the repository call fails.
    pub async fn edit_session(
        &mut self,
        id: SessionId,
        form: &SessionForm,
    ) -> Result<SessionView, HistoryError> {
        let new = form.resolve(self.zone)?;
        self.repo.update_session(id, &new).await.map_err(|e| {
            tracing::warn!(session_id = %id, error = %e, "failed to update session");
            HistoryError::Update(e)
        })?;
        tracing::info!(session_id = %id, "session updated");
        self.reload().await
    }

    /// Walk every page and aggregate the sessions for the configured book.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Load` if a page cannot be fetched.
    pub async fn load_analytics(&self) -> Result<AnalyticsView, HistoryError> {
        let mut all = Vec::new();
        let mut fetched: u64 = 0;
        let mut number = 1;
        loop {
            let page = match self.repo.list_sessions(number, ANALYTICS_PAGE_SIZE).await {
                Ok(page) => page,
                Err(StorageError::NotFound) if number > 1 => break,
                Err(e) => {
                    tracing::warn!(
                        page = number,
                        error = %e,
                        "failed to load sessions for analytics"
                    );
                    return Err(HistoryError::Load(e));
                }
            };
            if page.results.is_empty() {
                break;
            }
            fetched += page.results.len() as u64;
            all.extend(page.results);
            if fetched >= page.count {
                break;
            }
            number += 1;
        }

        let sessions = self.keep_for_book(all);
        Ok(analytics::aggregate(&sessions, self.zone))
    }
}
