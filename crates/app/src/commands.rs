//! Subcommand handlers. Each one drives a service and prints plain text to stdout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reading_core::analytics::{AggregateBucket, AnalyticsView};
use reading_core::model::{BookId, ReadingSession, SessionForm, SessionId};
use reading_core::organize::{DateFilter, GroupBy, OrganizeOptions, SessionView, SortOrder};
use reading_core::time::{format_clock, format_session_duration};
use reading_core::{Clock, Zone};
use services::{
    PAGE_SIZE_CHOICES, SessionHistoryService, SessionTimer, TimerError, TimerEvent, TimerMode,
};
use storage::SessionRepository;
use tokio::sync::broadcast::error::RecvError;

const END_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);
const ROW_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub struct AppContext {
    pub repo: Arc<dyn SessionRepository>,
    pub zone: Zone,
    pub request_timeout: Duration,
}

#[derive(clap::Args)]
pub struct TrackArgs {
    #[arg(long)]
    pub book: BookId,
    /// Count down from this many minutes (e.g. 5, 10, 20) instead of a stopwatch
    #[arg(long)]
    pub countdown: Option<u32>,
    /// Pages read, recorded when the session ends
    #[arg(long)]
    pub pages: Option<u32>,
    #[arg(long, default_value = "")]
    pub notes: String,
    /// Delete the session on Ctrl-C instead of saving it
    #[arg(long)]
    pub discard: bool,
}

#[derive(clap::Args)]
pub struct EntryArgs {
    #[arg(long)]
    pub book: BookId,
    /// Start as YYYY-MM-DDTHH:MM on the wall clock
    #[arg(long)]
    pub start: String,
    /// End as YYYY-MM-DDTHH:MM on the wall clock
    #[arg(long)]
    pub end: String,
    #[arg(long)]
    pub pages: Option<u32>,
    #[arg(long, default_value = "")]
    pub notes: String,
}

impl EntryArgs {
    fn form(&self) -> SessionForm {
        let form = SessionForm::new(self.book, self.start.clone(), self.end.clone())
            .with_notes(self.notes.clone());
        match self.pages {
            Some(pages) => form.with_pages(pages),
            None => form,
        }
    }
}

#[derive(clap::Args)]
pub struct ViewArgs {
    /// Only sessions for this book
    #[arg(long)]
    pub book: Option<BookId>,
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    /// Rows per page (5, 10 or 20)
    #[arg(long, default_value_t = services::DEFAULT_PAGE_SIZE, value_parser = page_size)]
    pub page_size: u32,
    /// asc | desc
    #[arg(long, default_value_t = SortOrder::Desc)]
    pub sort: SortOrder,
    /// all | 7d | 30d
    #[arg(long, default_value_t = DateFilter::All)]
    pub filter: DateFilter,
    /// none | day | week
    #[arg(long, default_value_t = GroupBy::None)]
    pub group_by: GroupBy,
}

fn page_size(raw: &str) -> Result<u32, String> {
    let size: u32 = raw.trim().parse().map_err(|e| format!("{e}"))?;
    if PAGE_SIZE_CHOICES.contains(&size) {
        Ok(size)
    } else {
        Err(format!("expected one of {PAGE_SIZE_CHOICES:?}"))
    }
}

impl ViewArgs {
    fn options(&self) -> OrganizeOptions {
        OrganizeOptions {
            sort: self.sort,
            filter: self.filter,
            group_by: self.group_by,
        }
    }
}

fn timer(ctx: &AppContext) -> SessionTimer {
    SessionTimer::new(Arc::clone(&ctx.repo), ctx.zone).with_request_timeout(ctx.request_timeout)
}

fn history_service(ctx: &AppContext, book: Option<BookId>) -> Result<SessionHistoryService> {
    let svc = SessionHistoryService::new(Arc::clone(&ctx.repo), Clock::default(), ctx.zone)?;
    Ok(match book {
        Some(book) => svc.for_book(book),
        None => svc,
    })
}

//
// ─── TIMER COMMANDS ────────────────────────────────────────────────────────────
//

pub async fn track(ctx: &AppContext, args: TrackArgs) -> Result<()> {
    let mut timer = timer(ctx);
    if let Some(minutes) = args.countdown {
        timer.configure_timer(TimerMode::countdown_minutes(minutes)?)?;
    }
    let mut events = timer.subscribe();
    let draft = timer
        .start_session(args.book)
        .await
        .context("Failed to start session")?;
    println!(
        "Session {} started for book {} at {}. Press Ctrl-C to stop.",
        draft.session_id,
        draft.book_id,
        ctx.zone.format(draft.start_time, "%H:%M")
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            stopped = &mut ctrl_c => {
                stopped.context("Failed to listen for Ctrl-C")?;
                break;
            }
            event = events.recv() => match event {
                Ok(TimerEvent::Tick { elapsed_seconds, remaining_seconds }) => {
                    eprint!("\r{}", format_clock(remaining_seconds.unwrap_or(elapsed_seconds)));
                }
                Ok(TimerEvent::CountdownFinished) => {
                    eprintln!("\nTime is up. Press Ctrl-C to save the session.");
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    }
    eprintln!();

    if args.discard {
        timer
            .cancel_session()
            .await
            .context("Failed to discard session")?;
        println!("Session discarded.");
        return Ok(());
    }

    let mut attempt = 1;
    let session = loop {
        match timer.end_session(args.pages, args.notes.clone()).await {
            Ok(session) => break session,
            Err(e @ TimerError::SessionEnd(_)) if attempt < END_ATTEMPTS => {
                eprintln!("{e}; retrying ({attempt}/{END_ATTEMPTS})");
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e).context("Failed to end session"),
        }
    };
    println!("Saved: {}", describe(&session, ctx.zone));
    Ok(())
}

pub async fn log(ctx: &AppContext, entry: EntryArgs) -> Result<()> {
    let mut timer = timer(ctx);
    timer.begin_manual_entry()?;
    let session = timer
        .submit_manual_session(&entry.form())
        .await
        .context("Failed to save session")?;
    println!("Saved: {}", describe(&session, ctx.zone));
    Ok(())
}

//
// ─── HISTORY COMMANDS ──────────────────────────────────────────────────────────
//

pub async fn history(ctx: &AppContext, args: ViewArgs) -> Result<()> {
    let mut svc = history_for(ctx, &args)?;
    let view = svc.load_page(args.page).await.context("Failed to load sessions")?;
    print_view(&view, ctx.zone);
    Ok(())
}

pub async fn edit(ctx: &AppContext, id: SessionId, entry: EntryArgs) -> Result<()> {
    let mut svc = history_service(ctx, None)?;
    svc.edit_session(id, &entry.form())
        .await
        .with_context(|| format!("Failed to update session {id}"))?;
    println!("Updated session {id}.");
    Ok(())
}

pub async fn delete(ctx: &AppContext, id: SessionId, args: ViewArgs, undo: bool) -> Result<()> {
    let mut svc = history_for(ctx, &args)?;
    svc.load_page(args.page).await.context("Failed to load sessions")?;
    let view = svc
        .delete_session(id)
        .await
        .with_context(|| format!("Failed to delete session {id}"))?;
    println!("Deleted session {id}.");
    let view = if undo {
        let restored = svc.undo_delete().await.context("Failed to restore session")?;
        println!("Restored session {id} under a new id.");
        restored
    } else {
        view
    };
    print_view(&view, ctx.zone);
    Ok(())
}

fn history_for(ctx: &AppContext, args: &ViewArgs) -> Result<SessionHistoryService> {
    Ok(history_service(ctx, args.book)?
        .with_page_size(args.page_size)?
        .with_options(args.options()))
}

pub async fn stats(ctx: &AppContext, book: Option<BookId>) -> Result<()> {
    let svc = history_service(ctx, book)?;
    let analytics = svc
        .load_analytics()
        .await
        .context("Failed to load sessions")?;
    print_analytics(&analytics);
    Ok(())
}

//
// ─── OUTPUT ────────────────────────────────────────────────────────────────────
//

fn book_label(session: &ReadingSession) -> String {
    session
        .book_title()
        .map_or_else(|| format!("Book {}", session.book_id()), str::to_string)
}

fn describe(session: &ReadingSession, zone: Zone) -> String {
    let pages = session
        .pages_read()
        .map_or_else(|| "-".to_string(), |p| p.to_string());
    format!(
        "{} | {} | {} | {} pages",
        book_label(session),
        zone.format(session.start_time(), ROW_TIME_FORMAT),
        format_session_duration(session),
        pages
    )
}

fn print_view(view: &SessionView, zone: Zone) {
    if view.is_empty() {
        println!("No sessions.");
    }
    for group in &view.groups {
        if !group.label.is_empty() {
            println!("== {} ==", group.label);
        }
        for session in &group.sessions {
            let id = session
                .id()
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            let notes = session.notes();
            if notes.is_empty() {
                println!("{id:>6}  {}", describe(session, zone));
            } else {
                println!("{id:>6}  {} | {notes}", describe(session, zone));
            }
        }
    }
    let page = view.page;
    println!(
        "Page {} of {} ({} sessions)",
        page.number(),
        page.total_pages().max(1),
        page.total_count()
    );
}

fn print_buckets(title: &str, buckets: &[AggregateBucket]) {
    println!("{title}");
    for b in buckets {
        println!(
            "  {:<16} {:>6} min {:>6} pages",
            b.key, b.total_duration_minutes, b.total_pages
        );
    }
}

fn print_analytics(view: &AnalyticsView) {
    if view.is_empty() {
        println!("No sessions yet.");
        return;
    }
    print_buckets("Daily", &view.daily);
    print_buckets("Weekly", &view.weekly);

    println!("Per book");
    for book in &view.per_book {
        println!("  {:<24} {:>6} min", book.label, book.total_duration_minutes);
    }

    println!("Recent sessions");
    for point in &view.radar {
        println!(
            "  {:<4} {:>4} min {:>4} pages {:>5} chars of notes",
            point.label, point.duration_minutes, point.pages_read, point.notes_length
        );
    }
}
