mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use reading_core::Zone;
use reading_core::model::{BookId, SessionForm};
use reading_core::time::fixed_clock;
use services::{SessionTimer, TimerError, TimerEvent, TimerMode, TimerPhase};
use storage::repository::{InMemoryRepository, StorageError};
use tokio::sync::broadcast::error::RecvError;

use common::FlakyRepository;

fn flaky() -> Arc<FlakyRepository> {
    Arc::new(FlakyRepository::new(InMemoryRepository::with_clock(
        fixed_clock(),
    )))
}

fn timer(repo: &Arc<FlakyRepository>) -> SessionTimer {
    SessionTimer::new(repo.clone(), Zone::utc())
}

#[tokio::test(start_paused = true)]
async fn stopwatch_counts_up_each_second() {
    let repo = flaky();
    let mut timer = timer(&repo);
    timer.start_session(BookId::new(1)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(timer.elapsed_seconds(), 3);
    assert_eq!(timer.remaining_seconds(), None);
}

#[tokio::test(start_paused = true)]
async fn countdown_notifies_and_leaves_session_open() {
    let repo = flaky();
    let mut timer = timer(&repo);
    timer
        .configure_timer(TimerMode::Countdown {
            duration_seconds: 3,
        })
        .unwrap();
    let mut events = timer.subscribe();
    timer.start_session(BookId::new(1)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(timer.elapsed_seconds(), 3);
    assert_eq!(timer.remaining_seconds(), Some(0));
    assert_eq!(timer.phase(), TimerPhase::Running);
    assert!(repo.inner.all().unwrap()[0].is_active());

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(
        received.last(),
        Some(&TimerEvent::CountdownFinished)
    );
    assert_eq!(
        received[0],
        TimerEvent::Tick {
            elapsed_seconds: 1,
            remaining_seconds: Some(2)
        }
    );
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_and_draft_kept() {
    let repo = flaky();
    let mut timer = timer(&repo);
    let first = timer.start_session(BookId::new(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    let err = timer.start_session(BookId::new(2)).await.unwrap_err();
    assert!(matches!(err, TimerError::ConflictingMode));

    let draft = timer.draft().unwrap();
    assert_eq!(draft.session_id, first.session_id);
    assert_eq!(draft.book_id, BookId::new(1));
    assert_eq!(draft.elapsed_seconds, 2);
    assert_eq!(repo.calls(), 1);
    assert_eq!(repo.inner.all().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_always_returns_to_idle_with_zero_counters() {
    for ticks in [0_u64, 1, 7] {
        let repo = flaky();
        let mut timer = timer(&repo);
        timer
            .configure_timer(TimerMode::countdown_minutes(5).unwrap())
            .unwrap();
        timer.start_session(BookId::new(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(ticks * 1_000 + 500)).await;

        timer.cancel_session().await.unwrap();
        assert_eq!(timer.phase(), TimerPhase::Idle);
        assert_eq!(timer.elapsed_seconds(), 0);
        assert_eq!(timer.remaining_seconds(), None);
        assert!(timer.draft().is_none());
        assert!(repo.inner.all().unwrap().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn end_records_pages_and_server_time() {
    let repo = flaky();
    let mut timer = timer(&repo);
    timer.start_session(BookId::new(3)).await.unwrap();
    repo.inner.advance(ChronoDuration::minutes(25)).unwrap();

    let session = timer.end_session(Some(18), "chapter 4").await.unwrap();
    assert_eq!(session.duration_minutes(), 25);
    assert_eq!(session.pages_read(), Some(18));
    assert_eq!(session.notes(), "chapter 4");
    assert_eq!(timer.phase(), TimerPhase::Idle);
    assert_eq!(timer.mode(), TimerMode::Stopwatch);
}

#[tokio::test(start_paused = true)]
async fn failed_end_keeps_draft_and_resumes_ticking() {
    let repo = flaky();
    let mut timer = timer(&repo);
    timer.start_session(BookId::new(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    repo.fail_next(1);
    let err = timer.end_session(Some(12), "notes").await.unwrap_err();
    assert!(matches!(
        err,
        TimerError::SessionEnd(StorageError::Connection(_))
    ));
    assert_eq!(timer.phase(), TimerPhase::Running);
    let draft = timer.draft().unwrap();
    assert_eq!(draft.pages_read, Some(12));
    assert_eq!(draft.notes, "notes");

    let before = timer.elapsed_seconds();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(timer.elapsed_seconds(), before + 2);

    let session = timer.end_session(Some(12), "notes").await.unwrap();
    assert_eq!(session.pages_read(), Some(12));
    assert_eq!(timer.phase(), TimerPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn failed_cancel_restores_running() {
    let repo = flaky();
    let mut timer = timer(&repo);
    timer.start_session(BookId::new(1)).await.unwrap();

    repo.fail_next(1);
    assert!(matches!(
        timer.cancel_session().await,
        Err(TimerError::SessionCancel(_))
    ));
    assert_eq!(timer.phase(), TimerPhase::Running);
    assert_eq!(repo.inner.all().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_start_leaves_configuration_in_place() {
    let repo = flaky();
    let mut timer = timer(&repo);
    timer
        .configure_timer(TimerMode::countdown_minutes(10).unwrap())
        .unwrap();

    repo.fail_next(1);
    assert!(matches!(
        timer.start_session(BookId::new(1)).await,
        Err(TimerError::SessionStart(_))
    ));
    assert_eq!(timer.phase(), TimerPhase::Configuring);

    let draft = timer.start_session(BookId::new(1)).await.unwrap();
    assert_eq!(draft.remaining_seconds, Some(600));
}

#[tokio::test(start_paused = true)]
async fn stalled_start_times_out() {
    let repo = flaky();
    let mut timer = timer(&repo).with_request_timeout(Duration::from_secs(5));
    repo.stall(true);

    let err = timer.start_session(BookId::new(1)).await.unwrap_err();
    assert!(matches!(err, TimerError::SessionStart(StorageError::Timeout)));
    assert_eq!(timer.phase(), TimerPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn manual_entry_persists_ninety_minutes() {
    let repo = flaky();
    let mut timer = timer(&repo);
    timer.begin_manual_entry().unwrap();

    let form = SessionForm::new(BookId::new(4), "2025-07-05T09:00", "2025-07-05T10:30")
        .with_pages(40);
    let session = timer.submit_manual_session(&form).await.unwrap();
    assert_eq!(session.duration_minutes(), 90);
    assert_eq!(session.pages_read(), Some(40));
    assert_eq!(timer.phase(), TimerPhase::Idle);

    let stored = repo.inner.all().unwrap();
    assert_eq!(stored[0].duration_minutes(), 90);
    assert_eq!(stored[0].pages_read(), Some(40));
}

#[tokio::test(start_paused = true)]
async fn inverted_manual_entry_makes_no_call() {
    let repo = flaky();
    let mut timer = timer(&repo);
    timer.begin_manual_entry().unwrap();

    let form = SessionForm::new(BookId::new(4), "2025-07-05T10:30", "2025-07-05T09:00")
        .with_pages(40);
    let err = timer.submit_manual_session(&form).await.unwrap_err();
    assert!(matches!(err, TimerError::InvalidRange));
    assert_eq!(repo.calls(), 0);
    assert_eq!(timer.phase(), TimerPhase::ManualEntry);

    let garbled = SessionForm::new(BookId::new(4), "yesterday", "2025-07-05T09:00");
    assert!(matches!(
        timer.submit_manual_session(&garbled).await,
        Err(TimerError::InvalidTimestamp(_))
    ));
    assert_eq!(repo.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_timer_stops_ticking() {
    let repo = flaky();
    let mut timer = timer(&repo);
    let mut events = timer.subscribe();
    timer.start_session(BookId::new(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    drop(timer);
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(TimerEvent::Tick { .. })) => continue,
            Ok(Err(RecvError::Closed)) => break,
            other => panic!("tick task still alive: {other:?}"),
        }
    }
}

fn drain(events: &mut tokio::sync::broadcast::Receiver<TimerEvent>) -> usize {
    let mut count = 0;
    while events.try_recv().is_ok() {
        count += 1;
    }
    count
}

#[tokio::test(start_paused = true)]
async fn ticking_pauses_while_end_is_in_flight() {
    let repo = flaky();
    let mut timer = timer(&repo).with_request_timeout(Duration::from_secs(5));
    let mut events = timer.subscribe();
    timer.start_session(BookId::new(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(drain(&mut events), 2);

    repo.stall(true);
    let err = timer.end_session(Some(3), "").await.unwrap_err();
    assert!(matches!(err, TimerError::SessionEnd(StorageError::Timeout)));
    assert_eq!(timer.phase(), TimerPhase::Running);
    assert_eq!(timer.elapsed_seconds(), 2);
    assert_eq!(drain(&mut events), 0);

    repo.stall(false);
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(timer.elapsed_seconds(), 3);
}

#[tokio::test(start_paused = true)]
async fn ticking_pauses_while_cancel_is_in_flight() {
    let repo = flaky();
    let mut timer = timer(&repo).with_request_timeout(Duration::from_secs(5));
    let mut events = timer.subscribe();
    timer.start_session(BookId::new(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    drain(&mut events);

    repo.stall(true);
    let err = timer.cancel_session().await.unwrap_err();
    assert!(matches!(err, TimerError::SessionCancel(StorageError::Timeout)));
    assert_eq!(timer.phase(), TimerPhase::Running);
    assert_eq!(timer.elapsed_seconds(), 2);
    assert_eq!(drain(&mut events), 0);
    assert_eq!(repo.inner.all().unwrap().len(), 1);
}
