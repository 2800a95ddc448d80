use chrono::{Duration, NaiveDate, TimeZone, Utc};
use daybook_core::cache::ChangeEvent;
use daybook_core::clock::{Clock, ManualClock};
use daybook_core::db;
use daybook_core::error::CoreError;
use daybook_core::kv::MemoryKeyValueStore;
use daybook_core::models::*;
use daybook_core::remote::{DocumentPath, MemoryRemoteStore, RemoteStore, SyncService, UserData};
use daybook_core::repository::{
    CalendarRepository, HabitRepository, NoteRepository, SqliteRepository, TaskRepository,
    TimeLogRepository,
};
use daybook_core::schema::SchemaManager;
use daybook_core::timer::TimerTracker;
use rstest::rstest;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Helper function to create a test database backed by a file
async fn setup_test_db() -> (Arc<SqliteRepository>, Arc<ManualClock>, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let local = db::establish_connection(&db_path.to_string_lossy())
        .await
        .expect("Failed to establish test database connection");

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap(),
    ));
    let repository = SqliteRepository::open(local, clock.clone())
        .await
        .expect("Failed to open repository");

    (Arc::new(repository), clock, temp_dir)
}

/// Helper function to create a test task
async fn create_test_task(repo: &SqliteRepository, text: &str) -> Task {
    repo.add_task(NewTaskData {
        text: text.to_string(),
        ..Default::default()
    })
    .await
    .expect("Failed to create test task")
}

#[tokio::test]
async fn test_task_round_trip_and_updated_at_advances() {
    let (repo, clock, _temp_dir) = setup_test_db().await;

    let task = repo
        .add_task(NewTaskData {
            text: "  Write report  ".to_string(),
            due_date: NaiveDate::from_ymd_opt(2024, 6, 7),
            priority: Some(TaskPriority::High),
            subtasks: vec!["outline".into(), " ".into(), "draft".into()],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(task.text, "Write report");
    assert_eq!(task.subtasks.len(), 2);
    assert_eq!(task.created_at, task.updated_at);
    assert_eq!(repo.task(task.id), Some(task.clone()));

    clock.advance(Duration::minutes(5));
    let updated = repo
        .update_task(
            task.id,
            UpdateTaskData {
                text: Some("Write final report".into()),
                due_date: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.text, "Write final report");
    assert_eq!(updated.due_date, None);
    assert_eq!(updated.priority, TaskPriority::High);
    assert!(updated.updated_at > task.updated_at);
    assert_eq!(updated.created_at, task.created_at);
    assert_eq!(repo.task(task.id), Some(updated));
}

#[rstest]
#[case("")]
#[case("   ")]
#[tokio::test]
async fn test_blank_task_text_is_rejected(#[case] text: &str) {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let result = repo
        .add_task(NewTaskData {
            text: text.to_string(),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    assert!(repo.tasks().is_empty());
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let missing = Uuid::now_v7();

    assert!(matches!(
        repo.update_task(missing, UpdateTaskData::default()).await,
        Err(CoreError::NotFound(_))
    ));
    assert!(matches!(repo.delete_note(missing).await, Err(CoreError::NotFound(_))));
    assert!(matches!(repo.delete_event(missing).await, Err(CoreError::NotFound(_))));
    assert!(matches!(
        repo.log_completion(missing, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 1)
            .await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_completion_toggle_sets_and_clears_completed_at() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let task = create_test_task(&repo, "Ship it").await;

    let done = repo.toggle_task_completion(task.id).await.unwrap();
    assert!(done.completed);
    assert!(done.completed_at.is_some());

    let reopened = repo.toggle_task_completion(task.id).await.unwrap();
    assert!(!reopened.completed);
    assert!(reopened.completed_at.is_none());
}

#[tokio::test]
async fn test_direct_dependency_cycle_is_rejected() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let a = create_test_task(&repo, "A").await;
    let b = create_test_task(&repo, "B").await;

    repo.add_dependency(a.id, b.id).await.unwrap();
    let a_now = repo.task(a.id).unwrap();
    let b_now = repo.task(b.id).unwrap();
    assert_eq!(a_now.depends_on, vec![b.id]);
    assert_eq!(b_now.blocks_tasks, vec![a.id]);

    let result = repo.add_dependency(b.id, a.id).await;
    match result {
        Err(CoreError::CircularDependency(first, second)) => {
            assert_eq!(first, "B");
            assert_eq!(second, "A");
        }
        other => panic!("expected a circular dependency error, got {other:?}"),
    }
    assert!(repo.task(b.id).unwrap().depends_on.is_empty());

    assert!(matches!(
        repo.add_dependency(a.id, a.id).await,
        Err(CoreError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_dependency_links_stay_symmetric() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let a = create_test_task(&repo, "A").await;
    let b = create_test_task(&repo, "B").await;
    let c = create_test_task(&repo, "C").await;

    repo.add_dependency(a.id, b.id).await.unwrap();
    repo.add_dependency(a.id, b.id).await.unwrap();
    repo.add_dependency(c.id, b.id).await.unwrap();
    assert_eq!(repo.task(a.id).unwrap().depends_on, vec![b.id]);
    assert_eq!(repo.task(b.id).unwrap().blocks_tasks, vec![a.id, c.id]);

    repo.remove_dependency(a.id, b.id).await.unwrap();
    assert!(repo.task(a.id).unwrap().depends_on.is_empty());
    assert_eq!(repo.task(b.id).unwrap().blocks_tasks, vec![c.id]);

    repo.delete_task(b.id).await.unwrap();
    assert!(repo.task(c.id).unwrap().depends_on.is_empty());
}

#[tokio::test]
async fn test_subtasks_and_task_timer() {
    let (repo, clock, _temp_dir) = setup_test_db().await;
    let task = create_test_task(&repo, "Refactor").await;

    let task = repo.add_subtask(task.id, "extract module".into()).await.unwrap();
    let subtask_id = task.subtasks[0].id;
    let task = repo.toggle_subtask(task.id, subtask_id).await.unwrap();
    assert!(task.subtasks[0].completed);

    repo.toggle_task_timer(task.id).await.unwrap();
    clock.advance(Duration::seconds(90));
    let paused = repo.toggle_task_timer(task.id).await.unwrap();
    let timer = paused.timer.unwrap();
    assert!(!timer.is_running);
    assert_eq!(timer.total(clock.now()), Duration::seconds(90));
}

#[tokio::test]
async fn test_short_id_prefix_lookup() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let task = create_test_task(&repo, "Find me").await;

    let prefix = &task.id.to_string()[..8];
    let found = repo.find_tasks_by_short_id_prefix(prefix);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, task.id);
    assert!(repo.find_tasks_by_short_id_prefix("zz").is_empty());
}

#[rstest]
#[case("Work")]
#[case("work")]
#[case("  WORK ")]
#[tokio::test]
async fn test_notebook_names_are_case_insensitively_unique(#[case] clash: &str) {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    repo.add_notebook("Work".into()).await.unwrap();

    let result = repo.add_notebook(clash.to_string()).await;
    assert!(matches!(result, Err(CoreError::Duplicate(_))));
    assert_eq!(repo.notebooks().len(), 1);
}

#[tokio::test]
async fn test_notebook_rename_keeps_uniqueness() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let work = repo.add_notebook("Work".into()).await.unwrap();
    repo.add_notebook("Home".into()).await.unwrap();

    assert!(matches!(
        repo.rename_notebook(work.id, "HOME".into()).await,
        Err(CoreError::Duplicate(_))
    ));
    let renamed = repo.rename_notebook(work.id, "WORK".into()).await.unwrap();
    assert_eq!(renamed.name, "WORK");
}

#[tokio::test]
async fn test_renames_and_edits_advance_updated_at() {
    let (repo, clock, _temp_dir) = setup_test_db().await;
    let created = clock.now();

    let notebook = repo.add_notebook("Work".into()).await.unwrap();
    let activity = repo
        .add_activity(NewActivityData {
            name: "Coding".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let entry = repo
        .add_time_log_entry(NewTimeLogEntry {
            activity_id: activity.id,
            start_time: created - Duration::hours(1),
            end_time: created,
            notes: None,
            is_manual: true,
        })
        .await
        .unwrap();
    assert_eq!(notebook.updated_at, created);
    assert_eq!(activity.updated_at, created);
    assert_eq!(entry.updated_at, created);

    clock.advance(Duration::minutes(5));
    let later = clock.now();

    repo.rename_notebook(notebook.id, "Office".into()).await.unwrap();
    repo.update_activity(
        activity.id,
        UpdateActivityData {
            color: Some(Some("#ff8800".into())),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    repo.update_time_log_entry(
        entry.id,
        UpdateTimeLogEntry {
            notes: Some(Some("pairing".into())),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let notebook = repo.notebook(notebook.id).unwrap();
    assert_eq!((notebook.created_at, notebook.updated_at), (created, later));
    let activity = repo.activity(activity.id).unwrap();
    assert_eq!((activity.created_at, activity.updated_at), (created, later));
    let entry = repo.time_log_entry(entry.id).unwrap();
    assert_eq!(entry.updated_at, later);
    assert_eq!(entry.notes.as_deref(), Some("pairing"));
}

#[tokio::test]
async fn test_notebook_delete_cascades_to_its_notes_only() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let work = repo.add_notebook("Work".into()).await.unwrap();
    let home = repo.add_notebook("Home".into()).await.unwrap();

    for title in ["one", "two", "three"] {
        repo.add_note(NewNoteData {
            title: title.into(),
            notebook_id: Some(work.id),
            ..Default::default()
        })
        .await
        .unwrap();
    }
    let kept = repo
        .add_note(NewNoteData {
            title: "groceries".into(),
            notebook_id: Some(home.id),
            ..Default::default()
        })
        .await
        .unwrap();
    let unfiled = repo
        .add_note(NewNoteData {
            title: "loose".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let removed = repo.delete_notebook(work.id).await.unwrap();
    assert_eq!(removed, 3);
    assert!(repo.notebook(work.id).is_none());

    let remaining: Vec<Uuid> = repo.notes().iter().map(|n| n.id).collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&kept.id));
    assert!(remaining.contains(&unfiled.id));
}

#[tokio::test]
async fn test_notes_listing_puts_pinned_first() {
    let (repo, clock, _temp_dir) = setup_test_db().await;
    let older = repo
        .add_note(NewNoteData {
            title: "older".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    clock.advance(Duration::minutes(1));
    let newer = repo
        .add_note(NewNoteData {
            title: "newer".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    clock.advance(Duration::minutes(1));
    repo.toggle_note_pin(older.id).await.unwrap();

    let ordered: Vec<Uuid> = repo.notes_in_notebook(None).iter().map(|n| n.id).collect();
    assert_eq!(ordered, vec![older.id, newer.id]);

    assert!(matches!(
        repo.move_note(newer.id, Some(Uuid::now_v7())).await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_habit_delete_cascades_completions() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let habit = repo
        .add_habit(NewHabitData {
            name: "Stretch".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let other = repo
        .add_habit(NewHabitData {
            name: "Read".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    for day in 1..=3 {
        let date = NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
        repo.log_completion(habit.id, date, 1).await.unwrap();
    }
    repo.log_completion(other.id, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), 1)
        .await
        .unwrap();

    let removed = repo.delete_habit(habit.id).await.unwrap();
    assert_eq!(removed, 3);
    assert!(repo.completions_for(habit.id).is_empty());
    assert_eq!(repo.completions_for(other.id).len(), 1);
}

#[tokio::test]
async fn test_habit_completion_upserts_per_day() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let habit = repo
        .add_habit(NewHabitData {
            name: "Water".into(),
            target_count: Some(8),
            ..Default::default()
        })
        .await
        .unwrap();
    let day = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();

    let first = repo.log_completion(habit.id, day, 3).await.unwrap().unwrap();
    let second = repo.log_completion(habit.id, day, 5).await.unwrap().unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(repo.completions_for(habit.id).len(), 1);
    assert_eq!(repo.completions_for(habit.id)[0].count, 5);

    assert!(repo.log_completion(habit.id, day, 0).await.unwrap().is_none());
    assert!(repo.completions_for(habit.id).is_empty());
}

#[tokio::test]
async fn test_habit_streak() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let habit = repo
        .add_habit(NewHabitData {
            name: "Run".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();

    for back in [1, 2, 3, 5] {
        repo.log_completion(habit.id, today - Duration::days(back), 1)
            .await
            .unwrap();
    }
    assert_eq!(repo.current_streak(habit.id, today).unwrap(), 3);

    repo.log_completion(habit.id, today, 1).await.unwrap();
    assert_eq!(repo.current_streak(habit.id, today).unwrap(), 4);
}

#[tokio::test]
async fn test_event_validation_and_range_query() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let nine = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();

    let backwards = repo
        .add_event(NewEventData {
            title: "Broken".into(),
            start_time: nine,
            end_time: nine - Duration::hours(1),
            location: None,
            recurrence: None,
            color: None,
        })
        .await;
    assert!(matches!(backwards, Err(CoreError::InvalidInput(_))));

    let standup = repo
        .add_event(NewEventData {
            title: "Standup".into(),
            start_time: nine,
            end_time: nine + Duration::minutes(15),
            location: None,
            recurrence: Some("FREQ=DAILY".into()),
            color: None,
        })
        .await
        .unwrap();
    repo.add_event(NewEventData {
        title: "Tomorrow".into(),
        start_time: nine + Duration::days(1),
        end_time: nine + Duration::days(1) + Duration::hours(1),
        location: None,
        recurrence: None,
        color: None,
    })
    .await
    .unwrap();

    let today = repo.events_between(nine - Duration::hours(9), nine + Duration::hours(15));
    assert_eq!(today.len(), 1);
    assert_eq!(today[0].id, standup.id);

    let moved = repo
        .update_event(
            standup.id,
            UpdateEventData {
                end_time: Some(nine - Duration::minutes(1)),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(moved, Err(CoreError::InvalidInput(_))));
}

#[tokio::test]
async fn test_time_log_duration_is_derived_and_recomputed() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let activity = repo
        .add_activity(NewActivityData {
            name: "Coding".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let start = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();

    let entry = repo
        .add_time_log_entry(NewTimeLogEntry {
            activity_id: activity.id,
            start_time: start,
            end_time: start + Duration::minutes(25),
            notes: None,
            is_manual: true,
        })
        .await
        .unwrap();
    assert_eq!(entry.duration_ms, 25 * 60 * 1000);

    let updated = repo
        .update_time_log_entry(
            entry.id,
            UpdateTimeLogEntry {
                end_time: Some(start + Duration::minutes(40)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.duration(), Duration::minutes(40));
    assert_eq!(repo.total_duration_for(activity.id), Duration::minutes(40));

    let backwards = repo
        .update_time_log_entry(
            entry.id,
            UpdateTimeLogEntry {
                start_time: Some(start + Duration::hours(2)),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(backwards, Err(CoreError::InvalidInput(_))));

    assert!(matches!(
        repo.delete_activity(activity.id).await,
        Err(CoreError::InvalidInput(_))
    ));
    repo.delete_time_log_entry(entry.id).await.unwrap();
    repo.delete_activity(activity.id).await.unwrap();
    assert!(repo.activities().is_empty());
}

#[tokio::test]
async fn test_timer_stop_commits_an_entry() {
    let (repo, clock, _temp_dir) = setup_test_db().await;
    let activity = repo
        .add_activity(NewActivityData {
            name: "Writing".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let kv = Arc::new(MemoryKeyValueStore::new());
    let tracker = TimerTracker::load(kv, clock.clone(), repo.clone()).await.unwrap();

    tracker.start(activity.id).await.unwrap();
    clock.advance(Duration::seconds(60));
    tracker.pause(activity.id).await.unwrap();
    clock.advance(Duration::seconds(30));
    tracker.resume(activity.id).await.unwrap();
    clock.advance(Duration::seconds(20));
    let entry = tracker.stop(activity.id, None).await.unwrap();

    assert_eq!(entry.duration_ms, 80_000);
    assert!(!entry.is_manual);
    assert_eq!(repo.entries_for_activity(activity.id), vec![entry]);
    assert!(tracker.active().await.is_empty());
}

#[tokio::test]
async fn test_subscribers_see_every_write() {
    let (repo, _clock, _temp_dir) = setup_test_db().await;
    let mut subscription = repo.cache().subscribe();

    let task = create_test_task(&repo, "Observed").await;
    match subscription.recv().await {
        Some(ChangeEvent::Tasks(tasks)) => assert_eq!(tasks[0].id, task.id),
        other => panic!("expected a task snapshot, got {other:?}"),
    }

    repo.add_notebook("Ideas".into()).await.unwrap();
    let event = subscription.recv().await.unwrap();
    assert_eq!(event.collection(), "notebooks");

    subscription.cancel();
    assert!(subscription.recv().await.is_none());
}

#[tokio::test]
async fn test_remote_pull_push_and_follow() {
    let (repo, clock, _temp_dir) = setup_test_db().await;
    let local_only = create_test_task(&repo, "Local only").await;

    let remote = Arc::new(MemoryRemoteStore::new());
    let path = DocumentPath::user_data("user-1").unwrap();
    let sync = Arc::new(SyncService::new(
        remote.clone(),
        repo.clone(),
        clock.clone(),
        path.clone(),
    ));

    assert!(!sync.pull().await.unwrap());

    let mut remote_task = local_only.clone();
    remote_task.id = Uuid::now_v7();
    remote_task.text = "From the cloud".into();
    remote
        .save(
            &path,
            &UserData {
                tasks: vec![remote_task.clone()],
                projects: vec![serde_json::json!({"id": "p1", "name": "Garden"})],
                kanban_columns: Vec::new(),
                updated_at: Some(clock.now()),
            },
        )
        .await
        .unwrap();

    assert!(sync.pull().await.unwrap());
    assert_eq!(repo.tasks().as_ref(), &vec![remote_task.clone()]);

    let pushed = sync.push().await.unwrap();
    assert_eq!(pushed.projects.len(), 1);
    assert_eq!(remote.fetch(&path).await.unwrap(), Some(pushed));

    let mut changes = repo.cache().subscribe();
    let follow = sync.clone().follow().await.unwrap();
    // The current document is delivered first.
    assert!(matches!(changes.recv().await, Some(ChangeEvent::Tasks(_))));

    let mut streamed = remote_task.clone();
    streamed.text = "Edited elsewhere".into();
    remote
        .save(
            &path,
            &UserData {
                tasks: vec![streamed.clone()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    match changes.recv().await {
        Some(ChangeEvent::Tasks(tasks)) => assert_eq!(tasks.as_ref(), &vec![streamed]),
        other => panic!("expected a task snapshot, got {other:?}"),
    }

    follow.stop().await;
}

#[tokio::test]
async fn test_newer_database_is_refused() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("future.db");

    let local = db::open(&path, &SchemaManager::declared()).await.unwrap();
    local.pool().close().await;

    let result = db::open(&path, &SchemaManager::declared().up_to(2)).await;
    assert!(matches!(
        result,
        Err(CoreError::SchemaDowngrade {
            stored: 4,
            declared: 2
        })
    ));
}
