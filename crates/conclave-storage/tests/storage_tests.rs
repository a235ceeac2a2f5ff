use chrono::Duration;
use conclave_core::{AgentType, ApprovalStatus, Message, PendingApproval, SessionKey};
use conclave_storage::{
    pool, AgentContextRepository, ApprovalRepository, MessageRepository, SessionRepository,
};

async fn test_pool() -> sqlx::SqlitePool {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    // Leak the tempdir so the file outlives this function; each test gets
    // its own directory so there's no cross-test interference.
    std::mem::forget(dir);

    let config = pool::PoolConfig {
        database_url: format!("sqlite://{}", path.display()),
        max_connections: 5,
        ..Default::default()
    };
    let db = pool::connect(&config).await.unwrap();
    pool::migrate(&db).await.unwrap();
    db
}

#[tokio::test]
async fn session_create_get_touch_delete_round_trip() {
    let db = test_pool().await;
    let repo = SessionRepository::new(db);

    let session = repo.create("user-1").await.unwrap();
    assert!(session.is_active);

    let fetched = repo.get(&session.id).await.unwrap();
    assert_eq!(fetched.id, session.id);
    assert_eq!(fetched.user_id, "user-1");

    repo.touch(&session.id).await.unwrap();

    repo.delete(&session.id).await.unwrap();
    let err = repo.get(&session.id).await.unwrap_err();
    assert_eq!(err.kind(), "session_deleted");
}

#[tokio::test]
async fn session_list_paginates_by_user() {
    let db = test_pool().await;
    let repo = SessionRepository::new(db);

    for _ in 0..3 {
        repo.create("user-a").await.unwrap();
    }
    repo.create("user-b").await.unwrap();

    let page = repo.list("user-a", 1, 2).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 3);

    let page2 = repo.list("user-a", 2, 2).await.unwrap();
    assert_eq!(page2.items.len(), 1);
}

#[tokio::test]
async fn message_history_preserves_append_order() {
    let db = test_pool().await;
    let sessions = SessionRepository::new(db.clone());
    let messages = MessageRepository::new(db);

    let session = sessions.create("user-1").await.unwrap();
    messages
        .append(&Message::user(session.id.clone(), "hello"))
        .await
        .unwrap();
    messages
        .append(&Message::assistant_text(session.id.clone(), "hi there"))
        .await
        .unwrap();
    messages
        .append(&Message::tool_result(session.id.clone(), "c1", "read_file", "contents"))
        .await
        .unwrap();

    let history = messages.history(&session.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].content.as_deref(), Some("hello"));
    assert_eq!(history[2].tool_call_id.as_deref(), Some("c1"));
}

#[tokio::test]
async fn message_recent_bounds_and_preserves_order() {
    let db = test_pool().await;
    let sessions = SessionRepository::new(db.clone());
    let messages = MessageRepository::new(db);

    let session = sessions.create("user-1").await.unwrap();
    for i in 0..5 {
        messages
            .append(&Message::user(session.id.clone(), format!("msg {i}")))
            .await
            .unwrap();
    }

    let recent = messages.recent(&session.id, 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].content.as_deref(), Some("msg 3"));
    assert_eq!(recent[1].content.as_deref(), Some("msg 4"));
}

#[tokio::test]
async fn agent_context_get_or_create_then_save_round_trips() {
    let db = test_pool().await;
    let sessions = SessionRepository::new(db.clone());
    let contexts = AgentContextRepository::new(db);

    let session = sessions.create("user-1").await.unwrap();
    let mut ctx = contexts
        .get_or_create(&session.id, AgentType::Orchestrator)
        .await
        .unwrap();
    assert_eq!(ctx.current_agent, AgentType::Orchestrator);

    ctx.apply_switch(AgentType::Coder, "needs code changes");
    contexts.save(&ctx).await.unwrap();

    let reloaded = contexts.get(&session.id).await.unwrap().unwrap();
    assert_eq!(reloaded.current_agent, AgentType::Coder);
    assert_eq!(reloaded.switch_count, 1);
    assert_eq!(reloaded.history.len(), 1);
}

#[tokio::test]
async fn approval_resolve_is_idempotent_and_conflicts_on_mismatch() {
    let db = test_pool().await;
    let sessions = SessionRepository::new(db.clone());
    let approvals = ApprovalRepository::new(db);

    let session = sessions.create("user-1").await.unwrap();
    let approval = PendingApproval {
        call_id: "call-1".to_string(),
        session_id: session.id.clone(),
        tool_name: "execute_command".to_string(),
        arguments: serde_json::json!({"command": "ls"}),
        created_at: chrono::Utc::now(),
        status: ApprovalStatus::Pending,
        decision_feedback: None,
        modified_arguments: None,
    };
    approvals.create(&approval).await.unwrap();

    let resolved = approvals
        .resolve("call-1", ApprovalStatus::Approved, None, None)
        .await
        .unwrap();
    assert_eq!(resolved.status, ApprovalStatus::Approved);

    // Resolving again with the same decision is a no-op, not an error.
    let again = approvals
        .resolve("call-1", ApprovalStatus::Approved, None, None)
        .await
        .unwrap();
    assert_eq!(again.status, ApprovalStatus::Approved);

    // A conflicting decision after resolution is rejected.
    let conflict = approvals
        .resolve("call-1", ApprovalStatus::Rejected, None, None)
        .await;
    assert!(conflict.is_err());
}

#[tokio::test]
async fn approval_sweep_stale_removes_only_old_pending_rows() {
    let db = test_pool().await;
    let sessions = SessionRepository::new(db.clone());
    let approvals = ApprovalRepository::new(db);

    let session = sessions.create("user-1").await.unwrap();
    let stale = PendingApproval {
        call_id: "stale-call".to_string(),
        session_id: session.id.clone(),
        tool_name: "write_file".to_string(),
        arguments: serde_json::json!({}),
        created_at: chrono::Utc::now() - Duration::hours(48),
        status: ApprovalStatus::Pending,
        decision_feedback: None,
        modified_arguments: None,
    };
    approvals.create(&stale).await.unwrap();

    let fresh = PendingApproval {
        call_id: "fresh-call".to_string(),
        ..stale.clone()
    };
    let fresh = PendingApproval {
        created_at: chrono::Utc::now(),
        ..fresh
    };
    approvals.create(&fresh).await.unwrap();

    let removed = approvals.sweep_stale(Duration::hours(24)).await.unwrap();
    assert_eq!(removed, 1);
    assert!(approvals.get("fresh-call").await.is_ok());
    assert!(approvals.get("stale-call").await.is_err());
}
