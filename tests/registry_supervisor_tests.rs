use hearthd::core::process_manager::ProcessSupervisor;
use hearthd::core::server_registry::{NewServerRequest, ServerRegistry};
use hearthd::core::subscription_hub::SubscriptionHub;
use hearthd::db::Database;
use hearthd::host_executor::DirectExecutor;
use hearthd::models::{EngineFamily, GameOptions, RunnableDescriptor, RunnableKind, ServerState, StorageKind};
use std::sync::Arc;
use std::time::Duration;

fn new_server_request(name: &str, port: u16) -> NewServerRequest {
    NewServerRequest {
        name: name.to_string(),
        description: None,
        engine: EngineFamily::Vanilla,
        version: "1.20.4".to_string(),
        requested_port: port,
        memory_mb: 1024,
        jvm_opts: String::new(),
        auto_start: false,
        backup_schedule_enabled: false,
        storage_kind: StorageKind::BindPath,
        storage_path: std::env::temp_dir().to_string_lossy().into_owned(),
        game_options: GameOptions::default(),
        modpack_id: None,
    }
}

/// A server created through the registry and started through the supervisor
/// reaches Starting immediately, then Running once its log output contains
/// the done-banner, observed live through the subscription hub — the
/// registry, supervisor, and hub acting together rather than in isolation.
#[tokio::test]
async fn start_drives_state_through_registry_and_hub() {
    let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
    let registry = Arc::new(ServerRegistry::new(db));
    let hub = SubscriptionHub::new();
    let executor = Arc::new(DirectExecutor);
    let supervisor = ProcessSupervisor::new(registry.clone(), hub.clone(), executor);

    let record = registry.create(new_server_request("alpha", 25580)).await.unwrap();

    let mut state_sub = hub.subscribe_state(record.id).await;
    assert_eq!(state_sub.current, None);

    // A shell script standing in for a real game server binary: it prints
    // the banner the supervisor's log reader looks for, then idles.
    let cwd = std::env::temp_dir();
    let script_path = cwd.join(format!("hearthd-test-{}.sh", record.id));
    tokio::fs::write(
        &script_path,
        "#!/bin/sh\necho 'Starting minecraft server version 1.20.4'\necho 'Done (1.0s)! For help, type \"help\"'\nsleep 5\n",
    )
    .await
    .unwrap();
    let mut perms = tokio::fs::metadata(&script_path).await.unwrap().permissions();
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(0o755);
    tokio::fs::set_permissions(&script_path, perms).await.unwrap();

    let runnable = RunnableDescriptor {
        kind: RunnableKind::Script,
        path: script_path.clone(),
    };

    supervisor.start(&record, &runnable, &cwd).await.unwrap();

    let starting = tokio::time::timeout(Duration::from_secs(2), state_sub.receiver.recv()).await;
    assert_eq!(starting.unwrap(), Some(ServerState::Starting));

    let running = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match state_sub.receiver.recv().await {
                Some(ServerState::Running) => return ServerState::Running,
                Some(_) => continue,
                None => panic!("hub closed before Running was observed"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(running, ServerState::Running);

    let persisted = registry.get(record.id).await.unwrap();
    assert_eq!(persisted.state, ServerState::Running);

    let _ = tokio::fs::remove_file(&script_path).await;
    let _ = supervisor.send_command(record.id, "stop").await;
}

/// Two concurrent creates on distinct ports both land in the registry and
/// stay independently visible — the create lock serializes the insert
/// critical section without serializing unrelated creates into failure.
#[tokio::test]
async fn concurrent_creates_on_distinct_ports_both_succeed() {
    let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
    let registry = Arc::new(ServerRegistry::new(db));

    let a = registry.clone();
    let b = registry.clone();
    let (left, right) = tokio::join!(
        async move { a.create(new_server_request("left", 25590)).await },
        async move { b.create(new_server_request("right", 25591)).await },
    );

    let left = left.unwrap();
    let right = right.unwrap();
    assert_ne!(left.port, right.port);

    let listed = registry.list().await.unwrap();
    assert_eq!(listed.len(), 2);
}

/// Two concurrent creates that race the exact same requested port: the
/// create lock's insert critical section lets the unique-constraint
/// violation surface as `ConflictPort` rather than corrupting the table
/// with two rows on one port.
#[tokio::test]
async fn concurrent_creates_on_same_port_yield_exactly_one_conflict() {
    let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
    let registry = Arc::new(ServerRegistry::new(db));

    let a = registry.clone();
    let b = registry.clone();
    let (left, right) = tokio::join!(
        async move { a.create(new_server_request("left", 25592)).await },
        async move { b.create(new_server_request("right", 25592)).await },
    );

    let results = [left, right];
    let ok_count = results.iter().filter(|r| r.is_ok()).count();
    let conflict_count = results
        .iter()
        .filter(|r| matches!(r, Err(err) if err.kind() == "ConflictPort"))
        .count();
    assert_eq!(ok_count, 1);
    assert_eq!(conflict_count, 1);
}
