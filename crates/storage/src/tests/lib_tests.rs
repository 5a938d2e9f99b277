use super::*;

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn missing_flag_loads_as_none() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let flag = storage.load_flag("first_unlock_flourish").await.expect("load");
    assert!(flag.is_none());
}

#[tokio::test]
async fn setting_a_flag_twice_keeps_the_first_timestamp() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    assert!(storage.set_flag("seen").await.expect("first set"));
    let first = storage
        .load_flag("seen")
        .await
        .expect("load")
        .expect("flag present");

    assert!(!storage.set_flag("seen").await.expect("second set"));
    let second = storage
        .load_flag("seen")
        .await
        .expect("load")
        .expect("flag present");

    assert_eq!(first, second);
    assert_eq!(second.name, "seen");
}

#[tokio::test]
async fn clearing_a_flag_removes_it() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.set_flag("seen").await.expect("set");

    assert!(storage.clear_flag("seen").await.expect("clear"));
    assert!(!storage.clear_flag("seen").await.expect("clear again"));
    assert!(storage.load_flag("seen").await.expect("load").is_none());
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("temp dir");
    let db_path = temp_root.path().join("nested").join("flags.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[test]
fn memory_urls_have_no_filesystem_path() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/flags.db?mode=rwc"),
        Some(PathBuf::from("./data/flags.db"))
    );
    assert_eq!(sqlite_path("postgres://host/db"), None);
}

#[test]
fn normalizes_plain_paths_and_single_colon_urls() {
    assert_eq!(
        normalize_database_url("./data/flags.db").as_deref(),
        Some("sqlite://./data/flags.db")
    );
    assert_eq!(
        normalize_database_url("sqlite:data\\flags.db").as_deref(),
        Some("sqlite://data/flags.db")
    );
    assert_eq!(
        normalize_database_url(" sqlite::memory: ").as_deref(),
        Some("sqlite::memory:")
    );
    assert_eq!(normalize_database_url("   "), None);
}

#[test]
fn bare_file_name_has_no_parent_to_create() {
    ensure_sqlite_parent_dir_exists("sqlite://flags.db").expect("no parent needed");
}
