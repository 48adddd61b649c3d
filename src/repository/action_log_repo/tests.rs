use super::ActionLogRepository;
use crate::db::open_in_memory;
use crate::domain::action_log::{ActionLog, ActionType};
use serde_json::json;

#[test]
fn test_insert_and_find_by_id() {
    let conn = open_in_memory().unwrap();

    let log = ActionLog::new(ActionType::AddComponent, "tester", Some("gift-box"))
        .with_payload(json!({ "quantity": 2.0 }))
        .with_detail("add cookie");
    let id = ActionLogRepository::insert(&conn, &log).unwrap();

    let found = ActionLogRepository::find_by_id(&conn, &id).unwrap().unwrap();
    assert_eq!(found.action_type, ActionType::AddComponent);
    assert_eq!(found.target_slug.as_deref(), Some("gift-box"));
    assert_eq!(found.payload_json, Some(json!({ "quantity": 2.0 })));
    assert_eq!(found.action_ts, log.action_ts);
}

#[test]
fn test_find_by_target_按时间倒序() {
    let conn = open_in_memory().unwrap();
    let first = ActionLog::new(ActionType::AddComponent, "tester", Some("gift-box"));
    let second = ActionLog::new(ActionType::RemoveComponent, "tester", Some("gift-box"));
    let other = ActionLog::new(ActionType::AddComponent, "tester", Some("cake"));
    ActionLogRepository::batch_insert(&conn, &[first, second, other]).unwrap();

    let logs = ActionLogRepository::find_by_target(&conn, "gift-box").unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].action_type, ActionType::RemoveComponent);
    assert_eq!(ActionLogRepository::count(&conn).unwrap(), 3);
}

#[test]
fn test_find_by_id_不存在() {
    let conn = open_in_memory().unwrap();
    assert!(ActionLogRepository::find_by_id(&conn, "missing").unwrap().is_none());
}
