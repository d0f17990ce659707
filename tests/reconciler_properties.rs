//! 状态协调集成测试
//!
//! 覆盖多轮检测下的通知次数与持久化状态。

mod common;

use chrono::{Local, TimeZone};
use common::{registry_with, temp_connection, RecordingNotifier};
use nrpe_vitals::check::CheckResult;
use nrpe_vitals::reconciler::{Reconciler, Transition};
use nrpe_vitals::store::CheckRecord;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_repeated_problem_notifies_once() {
    let (_dir, _store, conn) = temp_connection().await;
    let syslog = RecordingNotifier::new("syslog");
    let registry = registry_with(&[syslog.clone()]);
    let reconciler = Reconciler::new(conn.clone(), registry.resolve(&names(&["syslog"])));

    for _ in 0..10 {
        let result = CheckResult::new("web1", "load", 1, "load high");
        reconciler.reconcile(&result).await.unwrap();
    }

    assert_eq!(syslog.count(), 1);
    let record = conn.get("web1", "load").await.unwrap().unwrap();
    assert_eq!(record.status, 1);
}

#[tokio::test]
async fn test_recovery_deletes_row_and_notifies() {
    let (_dir, _store, conn) = temp_connection().await;
    let syslog = RecordingNotifier::new("syslog");
    let registry = registry_with(&[syslog.clone()]);
    let reconciler = Reconciler::new(conn.clone(), registry.resolve(&names(&["syslog"])));

    reconciler
        .reconcile(&CheckResult::new("web1", "http", 2, "down"))
        .await
        .unwrap();
    let outcome = reconciler
        .reconcile(&CheckResult::new("web1", "http", 0, "up again"))
        .await
        .unwrap();

    assert_eq!(outcome.transition, Transition::Recovered { from: 2 });
    assert_eq!(outcome.prior.map(|r| r.status), Some(2));
    assert!(conn.get("web1", "http").await.unwrap().is_none());

    let events = syslog.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].message, "up again");
    assert_eq!(events[1].transition, Transition::Recovered { from: 2 });
}

#[tokio::test]
async fn test_healthy_results_are_silent() {
    let (_dir, _store, conn) = temp_connection().await;
    let syslog = RecordingNotifier::new("syslog");
    let registry = registry_with(&[syslog.clone()]);
    let reconciler = Reconciler::new(conn.clone(), registry.resolve(&names(&["syslog"])));

    for _ in 0..3 {
        let outcome = reconciler
            .reconcile(&CheckResult::new("web1", "http", 0, "ok"))
            .await
            .unwrap();
        assert_eq!(outcome.transition, Transition::Healthy);
        assert!(!outcome.notified());
    }

    assert_eq!(syslog.count(), 0);
    assert!(conn.list_problems().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_severity_change_notifies_and_updates() {
    let (_dir, _store, conn) = temp_connection().await;
    let syslog = RecordingNotifier::new("syslog");
    let registry = registry_with(&[syslog.clone()]);
    let reconciler = Reconciler::new(conn.clone(), registry.resolve(&names(&["syslog"])));

    reconciler
        .reconcile(&CheckResult::new("db", "disk1", 1, "disk warning"))
        .await
        .unwrap();
    let outcome = reconciler
        .reconcile(&CheckResult::new("db", "disk1", 2, "disk critical"))
        .await
        .unwrap();

    assert_eq!(outcome.transition, Transition::StatusChanged { from: 1, to: 2 });
    assert_eq!(syslog.count(), 2);
    assert_eq!(conn.get("db", "disk1").await.unwrap().unwrap().status, 2);
}

#[tokio::test]
async fn test_disk_scenario() {
    let (_dir, _store, conn) = temp_connection().await;
    let syslog = RecordingNotifier::new("syslog");
    let pushover = RecordingNotifier::new("pushover");
    let registry = registry_with(&[syslog.clone(), pushover.clone()]);
    let reconciler = Reconciler::new(
        conn.clone(),
        registry.resolve(&names(&["syslog", "pushover"])),
    );
    let t1 = Local.with_ymd_and_hms(2018, 2, 22, 12, 0, 0).unwrap();
    let t2 = Local.with_ymd_and_hms(2018, 2, 22, 12, 5, 0).unwrap();
    let t3 = Local.with_ymd_and_hms(2018, 2, 22, 12, 10, 0).unwrap();

    // 第一轮：出现问题
    let first = CheckResult::new("db.example.com", "disk1", 2, "disk nok").with_timestamp(t1);
    let outcome = reconciler.reconcile(&first).await.unwrap();
    assert_eq!(outcome.transition, Transition::NewProblem { status: 2 });

    let expected_row = CheckRecord::new("db.example.com", "disk1", 2, t1.timestamp());
    assert_eq!(
        conn.get("db.example.com", "disk1").await.unwrap(),
        Some(expected_row.clone())
    );
    assert_eq!(syslog.count(), 1);
    assert_eq!(pushover.count(), 1);
    assert!(syslog.events()[0].message.contains("disk nok"));

    // 第二轮：同一问题，不通知，记录不变
    let second = CheckResult::new("db.example.com", "disk1", 2, "disk nok").with_timestamp(t2);
    let outcome = reconciler.reconcile(&second).await.unwrap();
    assert_eq!(outcome.transition, Transition::StillProblem { status: 2 });
    assert!(!outcome.notified());
    assert_eq!(
        conn.get("db.example.com", "disk1").await.unwrap(),
        Some(expected_row)
    );
    assert_eq!(syslog.count(), 1);
    assert_eq!(pushover.count(), 1);

    // 第三轮：恢复
    let third = CheckResult::new("db.example.com", "disk1", 0, "disk ok").with_timestamp(t3);
    let outcome = reconciler.reconcile(&third).await.unwrap();
    assert_eq!(outcome.transition, Transition::Recovered { from: 2 });
    assert!(conn.get("db.example.com", "disk1").await.unwrap().is_none());
    assert_eq!(syslog.count(), 2);
    assert_eq!(pushover.count(), 2);
    assert_eq!(
        syslog.events()[1].transition,
        Transition::Recovered { from: 2 }
    );
}

#[tokio::test]
async fn test_unknown_notifier_is_dropped() {
    let (_dir, _store, conn) = temp_connection().await;
    let syslog = RecordingNotifier::new("syslog");
    let registry = registry_with(&[syslog.clone()]);
    let reconciler = Reconciler::new(conn, registry.resolve(&names(&["syslog", "bogus"])));

    let outcome = reconciler
        .reconcile(&CheckResult::new("web1", "http", 2, "down"))
        .await
        .unwrap();

    let report = outcome.dispatch.unwrap();
    assert_eq!(report.delivered, vec!["syslog".to_string()]);
    assert_eq!(report.unknown, vec!["bogus".to_string()]);
    assert!(!report.no_valid_notifier);
    assert_eq!(syslog.count(), 1);
}

#[tokio::test]
async fn test_only_unknown_notifiers_still_commit() {
    let (_dir, _store, conn) = temp_connection().await;
    let registry = registry_with(&[]);
    let reconciler = Reconciler::new(conn.clone(), registry.resolve(&names(&["bogus"])));

    let outcome = reconciler
        .reconcile(&CheckResult::new("web1", "http", 2, "down"))
        .await
        .unwrap();

    assert!(outcome.dispatch.unwrap().no_valid_notifier);
    assert_eq!(conn.get("web1", "http").await.unwrap().unwrap().status, 2);
}

#[tokio::test]
async fn test_failed_delivery_keeps_committed_state() {
    let (_dir, _store, conn) = temp_connection().await;
    let broken = RecordingNotifier::failing("pushover");
    let syslog = RecordingNotifier::new("syslog");
    let registry = registry_with(&[broken.clone(), syslog.clone()]);
    let reconciler = Reconciler::new(
        conn.clone(),
        registry.resolve(&names(&["pushover", "syslog"])),
    );

    let outcome = reconciler
        .reconcile(&CheckResult::new("web1", "http", 2, "down"))
        .await
        .unwrap();
    let report = outcome.dispatch.unwrap();
    assert_eq!(report.failed, vec!["pushover".to_string()]);
    assert_eq!(report.delivered, vec!["syslog".to_string()]);

    // 下一轮相同状态不会重发
    reconciler
        .reconcile(&CheckResult::new("web1", "http", 2, "down"))
        .await
        .unwrap();
    assert_eq!(broken.count(), 1);
    assert_eq!(syslog.count(), 1);
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let (_dir, _store, conn) = temp_connection().await;

    conn.upsert_problem("web1", "http", 2, 100).await.unwrap();
    conn.clear("web1", "http").await.unwrap();
    conn.clear("web1", "http").await.unwrap();

    assert!(conn.get("web1", "http").await.unwrap().is_none());
}

#[tokio::test]
async fn test_keys_are_independent() {
    let (_dir, _store, conn) = temp_connection().await;
    let syslog = RecordingNotifier::new("syslog");
    let registry = registry_with(&[syslog.clone()]);
    let reconciler = Reconciler::new(conn.clone(), registry.resolve(&names(&["syslog"])));

    reconciler
        .reconcile(&CheckResult::new("web1", "http", 2, "down"))
        .await
        .unwrap();
    reconciler
        .reconcile(&CheckResult::new("web2", "http", 2, "down"))
        .await
        .unwrap();
    reconciler
        .reconcile(&CheckResult::new("web1", "http", 0, "up"))
        .await
        .unwrap();

    let problems = conn.list_problems().await.unwrap();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].machine, "web2");
    assert_eq!(syslog.count(), 3);
}
