//! Task deadlines.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::{Duration, Instant};

use pgq_client::{BrokenReason, Config, ConnectionStatus, Driver, Error, TimeoutConfig};
use pgq_testing::{
    ConnectBehavior, EventLog, ManualEventLoop, MockConnector, MockResponse, expire, init_tracing,
    pump, step,
};

fn driver_with(
    connector: MockConnector,
    timeouts: TimeoutConfig,
) -> Driver<MockConnector, ManualEventLoop> {
    init_tracing();
    Driver::new(
        connector,
        ManualEventLoop::new(),
        Config::new().timeouts(timeouts),
    )
}

#[test]
fn test_connect_deadline_from_config() {
    let connector = MockConnector::builder()
        .with_connect(ConnectBehavior::Hang)
        .build();
    let mut driver = driver_with(
        connector,
        TimeoutConfig::none().connect_timeout(Duration::from_secs(3)),
    );

    let before = Instant::now();
    let conn = driver.connect("dbname=app", |_| {}).unwrap();
    let deadline = driver.event_loop().watch_for(conn.id()).unwrap().deadline.unwrap();

    assert!(deadline >= before + Duration::from_secs(3));
    assert!(deadline <= Instant::now() + Duration::from_secs(3));
}

#[test]
fn test_conninfo_connect_timeout_takes_precedence() {
    let mut driver = driver_with(MockConnector::default(), TimeoutConfig::default());

    let before = Instant::now();
    let conn = driver.connect("dbname=app connect_timeout=5", |_| {}).unwrap();
    let deadline = driver.event_loop().watch_for(conn.id()).unwrap().deadline.unwrap();

    assert!(deadline >= before + Duration::from_secs(5));
    assert!(deadline < before + Duration::from_secs(30));
}

#[test]
fn test_zero_conninfo_connect_timeout_disables_deadline() {
    let connector = MockConnector::builder()
        .with_connect(ConnectBehavior::Hang)
        .build();
    let mut driver = driver_with(connector, TimeoutConfig::default());
    let log = EventLog::new();

    let conn = driver
        .connect("dbname=app connect_timeout=0", log.listener())
        .unwrap();

    for _ in 0..5 {
        step(&mut driver);
    }
    let watch = driver.event_loop().watch_for(conn.id()).unwrap();
    assert!(watch.deadline.is_none());
    assert!(
        driver
            .event_loop()
            .expire_due(Instant::now() + Duration::from_secs(3600))
            .is_empty()
    );
    assert_eq!(driver.status(conn).unwrap(), ConnectionStatus::Connecting);
    assert!(log.is_empty());
}

#[test]
fn test_uri_connect_timeout_takes_precedence() {
    let mut driver = driver_with(MockConnector::default(), TimeoutConfig::default());

    let before = Instant::now();
    let conn = driver
        .connect("postgresql://app@localhost/app?connect_timeout=5", |_| {})
        .unwrap();
    let deadline = driver.event_loop().watch_for(conn.id()).unwrap().deadline.unwrap();

    assert!(deadline >= before + Duration::from_secs(5));
    assert!(deadline < before + Duration::from_secs(30));
}

#[test]
fn test_hung_handshake_times_out() {
    let connector = MockConnector::builder()
        .with_connect(ConnectBehavior::Hang)
        .build();
    let mut driver = driver_with(connector, TimeoutConfig::default());
    let log = EventLog::new();

    let conn = driver.connect("dbname=app", log.listener()).unwrap();
    let queued = driver.exec(conn, "SELECT 1").unwrap();
    for _ in 0..5 {
        step(&mut driver);
    }
    assert_eq!(driver.status(conn).unwrap(), ConnectionStatus::Connecting);

    assert!(expire(&mut driver, conn.id()));

    let connect = &log.completions()[0];
    assert!(matches!(
        connect.error(),
        Some(Error::ConnectionBroken(BrokenReason::TimedOut(_)))
    ));
    assert!(log.completion(queued).unwrap().error().unwrap().is_connection_broken());
    assert_eq!(log.broken_count(), 1);
    assert_eq!(driver.status(conn).unwrap(), ConnectionStatus::Broken);
}

#[test]
fn test_command_timeout_breaks_connection() {
    let connector = MockConnector::builder()
        .with_response("SELECT pg_sleep(60)", MockResponse::Hang)
        .build();
    let mut driver = driver_with(
        connector,
        TimeoutConfig::none().command_timeout(Duration::from_secs(1)),
    );
    let log = EventLog::new();

    let conn = driver.connect("dbname=app", log.listener()).unwrap();
    let slow = driver.exec(conn, "SELECT pg_sleep(60)").unwrap();
    let next = driver.exec(conn, "SELECT 1").unwrap();

    // Handshake, first result wait, then the query hangs.
    for _ in 0..4 {
        step(&mut driver);
    }
    assert_eq!(driver.status(conn).unwrap(), ConnectionStatus::Busy);
    assert!(
        driver
            .event_loop()
            .watch_for(conn.id())
            .unwrap()
            .deadline
            .is_some()
    );

    let due = driver
        .event_loop()
        .expire_due(Instant::now() + Duration::from_secs(2));
    assert_eq!(due.len(), 1);
    for (connection, readiness) in due {
        driver.on_ready(connection, readiness);
    }

    let err = log.completion(slow).unwrap().error().cloned().unwrap();
    match err {
        Error::ConnectionBroken(BrokenReason::TimedOut(after)) => {
            assert!(after < Duration::from_secs(60));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(log.completion(next).unwrap().error().unwrap().is_connection_broken());
    assert!(!driver.is_valid(conn).unwrap());
}

#[test]
fn test_deadline_not_due_leaves_task_running() {
    let mut driver = driver_with(
        MockConnector::default(),
        TimeoutConfig::none().command_timeout(Duration::from_secs(60)),
    );
    let log = EventLog::new();

    let conn = driver.connect("dbname=app", log.listener()).unwrap();
    driver.exec(conn, "SELECT 1").unwrap();
    step(&mut driver);

    assert!(driver.event_loop().expire_due(Instant::now()).is_empty());
    pump(&mut driver);

    assert_eq!(log.completions().len(), 2);
    assert!(log.completions().iter().all(|c| c.is_ok()));
    assert!(driver.is_valid(conn).unwrap());
}

#[test]
fn test_connect_deadline_does_not_apply_to_queries() {
    let mut driver = driver_with(
        MockConnector::default(),
        TimeoutConfig::none().connect_timeout(Duration::from_secs(1)),
    );

    let conn = driver.connect("dbname=app", |_| {}).unwrap();
    driver.exec(conn, "SELECT 1").unwrap();
    step(&mut driver);

    assert_eq!(driver.status(conn).unwrap(), ConnectionStatus::Busy);
    let watch = driver.event_loop().watch_for(conn.id()).unwrap();
    assert!(watch.deadline.is_none());
}
