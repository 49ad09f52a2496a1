#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pgq_client::{Config, Driver};
use pgq_testing::{EventLog, ManualEventLoop, MockConnector, MockResponse, expire, step};

#[derive(Debug, Arbitrary)]
enum Op {
    Exec(u8),
    Disconnect,
    Step,
    Expire,
    Release,
    IsBusy,
}

#[derive(Debug, Arbitrary)]
struct Input {
    connect_steps: u8,
    query_steps: u8,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let connector = MockConnector::builder()
        .with_response("q0", MockResponse::syntax_error("syntax error"))
        .with_response("q1", MockResponse::Reset)
        .with_response("q2", MockResponse::fatal("57P01", "terminating connection"))
        .with_connect_steps(usize::from(input.connect_steps % 4))
        .with_query_steps(usize::from(input.query_steps % 4))
        .build();
    let mut driver = Driver::new(connector, ManualEventLoop::new(), Config::default());
    let log = EventLog::new();
    let Ok(conn) = driver.connect("dbname=fuzz", log.listener()) else {
        return;
    };

    let mut enqueued = 1usize;
    let mut released = false;
    for op in input.ops {
        match op {
            Op::Exec(n) => {
                if driver.exec(conn, &format!("q{}", n % 6)).is_ok() {
                    enqueued += 1;
                }
            }
            Op::Disconnect => {
                if driver.disconnect(conn).is_ok() {
                    enqueued += 1;
                }
            }
            Op::Step => {
                step(&mut driver);
            }
            Op::Expire => {
                expire(&mut driver, conn.id());
            }
            Op::Release => {
                if driver.release(conn).is_ok() {
                    released = true;
                }
            }
            Op::IsBusy => {
                let _ = driver.is_busy(conn);
            }
        }
        assert!(driver.event_loop().watch_count() <= 1);
        if released {
            break;
        }
    }

    while !released && step(&mut driver) > 0 {}

    // Every accepted task completes exactly once, in order.
    let ids = log.completed_ids();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    if !released {
        assert_eq!(ids.len(), enqueued);
    }
    assert!(log.broken_count() <= 1);
});
