// Lamport Clock Tests
// Monotonicity, the sync rule and the total order on timestamps

use lamport_ledger::clock::{LogicalClock, Timestamp};

// ============================================================================
// LOCAL EVENTS
// ============================================================================

#[test]
fn test_new_clock_starts_at_zero() {
    let clock = LogicalClock::new(7);

    assert_eq!(clock.get_time(), Timestamp::new(0, 7));
}

#[test]
fn test_increment_advances_counter() {
    let mut clock = LogicalClock::new(1);
    clock.increment();
    clock.increment();

    assert_eq!(clock.counter(), 2);
    assert_eq!(clock.node_id(), 1);
}

#[test]
fn test_tick_returns_new_time() {
    let mut clock = LogicalClock::new(3);

    assert_eq!(clock.tick(), Timestamp::new(1, 3));
    assert_eq!(clock.tick(), Timestamp::new(2, 3));
}

#[test]
fn test_get_time_has_no_side_effect() {
    let clock = LogicalClock::new(3);

    assert_eq!(clock.get_time(), clock.get_time());
}

// ============================================================================
// SYNC
// ============================================================================

#[test]
fn test_sync_jumps_past_later_counter() {
    let mut clock = LogicalClock::new(1);
    clock.sync(10, 2);

    assert_eq!(clock.get_time(), Timestamp::new(11, 1));
}

#[test]
fn test_sync_with_earlier_counter_only_increments() {
    let mut clock = LogicalClock::new(1);
    for _ in 0..5 {
        clock.increment();
    }
    clock.sync(2, 9);

    assert_eq!(clock.counter(), 6);
}

#[test]
fn test_sync_equal_counter_higher_id_adopts_then_bumps() {
    let mut clock = LogicalClock::new(1);
    for _ in 0..4 {
        clock.increment();
    }
    clock.sync(4, 2);

    assert_eq!(clock.get_time(), Timestamp::new(5, 1));
}

#[test]
fn test_sync_result_exceeds_both_inputs() {
    let cases = [(0u64, 2u32), (3, 1), (3, 3), (100, 0), (7, 5)];

    for (received_counter, received_id) in cases {
        let mut clock = LogicalClock::new(2);
        for _ in 0..3 {
            clock.increment();
        }
        let before = clock.get_time();
        let received = Timestamp::new(received_counter, received_id);

        clock.sync(received_counter, received_id);
        let after = clock.get_time();

        assert!(after > before, "{} not after {}", after, before);
        assert!(after > received, "{} not after {}", after, received);
    }
}

#[test]
fn test_observe_matches_sync() {
    let mut a = LogicalClock::new(1);
    let mut b = LogicalClock::new(1);

    a.observe(Timestamp::new(8, 4));
    b.sync(8, 4);

    assert_eq!(a, b);
}

#[test]
fn test_time_never_decreases() {
    let mut clock = LogicalClock::new(4);
    let mut last = clock.get_time();
    let inputs = [(2u64, 1u32), (50, 3), (10, 9), (51, 5), (0, 0), (52, 4)];

    for (c, id) in inputs {
        clock.sync(c, id);
        let now = clock.get_time();
        assert!(now >= last);
        last = now;

        clock.increment();
        let now = clock.get_time();
        assert!(now >= last);
        last = now;
    }
}

// ============================================================================
// TOTAL ORDER
// ============================================================================

#[test]
fn test_counter_dominates_node_id() {
    assert!(Timestamp::new(1, 99) < Timestamp::new(2, 0));
}

#[test]
fn test_equal_counters_break_ties_by_id() {
    assert!(Timestamp::new(5, 1) < Timestamp::new(5, 3));
    assert_ne!(Timestamp::new(5, 1), Timestamp::new(5, 3));
}

#[test]
fn test_order_is_total_and_transitive() {
    let stamps = [
        Timestamp::new(1, 1),
        Timestamp::new(1, 2),
        Timestamp::new(2, 1),
        Timestamp::new(2, 3),
        Timestamp::new(9, 0),
    ];

    for a in &stamps {
        for b in &stamps {
            if a != b {
                assert!((a < b) ^ (b < a), "{} and {} not comparable", a, b);
            }
            for c in &stamps {
                if a < b && b < c {
                    assert!(a < c);
                }
            }
        }
    }
}

#[test]
fn test_timestamp_wire_shape() {
    let ts = Timestamp::new(12, 3);
    let json = serde_json::to_string(&ts).unwrap();

    assert_eq!(json, "[12,3]");
    assert_eq!(serde_json::from_str::<Timestamp>(&json).unwrap(), ts);
}

#[test]
fn test_display() {
    assert_eq!(Timestamp::new(5, 1).to_string(), "(5, 1)");
}
