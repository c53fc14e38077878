//! Assertion utilities for testing

/// Assert that a result is OK and unwrap it
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("Expected Ok, got Err: {:?}", err),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("Expected Ok, got Err: {:?} ({})", err, format!($($arg)+)),
        }
    };
}

/// Assert that a result is Err and unwrap the error
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(val) => panic!("Expected Err, got Ok: {:?}", val),
            Err(err) => err,
        }
    };
}

/// Assert that a value is within an inclusive range
#[macro_export]
macro_rules! assert_in_range {
    ($value:expr, $min:expr, $max:expr) => {
        assert!(
            $value >= $min && $value <= $max,
            "{} not in range [{}, {}]",
            $value,
            $min,
            $max
        );
    };
}

/// Assert that a `Phase` has the given name and status
#[macro_export]
macro_rules! assert_phase {
    ($phase:expr, $name:ident, $status:ident) => {{
        let p = &$phase;
        assert_eq!(
            (p.name, p.status),
            (
                ::meridian_types::app::PhaseName::$name,
                ::meridian_types::app::PhaseStatus::$status
            ),
            "unexpected phase {}",
            p
        );
    }};
    ($phase:expr, $name:ident, $status:ident, starts_at = $start:expr) => {{
        $crate::assert_phase!($phase, $name, $status);
        assert_eq!($phase.utc_start_ms, $start, "unexpected start of {}", $phase);
    }};
}

/// Receive from a broadcast receiver, failing the test if nothing arrives in time.
///
/// Evaluates to the received value. Under a paused Tokio clock the timeout is
/// virtual and costs no real time.
#[macro_export]
macro_rules! recv_within {
    ($rx:expr, $ms:expr) => {
        match ::tokio::time::timeout(::std::time::Duration::from_millis($ms), $rx.recv()).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => panic!("channel error: {:?}", e),
            Err(_) => panic!("nothing received within {}ms", $ms),
        }
    };
}
