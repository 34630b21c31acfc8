// Logging macro

/// Format and enqueue a log record through the calling thread's input ring.
///
/// The arguments are captured by value and rendered later on the output
/// thread, so the hot path does no formatting, locking or allocation.
///
/// # Examples
/// ```ignore
/// framelog::log!("worker %d bound to %s\n", core_id, interface)?;
/// framelog::log!("drained\n")?;
/// ```
#[macro_export]
macro_rules! log {
    ($fmt:expr) => {
        $crate::write_record($crate::template($fmt, ()))
    };
    ($fmt:expr, $($arg:expr),+ $(,)?) => {
        $crate::write_record($crate::template($fmt, ($($arg),+,)))
    };
}
