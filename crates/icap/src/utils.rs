//! Internal helpers shared by the codec and connection layers.

/// Returns early with `$error` when `$predicate` does not hold.
///
/// ```ignore
/// ensure!(offset <= MAX_HEAD_BYTES, ParseError::too_large_header(offset, MAX_HEAD_BYTES));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
