//! Cursor arithmetic for the rotator

/// Cursor position after the element at `removed` is taken out of a set of
/// `old_len` elements
///
/// The cursor keeps pointing at the same logical element when that element
/// survives. When the removed element was under the cursor, the cursor moves to
/// its successor, wrapping to the front if it fell off the end.
pub fn cursor_after_removal(cursor: usize, removed: usize, old_len: usize) -> usize {
    let new_len = old_len.saturating_sub(1);
    if new_len == 0 {
        return 0;
    }

    let adjusted = if removed < cursor { cursor - 1 } else { cursor };
    if adjusted >= new_len {
        0
    } else {
        adjusted
    }
}

/// Cursor position after yielding the element under `cursor`
pub fn advance(cursor: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (cursor + 1) % len
    }
}
