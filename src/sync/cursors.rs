use serde::{Deserialize, Serialize};

/// Number of distinct caret colors peers are spread over
pub const CURSOR_PALETTE_SIZE: u32 = 6;

/// Opaque handle to a decoration owned by the editor surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecorationId(pub u64);

/// A peer's caret as drawn in the local editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCursor {
    pub line: u32,
    pub column: u32,
    pub color_index: u32,
    pub decoration_handles: Vec<DecorationId>,
}

/// What the surface is asked to draw for one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorDecoration {
    pub line: u32,
    pub column: u32,
    pub color_index: u32,
}

impl RemoteCursor {
    pub fn decoration(&self) -> CursorDecoration {
        CursorDecoration { line: self.line, column: self.column, color_index: self.color_index }
    }
}

/// Stable color for a connection id.
///
/// Same string hash the browser clients use (`h = (h << 5) - h + c` over
/// UTF-16 units, shift in 32-bit), so every participant sees a peer in the
/// same color.
pub fn color_index(sender_id: &str) -> u32 {
    let mut h: i64 = 0;
    for unit in sender_id.encode_utf16() {
        let shifted = (h as i32).wrapping_shl(5) as i64;
        h = shifted - h + unit as i64;
    }
    (h.unsigned_abs() % CURSOR_PALETTE_SIZE as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_is_stable_and_in_range() {
        let a = color_index("Xk9_abc123");
        assert_eq!(a, color_index("Xk9_abc123"));
        for id in ["", "a", "socket-id-with-a-long-suffix-0123456789", "ünï"] {
            assert!(color_index(id) < CURSOR_PALETTE_SIZE);
        }
    }

    #[test]
    fn matches_reference_hash_values() {
        // "a" -> 97, "ab" -> 97*31 + 98 = 3105
        assert_eq!(color_index("a"), 97 % 6);
        assert_eq!(color_index("ab"), 3105 % 6);
    }
}
