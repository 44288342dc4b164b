//
// utf16.rs
//
// Column conversions between tree-sitter byte offsets and LSP UTF-16 offsets
//

/// Convert a UTF-16 column offset (from LSP Position.character) to a byte
/// offset within the given line. Tree-sitter Points expect byte offsets, not
/// UTF-16 code units.
pub fn utf16_column_to_byte_offset(line: &str, utf16_col: u32) -> usize {
    let mut utf16_count = 0;
    for (byte_idx, ch) in line.char_indices() {
        if utf16_count == utf16_col as usize {
            return byte_idx;
        }
        utf16_count += ch.len_utf16();
    }
    line.len()
}

/// Convert a byte offset within a line to a UTF-16 column.
pub fn byte_offset_to_utf16_column(line: &str, byte_offset: usize) -> u32 {
    let mut end = byte_offset.min(line.len());
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    line[..end].encode_utf16().count() as u32
}

/// Text of the zero-based `row` in `content`, without its line terminator.
/// Rows past the end of the content yield an empty line.
pub fn line_at(content: &str, row: usize) -> &str {
    content.lines().nth(row).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_columns_are_identity() {
        let line = "const x = 1;";
        assert_eq!(byte_offset_to_utf16_column(line, 6), 6);
        assert_eq!(utf16_column_to_byte_offset(line, 6), 6);
    }

    #[test]
    fn test_multibyte_before_column() {
        // "é" is 2 bytes in UTF-8 and 1 UTF-16 unit
        let line = "const é = x;";
        let x_byte = line.find('x').unwrap();
        let col = byte_offset_to_utf16_column(line, x_byte);
        assert_eq!(col as usize, x_byte - 1);
        assert_eq!(utf16_column_to_byte_offset(line, col), x_byte);
    }

    #[test]
    fn test_astral_plane_counts_two_units() {
        let line = "'😀' + y";
        let y_byte = line.find('y').unwrap();
        // 😀 is 4 bytes and 2 UTF-16 units
        assert_eq!(byte_offset_to_utf16_column(line, y_byte) as usize, y_byte - 2);
    }

    #[test]
    fn test_offsets_past_end_clamp() {
        assert_eq!(utf16_column_to_byte_offset("abc", 99), 3);
        assert_eq!(byte_offset_to_utf16_column("abc", 99), 3);
    }

    #[test]
    fn test_line_at_handles_crlf_and_overflow() {
        let content = "a\r\nbc\r\n";
        assert_eq!(line_at(content, 0), "a");
        assert_eq!(line_at(content, 1), "bc");
        assert_eq!(line_at(content, 2), "");
    }
}
