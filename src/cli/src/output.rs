//! Table formatting helpers for CLI output.

use comfy_table::{ContentArrangement, Table};

/// Display width of container ids.
pub const SHORT_ID_LEN: usize = 12;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Truncate long engine ids for display; pids pass through unchanged.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table() {
        let table = new_table(&["ID", "IMAGE", "NAMES"]);
        let output = table.to_string();
        assert!(output.contains("ID"));
        assert!(output.contains("IMAGE"));
        assert!(output.contains("NAMES"));
    }

    #[test]
    fn test_new_table_with_rows() {
        let mut table = new_table(&["COL1", "COL2"]);
        table.add_row(["hello", "world"]);
        table.add_row(["foo", "bar"]);
        let output = table.to_string();
        assert!(output.contains("hello"));
        assert!(output.contains("world"));
        assert!(output.contains("foo"));
        assert!(output.contains("bar"));
    }

    #[test]
    fn test_short_id() {
        let id = "4f66ad9a0b2e3c1d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d";
        assert_eq!(short_id(id), "4f66ad9a0b2e");
        assert_eq!(short_id("12345"), "12345");
        assert_eq!(short_id("0123456789ab"), "0123456789ab");
        assert_eq!(short_id(""), "");
    }
}
