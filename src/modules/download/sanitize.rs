pub const MAX_FILENAME_CHARS: usize = 100;
/// Leaves room for a ` (n)` suffix and the extension under the usual
/// 255-byte filename limit.
pub const MAX_FILENAME_BYTES: usize = 200;
pub const FALLBACK_FILENAME: &str = "download";

const ILLEGAL: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maps a video title to a safe file stem (no extension).
pub fn sanitize(title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter(|c| !ILLEGAL.contains(c) && !(c.is_control() && !c.is_whitespace()))
        .collect();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let name = truncate(&collapsed).trim_end();

    if name.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        name.to_string()
    }
}

/// Longest prefix within both the character and the byte limit, cut on a
/// character boundary.
fn truncate(name: &str) -> &str {
    let end = name
        .char_indices()
        .take(MAX_FILENAME_CHARS)
        .map(|(start, c)| start + c.len_utf8())
        .take_while(|&end| end <= MAX_FILENAME_BYTES)
        .last()
        .unwrap_or(0);
    &name[..end]
}
