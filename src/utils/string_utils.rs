/// Reduce `text` to a storage-safe object name.
///
/// Non-ASCII characters are dropped, then anything outside `[A-Za-z0-9_.-]`
/// becomes `_`.
pub fn sanitize_filename(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii)
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '-' => c,
            _ => '_',
        })
        .collect()
}
