//! Message splitting for the notification API.
//!
//! Telegram caps a text message at 4096 characters and a photo caption at
//! 1024. Lengths here are counted in `char`s, not bytes.

/// Maximum characters per text message.
pub const MESSAGE_MAX: usize = 4096;
/// Maximum characters per photo caption.
pub const CAPTION_MAX: usize = 1024;

/// Split `text` into chunks of at most `max` characters.
///
/// Whole lines are packed greedily, so a chunk ends at the last newline that
/// still fits; the newline at a boundary is dropped. A single line longer
/// than `max` is hard-split.
pub fn split_chunks(text: &str, max: usize) -> Vec<String> {
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let cost = if current.is_empty() {
            line_len
        } else {
            1 + line_len
        };

        if !current.is_empty() && current_len + cost > max {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = line.chars().collect();
            let mut pieces = chars.chunks(max).map(|c| c.iter().collect::<String>());
            let mut last = pieces.next().unwrap_or_default();
            for piece in pieces {
                chunks.push(std::mem::replace(&mut last, piece));
            }
            current_len = last.chars().count();
            current = last;
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_chunks("Hello, world!", MESSAGE_MAX);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn exactly_max_is_single_chunk() {
        let text = "a".repeat(MESSAGE_MAX);
        assert_eq!(split_chunks(&text, MESSAGE_MAX).len(), 1);
    }

    #[test]
    fn over_limit_splits_on_last_fitting_newline() {
        let line = "a".repeat(2000);
        let text = format!("{line}\n{line}\n{line}");
        let chunks = split_chunks(&text, MESSAGE_MAX);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{line}\n{line}"));
        assert_eq!(chunks[1], line);
    }

    #[test]
    fn very_long_single_line_force_splits() {
        let text = "x".repeat(9000);
        let chunks = split_chunks(&text, MESSAGE_MAX);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), MESSAGE_MAX);
        assert_eq!(chunks[2].len(), 9000 - 2 * MESSAGE_MAX);
    }

    #[test]
    fn long_line_after_short_one_starts_a_new_chunk() {
        let text = format!("intro\n{}", "y".repeat(12));
        let chunks = split_chunks(&text, 10);
        assert_eq!(chunks, vec!["intro", "yyyyyyyyyy", "yy"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 3000 two-byte characters fit one message even though they take 6000 bytes.
        let text = "é".repeat(3000);
        assert_eq!(split_chunks(&text, MESSAGE_MAX).len(), 1);

        let text = "é".repeat(5000);
        let chunks = split_chunks(&text, MESSAGE_MAX);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= MESSAGE_MAX));
    }
}
