//! Text Chunking Module
//!
//! Splits raw document text into fixed-size overlapping windows, each tagged
//! with the display name of the document it came from. Window sizes are
//! measured in characters, not bytes, so Arabic text never splits inside a
//! scalar value.

use super::index::Chunk;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// Chunking settings (character counts)
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Window size per chunk
    pub chunk_size: usize,
    /// Overlap carried from one window into the next
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            overlap: 200,
        }
    }
}

// ============================================================================
// Splitting
// ============================================================================

/// Split text into overlapping fixed-size chunks.
///
/// Walks the text with a window of `chunk_size` characters advancing by
/// `chunk_size - overlap` each step, stopping once the window start reaches
/// the end of the text. The final window is truncated, never padded.
///
/// If `overlap >= chunk_size` the step would be non-positive; the cursor then
/// advances to the current window's end so the walk always terminates.
///
/// # Arguments
/// * `text` - raw document text
/// * `source` - display name of the originating document
/// * `config` - window size and overlap
pub fn split_into_chunks(text: &str, source: &str, config: &ChunkConfig) -> Vec<Chunk> {
    if text.is_empty() || config.chunk_size == 0 {
        return Vec::new();
    }

    // Byte offsets of every character boundary, plus the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;

    let step = config.chunk_size.saturating_sub(config.overlap);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < char_count {
        let end = (start + config.chunk_size).min(char_count);
        chunks.push(Chunk {
            text: text[bounds[start]..bounds[end]].to_string(),
            source: source.to_string(),
        });

        if step == 0 {
            // Misconfigured overlap: jump to the window end instead of looping.
            start = end;
        } else {
            start += step;
        }
    }

    chunks
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, overlap: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            overlap,
        }
    }

    #[test]
    fn test_empty_text() {
        let chunks = split_into_chunks("", "doc.txt", &ChunkConfig::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_into_chunks("hello world", "doc.txt", &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].source, "doc.txt");
    }

    #[test]
    fn test_window_offsets() {
        // 10 chars, window 4, overlap 1 -> step 3: [0..4), [3..7), [6..10), [9..10)
        let chunks = split_into_chunks("abcdefghij", "doc.txt", &config(4, 1));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij", "j"]);
    }

    #[test]
    fn test_chunk_count_closed_form() {
        // len 5000, window 2000, overlap 200 -> step 1800:
        // ceil((5000 - 200) / 1800) = 3 windows at 0, 1800, 3600
        let text = "x".repeat(5000);
        let chunks = split_into_chunks(&text, "doc.txt", &ChunkConfig::default());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), 2000);
        assert_eq!(chunks[1].text.len(), 2000);
        assert_eq!(chunks[2].text.len(), 1400);
    }

    #[test]
    fn test_every_chunk_within_window_size() {
        let text = "word ".repeat(1000);
        let chunks = split_into_chunks(&text, "doc.txt", &ChunkConfig::default());
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 2000));
    }

    #[test]
    fn test_overlap_stripped_concatenation_reconstructs_input() {
        let text: String = (0..5000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let cfg = ChunkConfig::default();
        let chunks = split_into_chunks(&text, "doc.txt", &cfg);

        let mut rebuilt = chunks[0].text.clone();
        for pair in chunks.windows(2) {
            // Each next window re-reads the previous window's tail.
            let carried = pair[0].text.chars().count() - (cfg.chunk_size - cfg.overlap);
            rebuilt.extend(pair[1].text.chars().skip(carried));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = "التدقيق الداخلي ".repeat(300);
        let chunks = split_into_chunks(&text, "دليل.txt", &ChunkConfig::default());
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 2000));
    }

    #[test]
    fn test_non_positive_step_still_terminates() {
        // overlap >= chunk_size: cursor falls back to the window end.
        let chunks = split_into_chunks("abcdefghij", "doc.txt", &config(4, 4));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_deterministic() {
        let text = "The audit committee reviews internal controls quarterly. ".repeat(100);
        let a = split_into_chunks(&text, "doc.txt", &ChunkConfig::default());
        let b = split_into_chunks(&text, "doc.txt", &ChunkConfig::default());
        assert_eq!(a.len(), b.len());
        assert!(a.iter().zip(&b).all(|(x, y)| x.text == y.text));
    }
}
