//! Ad-segment filtering for HLS playlists.

const DISCONTINUITY: &str = "#EXT-X-DISCONTINUITY";

/// Drop every region opened by `#EXT-X-DISCONTINUITY`, up to and including
/// the next `#EXT-X-DISCONTINUITY` line.
///
/// Inserted ads are bracketed by discontinuity tags on most of the sources
/// this is used with. An unterminated region runs to the end of the playlist,
/// except for `#EXT-X-ENDLIST`, which is always kept.
pub fn filter_ad_segments(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut result = String::with_capacity(text.len());
    let mut skipping = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with(DISCONTINUITY) {
            skipping = !skipping;
            continue;
        }
        if skipping && trimmed != "#EXT-X-ENDLIST" {
            continue;
        }
        result.push_str(line);
        result.push('\n');
    }

    result
}

/// Count the segment URIs (non-empty, non-tag lines) in a playlist.
pub fn segment_count(text: &str) -> usize {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .count()
}
