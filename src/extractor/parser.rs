//! Classifier for yt-dlp error output

use super::ExtractError;

/// Longest failure message kept on a job
const MAX_MESSAGE_LEN: usize = 500;

/// Classify a failed yt-dlp run from its stderr
///
/// The most specific `ERROR:` line (or the last non-empty line) becomes the
/// message. Output that matches no known pattern is treated as
/// [`ExtractError::UpstreamUnavailable`], which is retryable.
pub fn classify_failure(stderr: &str) -> ExtractError {
    let message = error_line(stderr);
    let lower = stderr.to_ascii_lowercase();

    if lower.contains("http error 429")
        || lower.contains("too many requests")
        || lower.contains("rate limit")
        || lower.contains("rate-limit")
        || lower.contains("not a bot")
    {
        ExtractError::RateLimited(message)
    } else if lower.contains("video unavailable")
        || lower.contains("private video")
        || lower.contains("has been removed")
        || lower.contains("has been terminated")
        || lower.contains("does not exist")
        || lower.contains("http error 404")
        || lower.contains("confirm your age")
        || lower.contains("members-only")
    {
        ExtractError::NotFound(message)
    } else if lower.contains("requested format is not available")
        || lower.contains("requested format not available")
        || lower.contains("no video formats found")
        || lower.contains("unsupported url")
    {
        ExtractError::UnsupportedFormat(message)
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ExtractError::Timeout(message)
    } else {
        ExtractError::UpstreamUnavailable(message)
    }
}

fn error_line(stderr: &str) -> String {
    let line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("yt-dlp exited with an error and no output");

    let line = line.strip_prefix("ERROR:").map(str::trim).unwrap_or(line);
    if line.len() <= MAX_MESSAGE_LEN {
        return line.to_string();
    }
    let mut end = MAX_MESSAGE_LEN;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &line[..end])
}
