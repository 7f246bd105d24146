//! Validation of archive-supplied paths.
//!
//! Archive paths are untrusted input. Anything that could climb out of the
//! store root is rejected here; the caller skips such entries.

/// Normalize an archive path, or return `None` if it must not be installed.
///
/// Leading separators and empty segments are dropped, so `//a///b/` becomes
/// `a/b`. Any `..` segment rejects the whole path, as does a path with no
/// segments left. Single `.` segments are kept as literal segments: archives
/// built with `tar -C dir .` name every member `./...`.
pub fn sanitize_path(raw: &str) -> Option<String> {
    let segments: Vec<&str> = raw
        .trim_start_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.is_empty() || segments.iter().any(|segment| *segment == "..") {
        return None;
    }

    Some(segments.join("/"))
}
