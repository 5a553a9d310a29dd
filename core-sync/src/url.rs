//! File identity.

use url::Url;

/// Whether two media URIs name the same file, ignoring the scheme.
///
/// Parsed URIs are compared by host and path, so `http://nas/a.mkv` and
/// `https://nas/a.mkv` match. Two unparsable strings are compared verbatim; a
/// parsable and an unparsable one never match.
pub fn same_file(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a.host_str() == b.host_str() && a.path() == b.path(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_is_ignored() {
        assert!(same_file("http://nas/movies/a.mkv", "https://nas/movies/a.mkv"));
    }

    #[test]
    fn test_different_paths() {
        assert!(!same_file("file:///movies/a.mkv", "file:///movies/b.mkv"));
    }

    #[test]
    fn test_different_hosts() {
        assert!(!same_file("http://nas/a.mkv", "http://tv/a.mkv"));
    }

    #[test]
    fn test_percent_encoding_is_normalized() {
        assert!(same_file(
            "file:///movies/my%20film.mkv",
            "file:///movies/my film.mkv"
        ));
    }

    #[test]
    fn test_unparsable() {
        assert!(same_file("", ""));
        assert!(same_file("movie.mp4", "movie.mp4"));
        assert!(!same_file("movie.mp4", "file:///movie.mp4"));
        assert!(!same_file("", "file:///movie.mp4"));
    }
}
