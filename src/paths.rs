use std::path::{Path, PathBuf};

/// Clean a filename by removing characters that are invalid on common
/// filesystems: `/`, `\`, `:`, `*`, `?`, `"`, `<`, `>`, `|`.
///
/// Also keeps catalog names such as `../x.pdf` from escaping the target
/// directory, since every separator is dropped.
pub fn clean_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect()
}

/// Case-insensitive suffix test (`"c.PDF"` matches `".pdf"`).
pub fn has_suffix_ignore_case(name: &str, suffix: &str) -> bool {
    let (n, s) = (name.as_bytes(), suffix.as_bytes());
    n.len() >= s.len() && n[n.len() - s.len()..].eq_ignore_ascii_case(s)
}

/// Local path a catalog file is staged at while it awaits the transform.
pub fn staging_path(staging_dir: &Path, filename: &str) -> PathBuf {
    staging_dir.join(clean_filename(filename))
}

/// Sibling `.part` path a download streams into before being renamed.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Output name for a tagged document: `"{series} {issue}{suffix}"`.
pub fn tagged_filename(series: &str, issue: &str, suffix: &str) -> String {
    clean_filename(&format!("{} {}{}", series, issue, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_filename_strips_reserved() {
        assert_eq!(clean_filename("a/b\\c:d*e?f\"g<h>i|j.pdf"), "abcdefghij.pdf");
        assert_eq!(clean_filename("plain name.pdf"), "plain name.pdf");
    }

    #[test]
    fn test_clean_filename_blocks_traversal() {
        assert_eq!(clean_filename("../../etc/passwd"), "....etcpasswd");
    }

    #[test]
    fn test_has_suffix_ignore_case() {
        assert!(has_suffix_ignore_case("a.pdf", ".pdf"));
        assert!(has_suffix_ignore_case("c.PDF", ".pdf"));
        assert!(!has_suffix_ignore_case("b.txt", ".pdf"));
        assert!(!has_suffix_ignore_case("pdf", ".pdf"));
        assert!(has_suffix_ignore_case("Ünïcode.Pdf", ".pdf"));
    }

    #[test]
    fn test_staging_path_is_flat() {
        let p = staging_path(Path::new("/stage"), "sub/dir/issue 1.pdf");
        assert_eq!(p, PathBuf::from("/stage/subdirissue 1.pdf"));
    }

    #[test]
    fn test_part_path_appends_extension() {
        assert_eq!(
            part_path(Path::new("/stage/issue.pdf")),
            PathBuf::from("/stage/issue.pdf.part")
        );
    }

    #[test]
    fn test_tagged_filename() {
        assert_eq!(
            tagged_filename("Byte Magazine", "1977-01", ".pdf"),
            "Byte Magazine 1977-01.pdf"
        );
        assert_eq!(
            tagged_filename("AC/DC: Live", "02", ".pdf"),
            "ACDC Live 02.pdf"
        );
    }
}
