use regex::Regex;

/// Filename pattern whose capture groups name an issue.
///
/// Matching is anchored at the start of the name only, so `(\d{4})` matches
/// `"1977 extra.pdf"` but not `"extra 1977.pdf"`.
#[derive(Debug, Clone)]
pub struct IssuePattern {
    source: String,
    regex: Regex,
}

impl IssuePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})", pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Join the participating capture groups with `separator`.
    ///
    /// Groups that did not take part in the match are skipped. A pattern
    /// without capture groups labels the issue with the whole match.
    pub fn issue_label(&self, filename: &str, separator: &str) -> Option<String> {
        let caps = self.regex.captures(filename)?;
        if caps.len() == 1 {
            return caps.get(0).map(|m| m.as_str().to_string());
        }
        let parts: Vec<&str> = caps
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str())
            .collect();
        Some(parts.join(separator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_joined_with_separator() {
        let p = IssuePattern::new(r"Byte_(\d{4})_(\d{2})").unwrap();
        assert_eq!(
            p.issue_label("Byte_1977_01_scan.pdf", "-").as_deref(),
            Some("1977-01")
        );
        assert_eq!(
            p.issue_label("Byte_1977_01_scan.pdf", " ").as_deref(),
            Some("1977 01")
        );
    }

    #[test]
    fn test_match_is_anchored_at_start() {
        let p = IssuePattern::new(r"(\d{4})").unwrap();
        assert_eq!(p.issue_label("1977 extra.pdf", "-").as_deref(), Some("1977"));
        assert_eq!(p.issue_label("extra 1977.pdf", "-"), None);
    }

    #[test]
    fn test_alternation_stays_anchored() {
        let p = IssuePattern::new(r"a(\d)|b(\d)").unwrap();
        assert_eq!(p.issue_label("b2.pdf", "-").as_deref(), Some("2"));
        assert_eq!(p.issue_label("xb2.pdf", "-"), None);
    }

    #[test]
    fn test_optional_group_skipped_when_absent() {
        let p = IssuePattern::new(r"(\d+)(?:_(v\d))?").unwrap();
        assert_eq!(p.issue_label("12_v2.pdf", "-").as_deref(), Some("12-v2"));
        assert_eq!(p.issue_label("12.pdf", "-").as_deref(), Some("12"));
    }

    #[test]
    fn test_no_groups_uses_whole_match() {
        let p = IssuePattern::new(r"\d+").unwrap();
        assert_eq!(p.issue_label("042.pdf", "-").as_deref(), Some("042"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(IssuePattern::new(r"(unclosed").is_err());
    }
}
