use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::namer::types::ParsedName;

/// Two digit token at the start of the stem or after an underscore,
/// with no other digit following it before the end of the stem.
static RE_TRAILING_INDEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|_)([0-9]{2})[^0-9]*$").expect("Failed to create regex pattern for trailing index")
});

/// Parse the trailing two digit index, the base and the extension from a B-side file name.
///
/// Returns `None` when the stem has no trailing `_NN` token.
///
/// ```rust
/// use image_namer::namer::parse_index_and_base;
///
/// let parsed = parse_index_and_base("lumi_13.jpg").unwrap();
/// assert_eq!(parsed.index, "13");
/// assert_eq!(parsed.base, "lumi");
/// assert_eq!(parsed.extension, ".jpg");
///
/// assert!(parse_index_and_base("noindex.jpg").is_none());
/// ```
#[must_use]
pub fn parse_index_and_base(file_name: &str) -> Option<ParsedName> {
    let (stem, extension) = crate::get_normalized_file_name_and_extension(Path::new(file_name)).ok()?;
    let captures = RE_TRAILING_INDEX.captures(&stem)?;
    let index = captures.get(1)?;
    let base = stem[..index.start()].trim_end_matches('_').to_string();
    let extension = if extension.is_empty() {
        String::new()
    } else {
        format!(".{extension}")
    };

    Some(ParsedName {
        index: index.as_str().to_string(),
        base,
        extension,
    })
}

#[cfg(test)]
mod parse_tests {
    use super::*;

    fn parse(name: &str) -> (String, String, String) {
        let parsed = parse_index_and_base(name).expect("should parse");
        (parsed.index, parsed.base, parsed.extension)
    }

    #[test]
    fn parses_simple_name() {
        assert_eq!(
            parse("lumi_13.jpg"),
            ("13".to_string(), "lumi".to_string(), ".jpg".to_string())
        );
    }

    #[test]
    fn rejects_name_without_index() {
        assert!(parse_index_and_base("noindex.jpg").is_none());
        assert!(parse_index_and_base("photo13.jpg").is_none());
    }

    #[test]
    fn rejects_three_digit_tail() {
        assert!(parse_index_and_base("lumi_123.jpg").is_none());
    }

    #[test]
    fn index_at_start_of_stem_has_empty_base() {
        assert_eq!(parse("13.jpg"), ("13".to_string(), String::new(), ".jpg".to_string()));
    }

    #[test]
    fn uses_last_numeric_token() {
        assert_eq!(parse("a_12_34.png"), ("34".to_string(), "a_12".to_string(), ".png".to_string()));
    }

    #[test]
    fn allows_trailing_text_after_index() {
        assert_eq!(
            parse("lumi_13_final.jpg"),
            ("13".to_string(), "lumi".to_string(), ".jpg".to_string())
        );
    }

    #[test]
    fn strips_repeated_separators_from_base() {
        assert_eq!(parse("lumi__07.jpg"), ("07".to_string(), "lumi".to_string(), ".jpg".to_string()));
    }

    #[test]
    fn keeps_only_last_extension() {
        assert_eq!(
            parse("lumi.v2_08.tif"),
            ("08".to_string(), "lumi.v2".to_string(), ".tif".to_string())
        );
    }

    #[test]
    fn name_without_extension() {
        assert_eq!(parse("lumi_03"), ("03".to_string(), "lumi".to_string(), String::new()));
    }
}
