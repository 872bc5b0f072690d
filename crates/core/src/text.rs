//! Vietnamese text helpers: diacritic folding and URL slugs.
//!
//! Province names typed at checkout ("Hà Nội", "ha noi", "TP. Hồ Chí Minh")
//! and titles turned into slugs both need Vietnamese letters reduced to
//! plain ASCII.

/// Base letter for each group of accented Vietnamese vowels (lowercase).
const FOLDS: &[(char, &str)] = &[
    ('a', "àáảãạăằắẳẵặâầấẩẫậ"),
    ('e', "èéẻẽẹêềếểễệ"),
    ('i', "ìíỉĩị"),
    ('o', "òóỏõọôồốổỗộơờớởỡợ"),
    ('u', "ùúủũụưừứửữự"),
    ('y', "ỳýỷỹỵ"),
    ('d', "đ"),
];

/// Maximum slug length in characters.
pub const MAX_SLUG_LENGTH: usize = 120;

fn fold_char(c: char) -> char {
    FOLDS
        .iter()
        .find(|(_, accented)| accented.contains(c))
        .map_or(c, |(base, _)| *base)
}

/// Combining marks left behind by decomposed (NFD) input.
const fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}')
}

/// Lowercase `s` and replace Vietnamese letters with their ASCII base.
///
/// ```
/// use nutmart_core::text::fold_diacritics;
///
/// assert_eq!(fold_diacritics("Hạt Điều Rang Muối"), "hat dieu rang muoi");
/// ```
#[must_use]
pub fn fold_diacritics(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| !is_combining_mark(*c))
        .map(fold_char)
        .collect()
}

/// Build a URL slug from a title.
///
/// ```
/// use nutmart_core::text::slugify;
///
/// assert_eq!(slugify("Hạt Macca Úc – loại 1!"), "hat-macca-uc-loai-1");
/// ```
#[must_use]
pub fn slugify(title: &str) -> String {
    let folded = fold_diacritics(title);
    let mut slug = String::with_capacity(folded.len());
    let mut pending_dash = false;

    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_LENGTH {
        slug.truncate(MAX_SLUG_LENGTH);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Whether `s` is already a well-formed slug.
#[must_use]
pub fn is_valid_slug(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_SLUG_LENGTH
        && !s.starts_with('-')
        && !s.ends_with('-')
        && !s.contains("--")
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_diacritics_all_vowel_groups() {
        assert_eq!(fold_diacritics("ẮẰẲẴẶ"), "aaaaa");
        assert_eq!(fold_diacritics("Ơ Ư Ê Ô Â Ă Đ"), "o u e o a a d");
        assert_eq!(fold_diacritics("Thừa Thiên Huế"), "thua thien hue");
        assert_eq!(fold_diacritics("Kỳ Anh"), "ky anh");
    }

    #[test]
    fn test_fold_diacritics_decomposed_input() {
        // "Hà" written as 'a' followed by a combining grave accent
        assert_eq!(fold_diacritics("Ha\u{0300}"), "ha");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("  Hạt điều --- Bình Phước  "), "hat-dieu-binh-phuoc");
        assert_eq!(slugify("100% tự nhiên"), "100-tu-nhien");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_truncates() {
        let slug = slugify(&"hạt ".repeat(100));
        assert!(slug.len() <= MAX_SLUG_LENGTH);
        assert!(is_valid_slug(&slug));
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("hat-dieu-2024"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("-hat"));
        assert!(!is_valid_slug("hat-"));
        assert!(!is_valid_slug("hat--dieu"));
        assert!(!is_valid_slug("Hat-Dieu"));
        assert!(!is_valid_slug("hạt"));
    }
}
