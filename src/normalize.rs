//! 텍스트 정규화
//!
//! 임베딩 전에 악센트(결합 분음 부호)를 제거하고 소문자로 변환합니다.
//! 수집과 검색 양쪽에서 동일하게 적용되어야 "ERP"와 "érp"가 서로 검색됩니다.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// 텍스트 정규화 (NFD 분해 → 결합 문자 제거 → 소문자)
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accent_insensitive() {
        assert_eq!(normalize("ERP"), normalize("érp"));
        assert_eq!(normalize("Σύστημα"), normalize("συστημα"));
        assert_eq!(normalize("Ελληνικά"), "ελληνικα");
    }

    #[test]
    fn test_lowercase_and_punctuation_kept() {
        assert_eq!(normalize("ERP;"), "erp;");
        assert_eq!(normalize("Το ERP σύστημα"), "το erp συστημα");
    }

    #[test]
    fn test_precomposed_and_decomposed_equal() {
        // "é" 단일 코드포인트 vs "e" + U+0301
        assert_eq!(normalize("caf\u{e9}"), normalize("cafe\u{301}"));
        assert_eq!(normalize("cafe\u{301}"), "cafe");
    }

    #[test]
    fn test_empty() {
        assert_eq!(normalize(""), "");
    }
}
