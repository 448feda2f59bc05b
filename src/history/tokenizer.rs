//! 分词与相似度
//!
//! 中英文混合：包含 CJK 字符时用 jieba 分词，否则按空白切分并去掉首尾标点。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

/// 全局 Jieba 实例（延迟初始化）
static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

/// 判断字符是否为 CJK（中日韩）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |   // CJK Unified Ideographs
        '\u{3400}'..='\u{4DBF}' |   // Extension A
        '\u{F900}'..='\u{FAFF}' |   // Compatibility Ideographs
        '\u{3040}'..='\u{309F}' |   // Hiragana
        '\u{30A0}'..='\u{30FF}'     // Katakana
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

fn normalize(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric() && !is_cjk(c))
        .to_lowercase()
}

/// 分词：小写化，丢弃单字符的非 CJK 词与纯标点
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let keep = |s: &String| {
        s.chars().count() > 1 || s.chars().next().is_some_and(is_cjk)
    };

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(normalize)
            .filter(keep)
            .collect()
    } else {
        text.split_whitespace().map(normalize).filter(keep).collect()
    }
}

pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Jaccard 相似度：|A∩B| / |A∪B|，任一为空时为 0
pub fn jaccard_similarity(set1: &HashSet<String>, set2: &HashSet<String>) -> f32 {
    if set1.is_empty() || set2.is_empty() {
        return 0.0;
    }
    let intersection = set1.intersection(set2).count() as f32;
    let union = set1.union(set2).count() as f32;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_english_strips_punctuation() {
        let tokens = tokenize("Go to Reddit.com, please!");
        assert_eq!(tokens, vec!["go", "to", "reddit.com", "please"]);
    }

    #[test]
    fn test_tokenize_chinese() {
        let tokens = tokenize("打开浏览器搜索显卡");
        assert!(!tokens.is_empty());
        assert!(tokens.iter().any(|t| t.contains("浏览") || t.contains("显卡")));
    }

    #[test]
    fn test_contains_cjk() {
        assert!(contains_cjk("你好"));
        assert!(!contains_cjk("hello"));
    }

    #[test]
    fn test_jaccard() {
        let a = tokenize_to_set("open reddit.com please");
        let b = tokenize_to_set("please open reddit.com");
        assert_eq!(jaccard_similarity(&a, &b), 1.0);

        let c = tokenize_to_set("add buy milk");
        assert_eq!(jaccard_similarity(&a, &c), 0.0);
        assert_eq!(jaccard_similarity(&a, &HashSet::new()), 0.0);
    }
}
