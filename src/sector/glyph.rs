use std::collections::HashMap;

/// 装飾用グリフ（サーバー絵文字など）の解決。見つからなければ `None` を返し、呼び出し側は省略する。
pub trait GlyphLookup: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}

/// 設定から読み込んだ名前→グリフの固定表。名前は大文字小文字を区別しない。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticGlyphs {
    glyphs: HashMap<String, String>,
}

impl StaticGlyphs {
    #[must_use]
    pub fn new(glyphs: HashMap<String, String>) -> Self {
        Self {
            glyphs: glyphs
                .into_iter()
                .map(|(name, glyph)| (normalize(&name), glyph))
                .collect(),
        }
    }
}

impl GlyphLookup for StaticGlyphs {
    fn resolve(&self, name: &str) -> Option<String> {
        self.glyphs.get(&normalize(name)).cloned()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_case_and_spacing_insensitively() {
        let glyphs = StaticGlyphs::new(HashMap::from([(
            "Unstoppable".to_string(),
            "<:unstoppable:123>".to_string(),
        ), (
            "hot_knife".to_string(),
            "<:hot_knife:456>".to_string(),
        )]));

        assert_eq!(glyphs.resolve("unstoppable").as_deref(), Some("<:unstoppable:123>"));
        assert_eq!(glyphs.resolve("Hot Knife").as_deref(), Some("<:hot_knife:456>"));
        assert!(glyphs.resolve("Barrier").is_none());
    }
}
