//! Remedy monograph data model.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

/// Name of a remedy plant. Uniquely identifies one monograph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemedyKey(String);

impl RemedyKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RemedyKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemedyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One labeled block of a monograph, e.g. "功效" followed by its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub label: String,
    pub lines: Vec<String>,
}

/// Knowledge record for a single remedy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monograph {
    /// Ordered sections, rendered in declaration order.
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Monograph {
    /// Find a section by its label.
    pub fn section(&self, label: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.label == label)
    }

    /// Render the monograph as a chat message.
    pub fn render(&self, key: &RemedyKey) -> String {
        let mut parts = vec![format!("🌿 推薦藥用植物：{key}")];

        for section in &self.sections {
            let mut block = format!("【{}】", section.label);
            for line in &section.lines {
                block.push('\n');
                block.push_str(line);
            }
            parts.push(block);
        }

        if let Some(ref url) = self.image_url {
            parts.push(format!("圖片：{url}"));
        }

        parts.push("※ 以上資訊僅供參考，無法取代專業醫療診斷。若症狀持續或加劇，請儘速就醫。".to_string());
        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Monograph {
        Monograph {
            sections: vec![
                Section {
                    label: "功效".to_string(),
                    lines: vec!["疏散風熱".to_string(), "清利頭目".to_string()],
                },
                Section {
                    label: "注意事項".to_string(),
                    lines: vec!["體虛多汗者慎用".to_string()],
                },
            ],
            image_url: None,
        }
    }

    #[test]
    fn render_keeps_section_order() {
        let text = sample().render(&RemedyKey::new("薄荷"));
        assert!(text.starts_with("🌿 推薦藥用植物：薄荷"));
        let effects = text.find("【功效】").unwrap();
        let cautions = text.find("【注意事項】").unwrap();
        assert!(effects < cautions);
        assert!(text.contains("疏散風熱\n清利頭目"));
        assert!(!text.contains("圖片"));
    }

    #[test]
    fn render_includes_image_when_present() {
        let mut monograph = sample();
        monograph.image_url = Some("https://img.example/mint.jpg".to_string());
        let text = monograph.render(&RemedyKey::new("薄荷"));
        assert!(text.contains("圖片：https://img.example/mint.jpg"));
    }

    #[test]
    fn section_lookup_by_label() {
        let monograph = sample();
        assert_eq!(monograph.section("注意事項").unwrap().lines.len(), 1);
        assert!(monograph.section("成分").is_none());
    }

    #[test]
    fn remedy_key_is_transparent_in_json() {
        let key: RemedyKey = serde_json::from_str("\"蚌蘭\"").unwrap();
        assert_eq!(key.as_str(), "蚌蘭");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"蚌蘭\"");
    }
}
