//! User-facing text for the triage conversation.
//!
//! Users answer with single letters and exact symptom names, so the menu
//! wording and letters here are part of the bot's observable contract.

use crate::taxonomy::{BYPASS_TOKEN, NONE_TOKEN, Taxonomy};

use super::state::RESTART_TOKEN;

/// Shown whenever a generation fails, times out, or comes back empty.
pub const APOLOGY: &str = "抱歉，目前無法回答您的問題，請稍後再試，或諮詢專業醫生。";

/// Reply to inbound messages that are not text.
pub const NON_TEXT_REPLY: &str = "請輸入文字問題。";

/// Label of the category-stage bypass option.
pub const BYPASS_LABEL: &str = "以上沒有符合我的症狀種類";

/// Greeting plus the category menu.
pub fn category_menu(taxonomy: &Taxonomy) -> String {
    let categories = taxonomy.categories();
    let range = match (categories.first(), categories.last()) {
        (Some(first), Some(last)) if first.code != last.code => {
            format!("({}~{})", first.code, last.code)
        }
        (Some(only), _) => format!("({})", only.code),
        _ => String::new(),
    };

    let mut lines = vec![
        "您好！".to_string(),
        "我將推薦符合您症狀的藥用植物🌿".to_string(),
        format!("請選擇以下最符合您症狀的種類{range}:"),
    ];
    lines.extend(
        categories
            .iter()
            .map(|c| format!("{}: {}", c.code, c.name)),
    );
    lines.push(format!("{BYPASS_TOKEN}: {BYPASS_LABEL}"));
    lines.join("\n")
}

/// Symptom list for a category. Returns `None` for an unknown category.
pub fn symptom_menu(taxonomy: &Taxonomy, code: &str) -> Option<String> {
    let category = taxonomy.category(code)?;
    let symptoms = taxonomy.symptoms_of(code)?;

    let mut lines = vec![
        format!("您選擇了「{}」", category.name),
        "請輸入以下最符合您的症狀名稱:".to_string(),
    ];
    lines.extend(symptoms.iter().map(|s| {
        if *s == NONE_TOKEN {
            format!("{NONE_TOKEN}（以上皆不符合）")
        } else {
            (*s).to_string()
        }
    }));
    Some(lines.join("\n"))
}

/// Lettered variant list for a symptom. Returns `None` for direct symptoms.
pub fn variant_menu(taxonomy: &Taxonomy, symptom: &str) -> Option<String> {
    let variants = taxonomy.variants_of(symptom);
    let (first, last) = (variants.first()?, variants.last()?);

    let mut lines = vec![format!(
        "請選擇最符合您「{symptom}」狀況的描述({}~{}):",
        first.0, last.0
    )];
    lines.extend(variants.iter().map(|(code, desc)| format!("{code}: {desc}")));
    lines.push(format!("{NONE_TOKEN}: 以上皆不符合"));
    Some(lines.join("\n"))
}

/// Asked after a bare bypass.
pub fn ask_question() -> String {
    format!("請直接描述您的症狀或問題，我將為您提供建議。\n（輸入「{RESTART_TOKEN}」可回到選單）")
}

/// Closing message when no option fits.
pub fn no_match() -> String {
    format!(
        "很抱歉，目前沒有符合您症狀的藥用植物建議。\n若症狀持續或加劇，請儘速諮詢專業醫生。\n（輸入任意文字可重新開始，或輸入「{BYPASS_TOKEN}」直接描述您的問題）"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeBase;

    fn taxonomy() -> Taxonomy {
        Taxonomy::builtin(&KnowledgeBase::builtin().unwrap()).unwrap()
    }

    #[test]
    fn category_menu_matches_published_wording() {
        let menu = category_menu(&taxonomy());
        assert_eq!(
            menu,
            "您好！\n\
             我將推薦符合您症狀的藥用植物🌿\n\
             請選擇以下最符合您症狀的種類(A~E):\n\
             A: 呼吸系統與感冒問題\n\
             B: 消化與代謝問題\n\
             C: 皮膚與過敏問題\n\
             D: 循環與泌尿系統問題\n\
             E: 身心與內分泌問題\n\
             X: 以上沒有符合我的症狀種類"
        );
    }

    #[test]
    fn symptom_menu_lists_names_then_none() {
        let menu = symptom_menu(&taxonomy(), "A").unwrap();
        let lines: Vec<&str> = menu.lines().collect();
        assert_eq!(lines[0], "您選擇了「呼吸系統與感冒問題」");
        assert_eq!(&lines[2..5], ["感冒", "咳嗽", "喉嚨痛"]);
        assert!(lines[5].starts_with(NONE_TOKEN));
        assert!(symptom_menu(&taxonomy(), "Q").is_none());
    }

    #[test]
    fn variant_menu_is_lettered() {
        let menu = variant_menu(&taxonomy(), "感冒").unwrap();
        assert!(menu.starts_with("請選擇最符合您「感冒」狀況的描述(A~E):"));
        assert!(menu.contains("\nB: 發燒、喉嚨腫痛、口渴（風熱感冒）"));
        assert!(menu.ends_with("無: 以上皆不符合"));
        assert!(variant_menu(&taxonomy(), "便秘").is_none());
    }
}
