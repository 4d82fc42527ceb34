//! Built-in Chinese text for the sections that have named placeholders.

/// Placeholder key holding the paper title.
pub(crate) const TITLE_KEY: &str = "论文题目";
const MISSING_TITLE: &str = "（论文题目缺失）";

/// A named placeholder slot for one unit, with the text used when the
/// dictionary lacks the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Slot {
    pub key: &'static str,
    /// Prepended to the body whether it comes from the dictionary or the default.
    pub prefix: &'static str,
    pub default: String,
}

impl Slot {
    fn new(key: &'static str, default: impl Into<String>) -> Self {
        Self {
            key,
            prefix: "",
            default: default.into(),
        }
    }
}

/// The named slot for `unit_id` within `section`, if the section has any.
///
/// `title` fills the default opening sentence of the abstract.
pub(crate) fn slot_for(section: &str, unit_id: &str, title: Option<&str>) -> Option<Slot> {
    let index = unit_index(unit_id);
    let title = title.unwrap_or(MISSING_TITLE);

    match section {
        "摘要" => Some(match index {
            Some(1) => Slot::new("摘要第一段", format!("本文围绕{title}，建立数学模型并求解...")),
            Some(2) => Slot::new("摘要第二段", "针对问题一，我们建立了相关模型..."),
            Some(3) => Slot::new("摘要第三段", "针对问题二，我们构建了优化模型..."),
            Some(4) => Slot::new("摘要第四段", "此外，我们还进行了灵敏度分析与模型检验..."),
            _ => Slot {
                key: "关键词",
                prefix: "关键词：",
                default: "关键词1；关键词2".into(),
            },
        }),
        "问题重述" => Some(match index {
            Some(1) => Slot::new("问题重述第一段", "题目背景介绍..."),
            Some(2) => Slot::new("问题重述第二段", "具体问题描述..."),
            _ => Slot::new("问题重述第三段", ""),
        }),
        "模型假设" => Some(match index {
            Some(1) => Slot::new(
                "模型假设第一段",
                "假设1：系统处于理想状态...\n假设2：忽略次要因素影响...",
            ),
            _ => Slot::new("模型假设第二段", ""),
        }),
        _ => None,
    }
}

/// Body for units with neither a dictionary entry nor a named slot.
pub(crate) fn fallback_body(section: &str, unit_id: &str) -> String {
    format!("（{section} - {unit_id} 内容生成中...）")
}

/// The number after the last `-` of a unit id, e.g. `3` for `MODEL1-3`.
fn unit_index(unit_id: &str) -> Option<u32> {
    unit_id.rsplit_once('-')?.1.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abstract_slots() {
        let first = slot_for("摘要", "ABS-1", Some("城市交通优化")).unwrap();
        assert_eq!(first.key, "摘要第一段");
        assert!(first.default.contains("城市交通优化"));

        let untitled = slot_for("摘要", "ABS-1", None).unwrap();
        assert!(untitled.default.contains("（论文题目缺失）"));

        let keywords = slot_for("摘要", "ABS-5", None).unwrap();
        assert_eq!(keywords.key, "关键词");
        assert_eq!(keywords.prefix, "关键词：");
    }

    #[test]
    fn later_units_share_the_last_slot() {
        assert_eq!(slot_for("问题重述", "INTRO-3", None).unwrap().key, "问题重述第三段");
        assert_eq!(slot_for("问题重述", "INTRO-7", None).unwrap().key, "问题重述第三段");
        assert_eq!(slot_for("模型假设", "ASSUMP-2", None).unwrap().key, "模型假设第二段");
    }

    #[test]
    fn other_sections_have_no_slots() {
        assert!(slot_for("问题一", "MODEL1-1", None).is_none());
        assert_eq!(fallback_body("结论", "CONCL-2"), "（结论 - CONCL-2 内容生成中...）");
    }

    #[test]
    fn unit_index_parses_suffix() {
        assert_eq!(unit_index("MODEL2-8"), Some(8));
        assert_eq!(unit_index("ABS"), None);
    }
}
