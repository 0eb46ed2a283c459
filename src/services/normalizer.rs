//! 线索归一化服务 - 业务能力层
//!
//! 只负责"原始记录 → LeadRecord"，纯函数，不做任何 I/O

use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::sync::OnceLock;

use crate::models::job::RejectedRecord;
use crate::models::lead::{LeadRecord, Rejection};

/// 名称字段候选（比较前已转小写并去掉非字母数字）
const NAME_KEYS: &[&str] = &["businessname", "name", "companyname", "title"];
const EMAIL_KEYS: &[&str] = &["email", "email1", "emails", "emailaddress"];
const SOURCE_ID_KEYS: &[&str] = &["placeid", "googleid", "sourceid", "id", "cid"];

/// 一批记录的归一化结果
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub leads: Vec<LeadRecord>,
    /// (批内序号, 原因)
    pub rejections: Vec<(usize, Rejection)>,
}

impl NormalizedBatch {
    /// 转换为带页码的拒绝记录
    pub fn rejected_on_page(&self, page: usize) -> Vec<RejectedRecord> {
        self.rejections
            .iter()
            .map(|&(index, reason)| RejectedRecord {
                page,
                index,
                reason,
            })
            .collect()
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("valid email regex")
    })
}

/// 简化版 RFC-5322 校验：local@domain，且 domain 中包含点
pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email.trim())
}

/// 归一化单条原始记录
pub fn normalize(raw: &Map<String, JsonValue>) -> Result<LeadRecord, Rejection> {
    let name = lookup(raw, NAME_KEYS).ok_or(Rejection::MissingName)?;
    let email = lookup(raw, EMAIL_KEYS).ok_or(Rejection::MissingEmail)?;

    if !is_valid_email(&email) {
        return Err(Rejection::InvalidEmailFormat);
    }

    let mut lead = LeadRecord::new(name, email);
    lead.source_id = lookup(raw, SOURCE_ID_KEYS);
    Ok(lead)
}

/// 归一化一批记录，坏记录只记入 rejections，不影响其他记录
pub fn normalize_batch(records: &[JsonValue]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (index, record) in records.iter().enumerate() {
        let result = match record.as_object() {
            Some(map) => normalize(map),
            None => Err(Rejection::MissingName),
        };

        match result {
            Ok(lead) => batch.leads.push(lead),
            Err(reason) => batch.rejections.push((index, reason)),
        }
    }

    batch
}

/// 字段名归一化："Business Name" / "business_name" → "businessname"
fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// 按候选顺序查找第一个非空的值
fn lookup(raw: &Map<String, JsonValue>, candidates: &[&str]) -> Option<String> {
    for candidate in candidates {
        let found = raw
            .iter()
            .filter(|(key, _)| canonical_key(key) == *candidate)
            .find_map(|(_, value)| scalar_text(value));
        if found.is_some() {
            return found;
        }
    }
    None
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Array(items) => items.iter().find_map(scalar_text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_accepts_display_style_keys() {
        let lead = normalize(&as_map(json!({
            "Business Name": "  Joe's Pizza ",
            "Email": "joe@pizza.com",
            "place_id": "ChIJ123"
        })))
        .unwrap();

        assert_eq!(lead.business_name, "Joe's Pizza");
        assert_eq!(lead.email, "joe@pizza.com");
        assert_eq!(lead.source_id.as_deref(), Some("ChIJ123"));
    }

    #[test]
    fn test_normalize_accepts_provider_keys() {
        let lead = normalize(&as_map(json!({
            "name": "Dental Co",
            "email_1": "info@dental.co",
            "phone": "+39 000",
            "rating": 4.5
        })))
        .unwrap();

        assert_eq!(lead.business_name, "Dental Co");
        assert_eq!(lead.email, "info@dental.co");
        assert_eq!(lead.source_id, None);
    }

    #[test]
    fn test_normalize_rejection_reasons() {
        assert_eq!(
            normalize(&as_map(json!({"Email": "a@x.com"}))),
            Err(Rejection::MissingName)
        );
        assert_eq!(
            normalize(&as_map(json!({"name": "A", "email": "   "}))),
            Err(Rejection::MissingEmail)
        );
        assert_eq!(
            normalize(&as_map(json!({"name": "A", "email": null}))),
            Err(Rejection::MissingEmail)
        );
        assert_eq!(
            normalize(&as_map(json!({"name": "A", "email": "bad-email"}))),
            Err(Rejection::InvalidEmailFormat)
        );
    }

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email(" first.last+tag@mail.example.org "));
        assert!(!is_valid_email("a@localhost"));
        assert!(!is_valid_email("a@x."));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("a@@x.com"));
    }

    #[test]
    fn test_batch_keeps_going_after_bad_records() {
        let records = vec![
            json!({"Business Name": "A", "Email": "a@x.com"}),
            json!("not an object"),
            json!({"Business Name": "C", "Email": "bad-email"}),
            json!({"Business Name": "D", "Email": ["", "d@x.com"]}),
        ];

        let batch = normalize_batch(&records);
        assert_eq!(batch.leads.len(), 2);
        assert_eq!(batch.leads[1].email, "d@x.com");
        assert_eq!(
            batch.rejections,
            vec![(1, Rejection::MissingName), (2, Rejection::InvalidEmailFormat)]
        );
        assert_eq!(batch.rejected_on_page(3)[0].page, 3);
    }
}
