use serde::{Deserialize, Serialize};

/// 邮件模板
///
/// 模板内容对系统是不透明的，只替换 `{name}` 占位符。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub content: String,
}

/// 渲染后的邮件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

impl EmailTemplate {
    pub fn new(subject: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            content: content.into(),
        }
    }

    pub fn render(&self, business_name: &str) -> RenderedEmail {
        RenderedEmail {
            subject: self.subject.replace("{name}", business_name),
            body: self.content.replace("{name}", business_name),
        }
    }
}
