use crate::models::template::EmailTemplate;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载邮件模板
///
/// 文件格式：
/// ```toml
/// subject = "Hello {name}"
/// content = "..."
/// ```
pub async fn load_template(toml_file_path: &Path) -> Result<EmailTemplate> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取模板文件: {}", toml_file_path.display()))?;

    let template: EmailTemplate = toml::from_str(&content)
        .with_context(|| format!("无法解析模板文件: {}", toml_file_path.display()))?;

    if template.subject.trim().is_empty() {
        anyhow::bail!("模板主题为空: {}", toml_file_path.display());
    }

    tracing::info!(
        "已加载模板: {}",
        toml_file_path.file_name().unwrap_or_default().to_string_lossy()
    );

    Ok(template)
}
