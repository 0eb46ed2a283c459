/// Outscraper API 客户端
///
/// 封装 Google Maps 商家搜索接口，按 `skip` 偏移量分页
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::clients::{LeadProvider, PageRequest, ProviderPage};
use crate::config::Config;
use crate::error::ProviderError;

const SEARCH_ENDPOINT: &str = "maps/search-v3";
const LOCATIONS_ENDPOINT: &str = "locations";

/// Outscraper API 客户端
pub struct OutscraperClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OutscraperClient {
    /// 创建新的数据源客户端
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.provider_base_url.trim_end_matches('/').to_string(),
            api_key: config.provider_api_key.clone(),
        }
    }

    /// 获取某个国家可用的地区列表
    ///
    /// # 参数
    /// - `country`: 国家代码，如 "IT"
    ///
    /// # 返回
    /// 返回 `"COUNTRY>REGION"` 格式的地区列表
    pub async fn locations(&self, country: &str) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/{}", self.base_url, LOCATIONS_ENDPOINT);
        let body = self
            .get_json(&url, LOCATIONS_ENDPOINT, &[("country", country.to_string())])
            .await?;
        Ok(extract_locations(&body, country))
    }

    async fn get_json(
        &self,
        url: &str,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<JsonValue, ProviderError> {
        let resp = self
            .http
            .get(url)
            .header("X-API-KEY", &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| map_request_error(endpoint, e))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(endpoint, status, retry_after, body));
        }

        resp.json::<JsonValue>()
            .await
            .map_err(|e| ProviderError::transient(endpoint, format!("响应解析失败: {}", e)))
    }
}

#[async_trait]
impl LeadProvider for OutscraperClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<ProviderPage, ProviderError> {
        let skip: usize = request
            .page_token
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let query = format!("{}, {}", request.business_type, request.location);

        debug!("Outscraper 搜索: '{}' skip={} limit={}", query, skip, request.max_per_page);

        let url = format!("{}/{}", self.base_url, SEARCH_ENDPOINT);
        let body = self
            .get_json(
                &url,
                SEARCH_ENDPOINT,
                &[
                    ("query", query),
                    ("limit", request.max_per_page.to_string()),
                    ("skip", skip.to_string()),
                    ("async", "false".to_string()),
                ],
            )
            .await?;

        let records = extract_records(&body);
        let next_page_token = next_token(skip, request.max_per_page, records.len());

        Ok(ProviderPage {
            records,
            next_page_token,
        })
    }
}

/// 把 HTTP 错误状态映射为数据源错误
fn classify_status(endpoint: &str, status: StatusCode, retry_after: Option<u64>, body: String) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited { retry_after }
    } else if status.is_server_error() {
        ProviderError::transient(endpoint, format!("HTTP {}: {}", status.as_u16(), body))
    } else {
        ProviderError::BadResponse {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message: body,
        }
    }
}

fn map_request_error(endpoint: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout { after_ms: 0 }
    } else {
        ProviderError::transient(endpoint, err)
    }
}

/// 提取记录：`data` 可能是 `[[{...}]]`（按查询分组）或 `[{...}]`
fn extract_records(body: &JsonValue) -> Vec<JsonValue> {
    let Some(data) = body.get("data").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for item in data {
        match item {
            JsonValue::Array(group) => records.extend(group.iter().filter(|r| r.is_object()).cloned()),
            JsonValue::Object(_) => records.push(item.clone()),
            _ => {}
        }
    }
    records
}

/// 满页说明可能还有下一页
fn next_token(skip: usize, limit: usize, returned: usize) -> Option<String> {
    (limit > 0 && returned >= limit).then(|| (skip + returned).to_string())
}

fn extract_locations(body: &JsonValue, country: &str) -> Vec<String> {
    body.get("items")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("v").and_then(|v| v.as_str()))
                .filter(|region| !region.is_empty())
                .map(|region| format!("{}>{}", country, region))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_records_flattens_query_groups() {
        let body = json!({
            "status": "Success",
            "data": [[{"name": "A"}, {"name": "B"}], [{"name": "C"}, "junk"]]
        });
        assert_eq!(extract_records(&body).len(), 3);

        let flat = json!({"data": [{"name": "A"}]});
        assert_eq!(extract_records(&flat).len(), 1);

        assert!(extract_records(&json!({"error": "x"})).is_empty());
    }

    #[test]
    fn test_next_token_only_for_full_pages() {
        assert_eq!(next_token(0, 20, 20), Some("20".to_string()));
        assert_eq!(next_token(40, 20, 20), Some("60".to_string()));
        assert_eq!(next_token(40, 20, 7), None);
        assert_eq!(next_token(0, 0, 0), None);
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status("x", StatusCode::TOO_MANY_REQUESTS, Some(7), String::new()),
            ProviderError::RateLimited { retry_after: Some(7) }
        ));
        assert!(matches!(
            classify_status("x", StatusCode::BAD_GATEWAY, None, String::new()),
            ProviderError::Transient { .. }
        ));
        assert!(matches!(
            classify_status("x", StatusCode::UNAUTHORIZED, None, "bad key".into()),
            ProviderError::BadResponse { status: 401, .. }
        ));
    }

    #[test]
    fn test_extract_locations() {
        let body = json!({"items": [{"v": "Lombardia"}, {"v": ""}, {"x": 1}, {"v": "Lazio"}]});
        assert_eq!(
            extract_locations(&body, "IT"),
            vec!["IT>Lombardia".to_string(), "IT>Lazio".to_string()]
        );
    }
}
