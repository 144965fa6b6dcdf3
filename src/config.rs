use std::env;

use anyhow::{Context, Result};
use reqwest::{header::ACCEPT, RequestBuilder};

/// 全てのリクエストに付与する認証情報。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub api_token: Option<String>,
    pub csrf_token: Option<String>,
}

impl RequestContext {
    /// リクエストに認証情報とヘッダーを付与する。
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        let mut builder = builder.header(ACCEPT, "application/json");
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(csrf) = &self.csrf_token {
            builder = builder.header("X-CSRF-TOKEN", csrf);
        }
        builder
    }
}

/// APIとの通信に必要な設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub context: RequestContext,
}

impl Config {
    /// 環境変数から設定を読み込む。
    ///
    /// - `TIMESHEET_API_URL` - APIのベースURL (必須)
    /// - `TIMESHEET_API_TOKEN` - Bearerトークン
    /// - `TIMESHEET_CSRF_TOKEN` - CSRFトークン
    pub fn from_env() -> Result<Self> {
        let api_url = env::var("TIMESHEET_API_URL").context("TIMESHEET_API_URL must be set")?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            context: RequestContext {
                api_token: optional_var("TIMESHEET_API_TOKEN"),
                csrf_token: optional_var("TIMESHEET_CSRF_TOKEN"),
            },
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
