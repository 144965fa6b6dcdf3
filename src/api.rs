use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use reqwest::{multipart, Client, Response};
use serde::{Deserialize, Serialize};

use crate::attendance::ValidatedAttendance;
use crate::biometric::{NdjsonDecoder, ProgressEvent};
use crate::config::{Config, RequestContext};

/// 既存のattendanceを更新する時の送信内容。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveAttendanceRequest {
    pub id: u64,
    #[serde(flatten)]
    pub attendance: ValidatedAttendance,
}

/// 手入力で新しいattendanceを登録する時の送信内容。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateAttendanceRequest {
    pub employee_no: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub attendance: ValidatedAttendance,
}

/// 祝日倍率を設定する時の送信内容。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolidayRequest {
    pub date: NaiveDate,
    pub multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// 生体認証端末からログを取得する期間。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BiometricFetchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

/// APIの一般的なレスポンス。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// 取り込みで失敗した行。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportFailure {
    pub row: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// 取り込み結果。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImportOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub imported: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub failures: Vec<ImportFailure>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// 生体認証ログ取得の結果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchSummary {
    pub events: usize,
    pub completed: Option<ProgressEvent>,
}

/// attendanceのAPIを扱うためのtrait。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AttendanceRepository {
    /// 既存のattendanceを更新する。
    async fn save_attendance(&self, request: &SaveAttendanceRequest) -> Result<ApiMessage>;

    /// 新しいattendanceを登録する。
    async fn create_attendance(&self, request: &CreateAttendanceRequest) -> Result<ApiMessage>;

    /// attendanceを同期する。
    async fn sync_attendance(&self, id: u64) -> Result<ApiMessage>;

    /// attendanceを削除する。
    async fn delete_attendance(&self, id: u64) -> Result<ApiMessage>;

    /// 取り込みファイルをアップロードする。
    ///
    /// サーバーが`success: false`を返した場合もエラーにはせず、結果として返す。
    async fn upload_import(&self, file_name: &str, content: Vec<u8>) -> Result<ImportOutcome>;

    /// 祝日倍率を設定する。
    async fn set_holiday(&self, request: &HolidayRequest) -> Result<ApiMessage>;
}

/// attendanceのAPIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = ApiClient::new(Config::from_env()?);
/// let message = client.sync_attendance(12).await?;
/// ```
pub struct ApiClient {
    client: Client,
    api_url: String,
    context: RequestContext,
}

impl ApiClient {
    /// 新しい`ApiClient`を返す。
    pub fn new(config: Config) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url,
            context: config.context,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// 生体認証端末のログ取得を開始し、進捗を受け取る。
    ///
    /// レスポンスは改行区切りのJSONとして逐次読み込み、1件ごとに`on_event`を呼ぶ。
    /// `error`イベントを受け取った場合はそのメッセージでエラーを返す。
    ///
    /// # Arguments
    ///
    /// * `request` - 取得する期間
    /// * `on_event` - 進捗イベントを受け取るコールバック
    pub async fn fetch_biometric_logs<F>(
        &self,
        request: &BiometricFetchRequest,
        mut on_event: F,
    ) -> Result<FetchSummary>
    where
        F: FnMut(&ProgressEvent) -> Result<()>,
    {
        let url = self.url("/biometric/fetch-logs");
        let mut response = self
            .context
            .apply(self.client.post(&url))
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?
            .error_for_status()
            .context("Request returned an error status")?;

        let mut decoder = NdjsonDecoder::default();
        let mut summary = FetchSummary::default();
        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read progress stream")?
        {
            for event in decoder.push(&chunk) {
                handle_event(&event, &mut summary, &mut on_event)?;
            }
        }
        if let Some(event) = decoder.finish() {
            handle_event(&event, &mut summary, &mut on_event)?;
        }
        info!("Biometric fetch finished after {} events", summary.events);

        Ok(summary)
    }
}

fn handle_event<F>(event: &ProgressEvent, summary: &mut FetchSummary, on_event: &mut F) -> Result<()>
where
    F: FnMut(&ProgressEvent) -> Result<()>,
{
    summary.events += 1;
    on_event(event)?;
    match event {
        ProgressEvent::Error { message } => bail!("Biometric fetch failed: {}", message),
        ProgressEvent::Complete { .. } => summary.completed = Some(event.clone()),
        ProgressEvent::Progress { .. } => {}
    }
    Ok(())
}

/// レスポンスを`ApiMessage`として読み、失敗ならサーバーのメッセージでエラーにする。
async fn read_message(response: Response, action: &str) -> Result<ApiMessage> {
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read {} response", action))?;
    let message: ApiMessage = serde_json::from_str(&body).unwrap_or_default();
    debug!("{} responded with {}: {:?}", action, status, message);

    if !status.is_success() || message.success == Some(false) {
        let reason = message
            .message
            .unwrap_or_else(|| format!("status {}", status));
        bail!("Failed to {}: {}", action, reason);
    }

    Ok(message)
}

#[async_trait]
impl AttendanceRepository for ApiClient {
    async fn save_attendance(&self, request: &SaveAttendanceRequest) -> Result<ApiMessage> {
        let url = self.url(&format!("/attendance/{}", request.id));
        let response = self
            .context
            .apply(self.client.put(&url))
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        read_message(response, "save attendance").await
    }

    async fn create_attendance(&self, request: &CreateAttendanceRequest) -> Result<ApiMessage> {
        let url = self.url("/attendance");
        let response = self
            .context
            .apply(self.client.post(&url))
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        read_message(response, "create attendance").await
    }

    async fn sync_attendance(&self, id: u64) -> Result<ApiMessage> {
        let url = self.url(&format!("/attendance/{}/sync", id));
        let response = self
            .context
            .apply(self.client.post(&url))
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        read_message(response, "sync attendance").await
    }

    async fn delete_attendance(&self, id: u64) -> Result<ApiMessage> {
        let url = self.url(&format!("/attendance/{}", id));
        let response = self
            .context
            .apply(self.client.delete(&url))
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        read_message(response, "delete attendance").await
    }

    async fn upload_import(&self, file_name: &str, content: Vec<u8>) -> Result<ImportOutcome> {
        let url = self.url("/attendance/import");
        let form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(content).file_name(file_name.to_string()),
        );
        let response = self
            .context
            .apply(self.client.post(&url))
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        let outcome = response
            .json::<ImportOutcome>()
            .await
            .with_context(|| format!("Failed to deserialize import response (status {})", status))?;
        info!(
            "Import responded with {}: imported={}, updated={}, failures={}",
            status,
            outcome.imported,
            outcome.updated,
            outcome.failures.len()
        );

        Ok(outcome)
    }

    async fn set_holiday(&self, request: &HolidayRequest) -> Result<ApiMessage> {
        let url = self.url("/attendance/holiday");
        let response = self
            .context
            .apply(self.client.post(&url))
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        read_message(response, "set holiday").await
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::{
        ApiClient, AttendanceRepository, BiometricFetchRequest, CreateAttendanceRequest,
        HolidayRequest, SaveAttendanceRequest,
    };
    use crate::attendance::ValidatedAttendance;
    use crate::biometric::ProgressEvent;
    use crate::config::{Config, RequestContext};

    fn client(url: String) -> ApiClient {
        ApiClient::new(Config {
            api_url: url,
            context: RequestContext {
                api_token: Some("secret".to_string()),
                csrf_token: Some("csrf-123".to_string()),
            },
        })
    }

    fn night_shift() -> ValidatedAttendance {
        ValidatedAttendance {
            time_in: "22:00".to_string(),
            time_out: None,
            break_out: None,
            break_in: None,
            next_day_timeout: Some("06:00".to_string()),
            is_nightshift: true,
            trip: 1.5,
        }
    }

    #[tokio::test]
    async fn test_save_attendance() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/attendance/12")
            .match_header("authorization", "Bearer secret")
            .match_header("x-csrf-token", "csrf-123")
            .match_body(Matcher::Json(json!({
                "id": 12,
                "time_in": "22:00",
                "time_out": null,
                "break_out": null,
                "break_in": null,
                "next_day_timeout": "06:00",
                "is_nightshift": true,
                "trip": 1.5,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true, "message": "Attendance updated"}"#)
            .create_async()
            .await;

        let request = SaveAttendanceRequest {
            id: 12,
            attendance: night_shift(),
        };
        let message = client(server.url()).save_attendance(&request).await.unwrap();

        assert_eq!(message.message.as_deref(), Some("Attendance updated"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_attendance() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/attendance")
            .match_body(Matcher::PartialJson(json!({
                "employee_no": "1001",
                "date": "2024-03-01",
                "time_in": "22:00",
            })))
            .with_status(201)
            .with_body(r#"{"success": true, "message": "Attendance created"}"#)
            .create_async()
            .await;

        let request = CreateAttendanceRequest {
            employee_no: "1001".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            attendance: night_shift(),
        };
        let result = client(server.url()).create_attendance(&request).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_uses_server_message() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/attendance/7/sync")
            .with_status(422)
            .with_body(r#"{"message": "Attendance is locked"}"#)
            .create_async()
            .await;

        let error = client(server.url()).sync_attendance(7).await.unwrap_err();

        assert_eq!(
            error.to_string(),
            "Failed to sync attendance: Attendance is locked"
        );
    }

    #[tokio::test]
    async fn test_success_false_is_error() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/attendance/7")
            .with_status(200)
            .with_body(r#"{"success": false, "message": "Not found"}"#)
            .create_async()
            .await;

        let error = client(server.url()).delete_attendance(7).await.unwrap_err();

        assert_eq!(error.to_string(), "Failed to delete attendance: Not found");
    }

    #[tokio::test]
    async fn test_error_status_without_body() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/attendance/8")
            .with_status(500)
            .create_async()
            .await;

        let error = client(server.url()).delete_attendance(8).await.unwrap_err();

        assert!(error.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_upload_import() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/attendance/import")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data".to_string()),
            )
            .with_status(200)
            .with_body(
                r#"{"success": true, "message": "done", "imported": 3, "updated": 1,
                    "failures": [{"row": 4, "errors": ["Unknown employee"]}]}"#,
            )
            .create_async()
            .await;

        let outcome = client(server.url())
            .upload_import("attendance.csv", b"employee_no\n1001\n".to_vec())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.imported, 3);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.failures[0].row, 4);
        assert_eq!(outcome.failures[0].errors, vec!["Unknown employee"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_import_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/attendance/import")
            .with_status(422)
            .with_body(r#"{"success": false, "errors": ["The file must be a CSV"]}"#)
            .create_async()
            .await;

        let outcome = client(server.url())
            .upload_import("attendance.csv", vec![])
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.errors, vec!["The file must be a CSV"]);
    }

    #[tokio::test]
    async fn test_set_holiday_omits_empty_department() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/attendance/holiday")
            .match_body(Matcher::Json(json!({"date": "2024-12-25", "multiplier": 2.0})))
            .with_status(200)
            .with_body(r#"{"success": true}"#)
            .create_async()
            .await;

        let request = HolidayRequest {
            date: NaiveDate::from_ymd_opt(2024, 12, 25).unwrap(),
            multiplier: 2.0,
            department: None,
        };
        client(server.url()).set_holiday(&request).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_biometric_logs() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/biometric/fetch-logs")
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body(concat!(
                r#"{"type": "progress", "message": "Connecting", "percent": 10}"#,
                "\n",
                r#"{"type": "progress", "message": "Reading logs", "percent": 60}"#,
                "\n",
                r#"{"type": "complete", "message": "Done", "fetched": 42}"#,
            ))
            .create_async()
            .await;

        let mut received = Vec::new();
        let summary = client(server.url())
            .fetch_biometric_logs(
                &BiometricFetchRequest {
                    start_date: None,
                    end_date: None,
                },
                |event| {
                    received.push(event.clone());
                    Ok(())
                },
            )
            .await
            .unwrap();

        assert_eq!(summary.events, 3);
        assert_eq!(received.len(), 3);
        assert_eq!(
            summary.completed,
            Some(ProgressEvent::Complete {
                message: "Done".to_string(),
                fetched: 42,
            })
        );
    }

    #[tokio::test]
    async fn test_fetch_biometric_logs_error_event() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/biometric/fetch-logs")
            .with_status(200)
            .with_body("{\"type\": \"error\", \"message\": \"Device offline\"}\n")
            .create_async()
            .await;

        let error = client(server.url())
            .fetch_biometric_logs(
                &BiometricFetchRequest {
                    start_date: None,
                    end_date: None,
                },
                |_| Ok(()),
            )
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "Biometric fetch failed: Device offline");
    }
}
