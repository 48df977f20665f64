use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::TelegramConfig;
use crate::error::ErrorKind;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Status,
    Scan,
    Entry,
    Exit,
    Cancelled,
    /// 진입은 체결됐는데 손절 주문이 실패한 상태. 운영자 확인 필요.
    Unprotected,
    Error(ErrorKind),
    Report,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Status => f.write_str("STATUS"),
            AlertKind::Scan => f.write_str("SCAN"),
            AlertKind::Entry => f.write_str("ENTRY"),
            AlertKind::Exit => f.write_str("EXIT"),
            AlertKind::Cancelled => f.write_str("CANCELLED"),
            AlertKind::Unprotected => f.write_str("UNPROTECTED"),
            AlertKind::Error(kind) => write!(f, "ERROR:{}", kind),
            AlertKind::Report => f.write_str("REPORT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// 사람이 읽는 상태/경고 메시지 전달. 실패해도 호출자에게 전파하지 않는다.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: Alert);
}

/// 로컬 로그에만 남기는 알림 (텔레그램 설정이 없을 때)
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: Alert) {
        info!("{}", alert);
    }
}

pub struct TelegramNotifier {
    http: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, config }
    }

    async fn send(&self, text: &str) -> Result<(), reqwest::Error> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API, self.config.token);
        self.http
            .post(&url)
            .form(&[("chat_id", self.config.chat_id.as_str()), ("text", text)])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, alert: Alert) {
        let text = alert.to_string();
        // 모든 알림은 로컬에도 남긴다
        info!("{}", text);
        if let Err(e) = self.send(&text).await {
            warn!("telegram send failed: {}", e);
        }
    }
}

/// 설정에 따라 알림 구현 선택
pub fn from_config(telegram: Option<&TelegramConfig>) -> Arc<dyn Notifier> {
    match telegram {
        Some(config) => Arc::new(TelegramNotifier::new(config.clone())),
        None => Arc::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alerts_carry_category_prefix() {
        let alert = Alert::new(AlertKind::Unprotected, "ABCUSDT stop-loss failed");
        assert_eq!(alert.to_string(), "[UNPROTECTED] ABCUSDT stop-loss failed");

        let alert = Alert::new(AlertKind::Error(ErrorKind::Connectivity), "ping failed");
        assert_eq!(alert.to_string(), "[ERROR:connectivity] ping failed");
    }

    #[tokio::test]
    async fn telegram_failure_is_swallowed() {
        let notifier = TelegramNotifier::new(TelegramConfig {
            token: "invalid".to_string(),
            chat_id: "0".to_string(),
        });
        // 네트워크 유무와 관계없이 패닉 없이 끝나야 한다
        notifier
            .notify(Alert::new(AlertKind::Status, "hello"))
            .await;
    }
}
