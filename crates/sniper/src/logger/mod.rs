use std::{fs, io, path::Path};

use tracing_appender::{
    non_blocking,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Tracing guards를 보관하는 구조체
/// 이 구조체가 drop되기 전까지 로깅이 계속 작동합니다
pub struct TracingGuards {
    _file: tracing_appender::non_blocking::WorkerGuard,
    _stdout: tracing_appender::non_blocking::WorkerGuard,
}

/// Tracing 초기화
/// 파일 로깅과 stdout 로깅을 모두 설정합니다
pub fn init_tracing(log_dir: &str) -> io::Result<TracingGuards> {
    // 1) 파일 appender
    let (file_writer, file_guard) = non_blocking(utc_daily_file_appender(log_dir, "sniper")?);

    // 2) stdout도 non-blocking
    let (stdout_writer, stdout_guard) = non_blocking(std::io::stdout());

    // 3) RUST_LOG가 없으면 info
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // 파일 로깅: INFO 레벨 이상만 기록
    let file_filter = EnvFilter::new("info");

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(file_filter),
        )
        .with(fmt::layer().with_writer(stdout_writer).with_ansi(true))
        .init();

    Ok(TracingGuards {
        _file: file_guard,
        _stdout: stdout_guard,
    })
}

/// `logs/sniper.2025-11-29.log` 형식으로 하루마다 새 파일을 연다.
/// 날짜는 UTC 기준 (펀딩 정산과 같은 기준).
fn utc_daily_file_appender(base_dir: impl AsRef<Path>, prefix: &str) -> io::Result<RollingFileAppender> {
    fs::create_dir_all(base_dir.as_ref())?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(base_dir)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
