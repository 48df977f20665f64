use std::sync::Arc;

use chrono::Utc;
use color_eyre::eyre;
use structopt::StructOpt;
use tracing::info;

use exchanges::{BinanceClient, FuturesGateway};
use funding_sniper::{
    ledger, logger, notifier,
    schedule::{Clock, SystemClock},
    Config, Orchestrator,
};

// lib.rs에서 자동으로 dotenv가 로드됨

#[derive(Debug, StructOpt)]
#[structopt(name = "sniper", about = "음수 펀딩비 스나이핑 봇")]
enum Command {
    /// 스캔 → 진입 → 청산 루프 실행
    Run {
        /// 주문 없이 검증까지만 수행
        #[structopt(long)]
        dry_run: bool,
    },
    /// 한 번 스캔하고 후보/선택 결과 출력
    Scan,
    /// 최근 펀딩비 수입 리포트 한 번 전송
    Report,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // guard는 main이 끝날 때까지 유지
    let _guards = logger::init_tracing("logs")?;

    let cmd = Command::from_args();
    let mut config = Config::from_env()?;

    let gateway: Arc<dyn FuturesGateway> = Arc::new(BinanceClient::from_env());
    let notifier = notifier::from_config(config.telegram.as_ref());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cmd {
        Command::Run { dry_run } => {
            config.dry_run |= dry_run;
            info!("봇 시작 (dry-run: {})", config.dry_run);
            info!("  Threshold: {}", config.threshold);
            info!("  Capital: {} USDT", config.capital);
            info!("  Leverage: {}x", config.leverage);
            info!("  Policy: {}", config.selection_policy);

            let _report = ledger::spawn_funding_report(
                gateway.clone(),
                notifier.clone(),
                clock.clone(),
                config.report_interval,
            );
            let mut orchestrator = Orchestrator::new(gateway, notifier, clock, config);
            orchestrator.run().await;
            Ok(())
        }
        Command::Scan => {
            let mut orchestrator = Orchestrator::new(gateway, notifier, clock, config);
            let report = orchestrator.scan_once().await?;
            info!("{}개 심볼 스캔, 후보 {}개", report.scanned, report.eligible.len());
            for c in &report.eligible {
                info!(
                    "  {:<14} {:>9.4}%  {}  {:>7.0}s",
                    c.symbol,
                    c.rate * 100.0,
                    c.interval,
                    c.seconds_to_funding
                );
            }
            match (report.selection, report.phase) {
                (Some(selection), Some(phase)) => {
                    info!("선택: {} ({})", selection.candidate.symbol, phase)
                }
                _ => info!("선택된 심볼 없음"),
            }
            Ok(())
        }
        Command::Report => {
            let summary =
                ledger::run_report_once(gateway.as_ref(), notifier.as_ref(), Utc::now()).await?;
            info!("{}", summary.format_report());
            Ok(())
        }
    }
}
