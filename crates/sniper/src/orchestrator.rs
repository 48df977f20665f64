//! 메인 루프. 포지션이 있으면 청산 시점까지 기다리고, 없으면 스캔 후 진입을 노린다.
//!
//! 모든 대기는 여기서 계산한 한 지점에서만 일어난다.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::catalog::{self, RateCatalog};
use crate::config::Config;
use crate::error::{BackoffPolicy, EngineError};
use crate::lifecycle::{EntryOutcome, PositionEntry, PositionManager};
use crate::notifier::{Alert, AlertKind, Notifier};
use crate::schedule::{self, classify, secs, seconds_to_funding, Clock, Phase};
use crate::selector::{self, EligibleCandidate, Selection};
use crate::validation::{validate_entry, CancelReason};
use exchanges::FuturesGateway;

#[derive(Debug, Clone, PartialEq)]
pub enum WaitReason {
    /// 정기 스캔 경계 또는 다음 진입 구간 시작
    Coarse,
    EntryWindowOpen { symbol: String },
    EntryTarget { symbol: String },
    Holding { symbol: String },
    PositionOpened { symbol: String },
    PositionClosed { symbol: String },
    Cancelled { symbol: String, reason: CancelReason },
    Simulated { symbol: String },
    /// 재선택 결과가 달라져 바로 다시 계획
    Replan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Wait {
    pub duration: Duration,
    pub reason: WaitReason,
}

impl Wait {
    fn new(duration: Duration, reason: WaitReason) -> Self {
        Self { duration, reason }
    }
}

/// 한 번의 스캔 결과 (CLI `scan`에서도 사용)
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub scanned: usize,
    pub eligible: Vec<EligibleCandidate>,
    pub selection: Option<Selection>,
    pub phase: Option<Phase>,
}

pub struct Orchestrator {
    gateway: Arc<dyn FuturesGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: Config,
    positions: PositionManager,
    backoff: BackoffPolicy,
    catalog: RateCatalog,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn FuturesGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            positions: PositionManager::new(config.cooldown),
            backoff: BackoffPolicy::from_config(&config),
            catalog: RateCatalog::default(),
            gateway,
            notifier,
            clock,
            config,
        }
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    /// 에러가 나도 끝나지 않는다. 에러 종류별로 정해진 시간만큼 쉬고 다시 돈다.
    pub async fn run(&mut self) {
        self.notify(
            AlertKind::Status,
            format!(
                "sniper started: threshold {:.4}%, capital {} USDT, leverage {}x, policy {}{}",
                self.config.threshold * 100.0,
                self.config.capital,
                self.config.leverage,
                self.config.selection_policy,
                if self.config.dry_run { ", dry-run" } else { "" }
            ),
        )
        .await;

        loop {
            match self.run_cycle().await {
                Ok(wait) => {
                    debug!("sleep {:.1}s ({:?})", wait.duration.as_secs_f64(), wait.reason);
                    sleep(wait.duration).await;
                }
                Err(e) => {
                    let kind = e.kind();
                    let backoff = self.backoff.for_kind(kind);
                    error!("cycle failed [{}]: {}, retry in {}s", kind, e, backoff.as_secs());
                    self.notify(AlertKind::Error(kind), e.to_string()).await;
                    sleep(backoff).await;
                }
            }
        }
    }

    pub async fn run_cycle(&mut self) -> Result<Wait, EngineError> {
        match self.positions.open_position().cloned() {
            Some(entry) => self.tend_open_position(entry).await,
            None => self.scan_and_enter().await,
        }
    }

    pub async fn scan_once(&mut self) -> Result<ScanReport, EngineError> {
        let now = self.clock.now();
        self.scan(now).await
    }

    async fn scan(&mut self, now: DateTime<Utc>) -> Result<ScanReport, EngineError> {
        self.gateway.ping().await.map_err(EngineError::Connectivity)?;

        let threshold = self.config.threshold;
        let catalog = RateCatalog::build(self.gateway.as_ref(), threshold).await?;
        self.positions.prune_cooldowns(now);

        let eligible = selector::annotate(selector::filter_eligible(&catalog.rates, threshold), now);
        let positions = &self.positions;
        let selection = selector::select(
            &catalog.rates,
            threshold,
            now,
            self.config.selection_policy,
            self.config.tie_tolerance,
            |symbol| positions.in_cooldown(symbol, now),
        );
        let phase = selection.as_ref().map(|s| {
            classify(s.candidate.seconds_to_funding, s.candidate.interval, &self.config.window)
        });

        let scanned = catalog.rates.len();
        self.catalog = catalog;
        Ok(ScanReport {
            scanned,
            eligible,
            selection,
            phase,
        })
    }

    async fn scan_and_enter(&mut self) -> Result<Wait, EngineError> {
        let now = self.clock.now();
        let report = self.scan(now).await?;
        let coarse = self.coarse_wait(now);

        if !report.eligible.is_empty() {
            let listed: Vec<String> = report
                .eligible
                .iter()
                .take(5)
                .map(|c| format!("{} {:.4}% ({}, {:.0}m)", c.symbol, c.rate * 100.0, c.interval, c.seconds_to_funding / 60.0))
                .collect();
            self.notify(
                AlertKind::Scan,
                format!("{} eligible of {}: {}", report.eligible.len(), report.scanned, listed.join(", ")),
            )
            .await;
        }

        let (selection, phase) = match (report.selection, report.phase) {
            (Some(selection), Some(phase)) => (selection, phase),
            _ => {
                info!("no candidate, next check in {}s", coarse.as_secs());
                return Ok(self.capped(Wait::new(coarse, WaitReason::Coarse)));
            }
        };

        let s = selection.candidate.seconds_to_funding;
        let symbol = selection.candidate.symbol.clone();
        let window = &self.config.window;
        let to_open = secs(s - window.entry_open.as_secs_f64());
        let target = window.entry_target.as_secs_f64();
        info!("selected {} ({}, {:.0}s to funding)", symbol, phase, s);

        let wait = match phase {
            Phase::Far if to_open <= coarse => Wait::new(to_open, WaitReason::EntryWindowOpen { symbol }),
            Phase::Approach => Wait::new(to_open, WaitReason::EntryWindowOpen { symbol }),
            // 진입 목표 시각까지 1초 넘게 남았으면 정확히 그 시각까지 잔다
            Phase::EntryWindow if s > target + 1.0 => {
                Wait::new(secs(s - target), WaitReason::EntryTarget { symbol })
            }
            Phase::EntryWindow => return self.attempt_entry(selection).await,
            _ => Wait::new(coarse, WaitReason::Coarse),
        };
        Ok(self.capped(wait))
    }

    async fn attempt_entry(&mut self, selection: Selection) -> Result<Wait, EngineError> {
        let now = self.clock.now();
        let stale = (now - selection.selected_at)
            .to_std()
            .map(|age| age > self.config.freshness)
            .unwrap_or(false);

        let candidate = if stale {
            let fresh = self
                .catalog
                .refresh(self.gateway.as_ref(), self.config.threshold)
                .await?;
            let positions = &self.positions;
            let reselected = selector::select(
                &fresh.rates,
                self.config.threshold,
                now,
                self.config.selection_policy,
                self.config.tie_tolerance,
                |symbol| positions.in_cooldown(symbol, now),
            );
            self.catalog = fresh;

            let still_in_window = |c: &EligibleCandidate| {
                classify(c.seconds_to_funding, c.interval, &self.config.window) == Phase::EntryWindow
            };
            match reselected {
                Some(fresh) if still_in_window(&fresh.candidate) => {
                    if fresh.candidate.symbol != selection.candidate.symbol {
                        info!(
                            "fresh rates favor {} over {}",
                            fresh.candidate.symbol, selection.candidate.symbol
                        );
                    }
                    fresh.candidate
                }
                _ => {
                    let symbol = selection.candidate.symbol;
                    let reason = CancelReason::NoLongerEligible;
                    self.notify(AlertKind::Cancelled, format!("{}: {}", symbol, reason)).await;
                    return Ok(Wait::new(Duration::ZERO, WaitReason::Replan));
                }
            }
        } else {
            selection.candidate
        };

        let symbol = candidate.symbol.clone();
        let approved = match validate_entry(
            self.gateway.as_ref(),
            &self.positions,
            &self.config,
            &symbol,
            self.clock.as_ref(),
        )
        .await
        {
            Ok(approved) => approved,
            Err(reason) => {
                warn!("entry {} cancelled: {}", symbol, reason);
                self.notify(AlertKind::Cancelled, format!("{}: {}", symbol, reason)).await;
                let coarse = self.coarse_wait(self.clock.now());
                return Ok(self.capped(Wait::new(coarse, WaitReason::Cancelled { symbol, reason })));
            }
        };

        let entered_at = self.clock.now();
        let outcome = self
            .positions
            .enter(self.gateway.as_ref(), &self.config, &approved, &candidate, entered_at)
            .await?;

        match outcome {
            EntryOutcome::Opened(entry) => {
                self.notify(
                    AlertKind::Entry,
                    format!(
                        "LONG {} qty {} @ {} (rate {:.4}%, exit by {})",
                        entry.symbol,
                        entry.quantity,
                        entry.entry_price,
                        entry.rate * 100.0,
                        entry.planned_exit_timestamp.format("%H:%M:%S")
                    ),
                )
                .await;
                if !entry.protected {
                    self.notify(
                        AlertKind::Unprotected,
                        format!("{} is open without a stop-loss", entry.symbol),
                    )
                    .await;
                }
                Ok(Wait::new(Duration::ZERO, WaitReason::PositionOpened { symbol }))
            }
            EntryOutcome::Simulated { price, quantity, .. } => {
                self.notify(
                    AlertKind::Entry,
                    format!("[dry-run] LONG {} qty {} @ {}", symbol, quantity, price),
                )
                .await;
                let coarse = self.coarse_wait(self.clock.now());
                Ok(self.capped(Wait::new(coarse, WaitReason::Simulated { symbol })))
            }
        }
    }

    /// 고정 청산 시각과 재계산한 청산 구간 중 먼저 오는 쪽에서 청산
    async fn tend_open_position(&mut self, entry: PositionEntry) -> Result<Wait, EngineError> {
        let symbol = entry.symbol.clone();
        let interval = match catalog::current_interval(self.gateway.as_ref(), &symbol).await {
            Ok(interval) => interval,
            Err(e) => {
                warn!("interval check for {} failed, keep {}: {}", symbol, entry.interval, e);
                entry.interval
            }
        };

        let now = self.clock.now();
        let s = seconds_to_funding(now, interval);
        let phase = classify(s, interval, &self.config.window);

        if now >= entry.planned_exit_timestamp || phase == Phase::CloseWindow {
            let trade = self
                .positions
                .close(self.gateway.as_ref(), &self.config, now)
                .await?;
            match serde_json::to_string(&trade) {
                Ok(json) => info!("trade result {}", json),
                Err(e) => warn!("trade result serialize failed: {}", e),
            }
            self.notify(
                AlertKind::Exit,
                format!(
                    "closed {} @ {}: {:+.4} USDT ({:+.2}%)",
                    trade.symbol, trade.exit_price, trade.realized_pnl, trade.pnl_percent
                ),
            )
            .await;
            return Ok(Wait::new(Duration::ZERO, WaitReason::PositionClosed { symbol }));
        }

        let to_planned = (entry.planned_exit_timestamp - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let to_close_window = secs(s - self.config.window.close_window.as_secs_f64());
        let wait = to_planned
            .min(to_close_window)
            .min(self.config.open_position_poll);
        debug!("holding {} ({}), {:.0}s to exit", symbol, phase, to_planned.as_secs_f64());
        Ok(Wait::new(wait, WaitReason::Holding { symbol }))
    }

    /// 다음 정기 스캔 경계와 4시간 격자의 다음 진입 구간 시작 중 빠른 쪽
    fn coarse_wait(&self, now: DateTime<Utc>) -> Duration {
        schedule::until_next_scan_boundary(now, self.config.scan_interval)
            .min(schedule::until_next_entry_checkpoint(now, &self.config.window))
    }

    fn capped(&self, wait: Wait) -> Wait {
        Wait::new(wait.duration.min(self.config.scan_interval), wait.reason)
    }

    async fn notify(&self, kind: AlertKind, message: String) {
        self.notifier.notify(Alert::new(kind, message)).await;
    }
}
