pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod logger;
pub mod notifier;
pub mod orchestrator;
pub mod schedule;
pub mod selector;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::EngineError;
pub use orchestrator::Orchestrator;

use std::sync::Once;

static INIT: Once = Once::new();

/// .env를 한 번만 읽어 환경변수에 반영
fn init() {
    INIT.call_once(|| {
        dotenv::dotenv().ok();
    });
}

// 라이브러리 로드 시 자동 실행
#[ctor::ctor]
fn setup() {
    init();
}
