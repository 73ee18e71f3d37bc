//! Runs a chaos action once or on a fixed interval.

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::action::ChaosCommand;
use crate::error::ChaosError;
use crate::params::GlobalParams;

/// Run `command` according to `params`.
///
/// Without an interval the action runs exactly once and its result is
/// returned. With an interval it runs immediately and then on every tick
/// until `token` is cancelled, which ends the loop with `Ok(())`. A failing
/// cycle ends the loop with that error unless `params.skip_errors` is set.
pub async fn run_chaos(
    token: &CancellationToken,
    command: &dyn ChaosCommand,
    params: &GlobalParams,
) -> Result<(), ChaosError> {
    let Some(period) = params.interval.filter(|p| !p.is_zero()) else {
        return command.run(token, params.random).await;
    };

    tracing::info!(action = command.name(), interval = ?period, "starting chaos loop");
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if let Err(e) = command.run(token, params.random).await {
            if !params.skip_errors {
                return Err(e);
            }
            tracing::warn!(action = command.name(), error = %e, "chaos cycle failed, continuing");
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!(action = command.name(), "chaos loop cancelled");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::error::EngineError;

    /// Counts runs and fails the ones listed in `fail_on`.
    struct Counting {
        runs: Arc<AtomicUsize>,
        fail_on: Vec<usize>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl Counting {
        fn new(fail_on: Vec<usize>) -> Self {
            Self {
                runs: Arc::new(AtomicUsize::new(0)),
                fail_on,
                cancel_after: None,
            }
        }
    }

    #[async_trait]
    impl ChaosCommand for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self, _token: &CancellationToken, _random: bool) -> Result<(), ChaosError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, token)) = &self.cancel_after {
                if n >= *limit {
                    token.cancel();
                }
            }
            if self.fail_on.contains(&n) {
                return Err(ChaosError::Listing(EngineError::api("list containers", "boom")));
            }
            Ok(())
        }
    }

    fn every(ms: u64) -> GlobalParams {
        GlobalParams {
            interval: Some(Duration::from_millis(ms)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn single_shot_runs_once() {
        let cmd = Counting::new(vec![]);
        run_chaos(&CancellationToken::new(), &cmd, &GlobalParams::default())
            .await
            .unwrap();
        assert_eq!(cmd.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_shot_returns_error_even_with_skip() {
        let cmd = Counting::new(vec![1]);
        let params = GlobalParams {
            skip_errors: true,
            ..Default::default()
        };
        let result = run_chaos(&CancellationToken::new(), &cmd, &params).await;
        assert!(matches!(result, Err(ChaosError::Listing(_))));
    }

    #[tokio::test]
    async fn interval_runs_until_cancelled() {
        let token = CancellationToken::new();
        let mut cmd = Counting::new(vec![]);
        cmd.cancel_after = Some((3, token.clone()));

        tokio::time::timeout(Duration::from_secs(5), run_chaos(&token, &cmd, &every(5)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cmd.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn interval_stops_on_error_without_skip() {
        let token = CancellationToken::new();
        let mut cmd = Counting::new(vec![2]);
        cmd.cancel_after = Some((10, token.clone()));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_chaos(&token, &cmd, &every(5)),
        )
        .await
        .unwrap();
        assert!(result.is_err());
        assert_eq!(cmd.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn interval_skips_errors_when_asked() {
        let token = CancellationToken::new();
        let mut cmd = Counting::new(vec![1, 2]);
        cmd.cancel_after = Some((4, token.clone()));
        let params = GlobalParams {
            skip_errors: true,
            ..every(5)
        };

        tokio::time::timeout(Duration::from_secs(5), run_chaos(&token, &cmd, &params))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cmd.runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cancelled_before_first_tick_returns_promptly() {
        let token = CancellationToken::new();
        let cmd = Counting::new(vec![]);
        token.cancel();

        tokio::time::timeout(
            Duration::from_secs(1),
            run_chaos(&token, &cmd, &every(60_000)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(cmd.runs.load(Ordering::SeqCst), 1);
    }
}
