//! Speculative signing cache
//!
//! Signing is started as soon as a trade is quoted and the result is picked up at final
//! confirmation, but only while it still matches a trade the user actually saw. One cache
//! instance lives for one swap session.

use crate::config::PipelineConfig;
use crate::error::{is_cancelled, Report, Result, SignerError};
use crate::signer::TransactionSigner;
use crate::types::{SignedTransaction, SwapTradeContext, TradeComparator, TxRequest};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

type AttemptOutcome = std::result::Result<SignedTransaction, Arc<Report>>;
type AttemptFuture = Shared<BoxFuture<'static, AttemptOutcome>>;

/// A completed signature together with the trade it was produced for
#[derive(Debug, Clone)]
pub struct PreSignedResult {
    pub signed: SignedTransaction,
    pub context: SwapTradeContext,
    pub started_at: Instant,
    pub completed_at: Instant,
}

/// The one in-flight signing attempt
struct SigningAttempt {
    id: u64,
    result: AttemptFuture,
    abort: AbortHandle,
    context: SwapTradeContext,
    started_at: Instant,
}

#[derive(Default)]
struct SigningState {
    next_attempt_id: u64,
    current: Option<SigningAttempt>,
    last_signed: Option<PreSignedResult>,
    execution_called: bool,
}

/// Owned by the signing task. Releases the current-attempt slot on every exit path, panics
/// and aborts included, as long as the slot still belongs to this attempt.
struct AttemptSlot {
    state: Arc<Mutex<SigningState>>,
    id: u64,
}

impl AttemptSlot {
    fn record(&self, signed: &SignedTransaction, context: SwapTradeContext, started_at: Instant) {
        let mut state = lock(&self.state);
        if state.current.as_ref().map(|attempt| attempt.id) == Some(self.id) {
            state.last_signed = Some(PreSignedResult {
                signed: signed.clone(),
                context,
                started_at,
                completed_at: Instant::now(),
            });
        }
    }
}

impl Drop for AttemptSlot {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.current.as_ref().map(|attempt| attempt.id) == Some(self.id) {
            state.current = None;
        }
    }
}

fn lock(state: &Mutex<SigningState>) -> MutexGuard<'_, SigningState> {
    // The state is plain data; a panic elsewhere cannot leave it half-written.
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Whether a signature produced for `signed_context`, started at `started_at`, may be used
/// for `current` at time `now`
pub fn is_valid_signed_transaction(
    comparator: &impl TradeComparator,
    staleness_window: Duration,
    signed_context: &SwapTradeContext,
    started_at: Instant,
    current: &SwapTradeContext,
    now: Instant,
) -> bool {
    if now.saturating_duration_since(started_at) > staleness_window {
        return false;
    }
    if signed_context.routing != current.routing {
        return false;
    }
    !comparator.should_accept_new_trade(signed_context, current)
}

/// Session-scoped cache of speculatively signed transactions
///
/// States: idle, signing (one attempt in flight), ready (a result is cached). Prepare
/// requests while signing, or after [`mark_execution_called`](Self::mark_execution_called),
/// are ignored.
pub struct SpeculativeSigningCache<S, Q> {
    signer: Arc<S>,
    comparator: Q,
    config: PipelineConfig,
    state: Arc<Mutex<SigningState>>,
}

impl<S, Q> SpeculativeSigningCache<S, Q>
where
    S: TransactionSigner + 'static,
    Q: TradeComparator,
{
    pub fn new(signer: Arc<S>, comparator: Q, config: PipelineConfig) -> Self {
        Self {
            signer,
            comparator,
            config,
            state: Arc::new(Mutex::new(SigningState::default())),
        }
    }

    /// Prepare and sign `request` for the trade `context`
    ///
    /// Returns `Ok(None)` without touching the signer when an attempt is already in flight
    /// or execution has been called, and when the attempt gets cancelled. Other failures are
    /// returned to the caller.
    pub async fn prepare_and_sign(
        &self,
        request: TxRequest,
        context: SwapTradeContext,
    ) -> Result<Option<SignedTransaction>> {
        let attempt = {
            let mut state = lock(&self.state);
            if state.execution_called {
                tracing::debug!("Skipping prepare: execution already called");
                return Ok(None);
            }
            if state.current.is_some() {
                tracing::debug!("Skipping prepare: signing already in flight");
                return Ok(None);
            }

            let id = state.next_attempt_id;
            state.next_attempt_id += 1;
            let started_at = Instant::now();
            let (result, abort) = self.spawn_attempt(id, request, context.clone(), started_at);

            tracing::debug!(attempt = id, routing = ?context.routing, "Started signing attempt");
            state.current = Some(SigningAttempt {
                id,
                result: result.clone(),
                abort,
                context,
                started_at,
            });
            result
        };

        match attempt.await {
            Ok(signed) => Ok(Some(signed)),
            Err(err) if is_cancelled(&err) => {
                tracing::debug!("Signing attempt was cancelled");
                Ok(None)
            }
            Err(err) => Err(unshare(err)),
        }
    }

    /// Run prepare + sign on its own task. The task records its result in the shared state
    /// only if it is still the current attempt when it finishes, and frees the slot either way.
    fn spawn_attempt(
        &self,
        id: u64,
        request: TxRequest,
        context: SwapTradeContext,
        started_at: Instant,
    ) -> (AttemptFuture, AbortHandle) {
        let signer = Arc::clone(&self.signer);
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            let slot = AttemptSlot { state, id };
            let outcome = async {
                let prepared = signer.prepare_transaction(request).await?;
                signer.sign_transaction(prepared).await
            }
            .await;

            if let Ok(signed) = &outcome {
                slot.record(signed, context, started_at);
            }
            outcome
        });

        let abort = task.abort_handle();
        let result = async move {
            match task.await {
                Ok(outcome) => outcome.map_err(Arc::new),
                Err(join_error) if join_error.is_cancelled() => {
                    Err(Arc::new(Report::new(SignerError::Cancelled)))
                }
                Err(join_error) => Err(Arc::new(eyre::eyre!(
                    "Signing task failed: {}",
                    join_error
                ))),
            }
        }
        .boxed()
        .shared();

        (result, abort)
    }

    /// Find a signed transaction usable for `current`
    ///
    /// A valid cached result is returned immediately; otherwise a valid in-flight attempt is
    /// awaited. `None` means the caller has to sign synchronously.
    pub async fn get_valid_signed_transaction(
        &self,
        current: &SwapTradeContext,
    ) -> Option<SignedTransaction> {
        let in_flight = {
            let state = lock(&self.state);
            let now = Instant::now();

            if let Some(cached) = &state.last_signed {
                if self.is_valid(&cached.context, cached.started_at, current, now) {
                    tracing::debug!("Reusing cached signed transaction {}", cached.signed.hash);
                    return Some(cached.signed.clone());
                }
            }

            match &state.current {
                Some(attempt) if self.is_valid(&attempt.context, attempt.started_at, current, now) => {
                    attempt.result.clone()
                }
                _ => return None,
            }
        };

        match in_flight.await {
            Ok(signed) => Some(signed),
            Err(err) => {
                if is_cancelled(&err) {
                    tracing::debug!("In-flight signing attempt was cancelled");
                } else {
                    tracing::warn!("In-flight signing attempt failed: {:#}", err);
                }
                None
            }
        }
    }

    /// Validity check against the current wall clock
    pub fn is_valid_signed_transaction(
        &self,
        signed_context: &SwapTradeContext,
        started_at: Instant,
        current: &SwapTradeContext,
    ) -> bool {
        self.is_valid(signed_context, started_at, current, Instant::now())
    }

    fn is_valid(
        &self,
        signed_context: &SwapTradeContext,
        started_at: Instant,
        current: &SwapTradeContext,
        now: Instant,
    ) -> bool {
        is_valid_signed_transaction(
            &self.comparator,
            self.config.staleness_window,
            signed_context,
            started_at,
            current,
            now,
        )
    }

    /// Cancel the in-flight attempt and drop every cached result
    pub fn clear_signing_state(&self) {
        let mut state = lock(&self.state);
        if let Some(attempt) = state.current.take() {
            tracing::debug!(attempt = attempt.id, "Cancelling signing attempt");
            attempt.abort.abort();
        }
        state.last_signed = None;
    }

    /// Latch: after this, prepare requests are ignored for the rest of the session
    pub fn mark_execution_called(&self) {
        lock(&self.state).execution_called = true;
    }

    pub fn execution_called(&self) -> bool {
        lock(&self.state).execution_called
    }

    pub fn is_signing(&self) -> bool {
        lock(&self.state).current.is_some()
    }

    /// Most recent completed result, regardless of validity
    pub fn last_signed(&self) -> Option<PreSignedResult> {
        lock(&self.state).last_signed.clone()
    }
}

impl<S, Q> Drop for SpeculativeSigningCache<S, Q> {
    fn drop(&mut self) {
        if let Some(attempt) = lock(&self.state).current.take() {
            attempt.abort.abort();
        }
    }
}

/// Take the report back out of the shared outcome. When other waiters still hold it, the
/// signer error kind (if any) is rebuilt so callers can keep downcasting.
fn unshare(err: Arc<Report>) -> Report {
    let shared = match Arc::try_unwrap(err) {
        Ok(report) => return report,
        Err(shared) => shared,
    };
    match shared.downcast_ref::<SignerError>() {
        Some(kind) if kind.to_string() == shared.to_string() => Report::new(kind.clone()),
        Some(kind) => Report::new(kind.clone()).wrap_err(shared.to_string()),
        None => eyre::eyre!("{:#}", shared),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{swap_context, MockTransactionSigner};
    use crate::types::{PriceMovementComparator, Routing};
    use alloy::primitives::{Address, U256};
    use tokio_test::assert_ok;

    type Cache = SpeculativeSigningCache<MockTransactionSigner, PriceMovementComparator>;

    fn cache(signer: MockTransactionSigner) -> (Arc<Cache>, Arc<MockTransactionSigner>) {
        let signer = Arc::new(signer);
        let cache = SpeculativeSigningCache::new(
            Arc::clone(&signer),
            PriceMovementComparator::default(),
            PipelineConfig::default(),
        );
        (Arc::new(cache), signer)
    }

    fn request() -> TxRequest {
        TxRequest::new(Address::repeat_byte(0x11), vec![0x01]).with_chain_id(1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_result_is_reused_without_signing_again() {
        let (cache, signer) = cache(MockTransactionSigner::with_delay(Duration::from_millis(1200)));
        let c1 = swap_context(1000, 2000);

        let signed = assert_ok!(cache.prepare_and_sign(request(), c1.clone()).await).unwrap();
        tokio::time::advance(Duration::from_millis(800)).await;

        let reused = cache.get_valid_signed_transaction(&c1).await;
        assert_eq!(reused, Some(signed));
        assert_eq!(signer.sign_calls(), 1);
        assert!(!cache.is_signing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_moved_trade_rejects_cached_result() {
        let (cache, _) = cache(MockTransactionSigner::with_delay(Duration::from_millis(100)));
        let c1 = swap_context(1000, 2000);
        // 5% worse price: the quoting engine would ask the user to accept it
        let c2 = swap_context(1000, 1900);

        assert_ok!(cache.prepare_and_sign(request(), c1).await);
        assert_eq!(cache.get_valid_signed_transaction(&c2).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_routing_change_rejects_cached_result() {
        let (cache, _) = cache(MockTransactionSigner::with_delay(Duration::from_millis(100)));
        let c1 = swap_context(1000, 2000);
        let mut c2 = c1.clone();
        c2.routing = Routing::DutchV2;

        assert_ok!(cache.prepare_and_sign(request(), c1).await);
        assert_eq!(cache.get_valid_signed_transaction(&c2).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_is_rejected() {
        let (cache, _) = cache(MockTransactionSigner::with_delay(Duration::from_millis(1000)));
        let c1 = swap_context(1000, 2000);

        assert_ok!(cache.prepare_and_sign(request(), c1.clone()).await);
        // 1s signing + 4.1s wait = 5.1s since signing started
        tokio::time::advance(Duration::from_millis(4100)).await;

        assert_eq!(cache.get_valid_signed_transaction(&c1).await, None);
        assert!(cache.last_signed().is_some());
    }

    #[test]
    fn test_staleness_wins_over_trade_equality() {
        let comparator = PriceMovementComparator::default();
        let context = swap_context(1000, 2000);
        let started_at = Instant::now();
        let window = Duration::from_secs(5);

        assert!(is_valid_signed_transaction(
            &comparator,
            window,
            &context,
            started_at,
            &context,
            started_at + Duration::from_secs(5)
        ));
        assert!(!is_valid_signed_transaction(
            &comparator,
            window,
            &context,
            started_at,
            &context,
            started_at + Duration::from_millis(5001)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_prepare_while_signing_is_ignored() {
        let (cache, signer) = cache(MockTransactionSigner::with_delay(Duration::from_secs(1)));
        let c1 = swap_context(1000, 2000);

        let first = tokio::spawn({
            let cache = Arc::clone(&cache);
            let c1 = c1.clone();
            async move { cache.prepare_and_sign(request(), c1).await }
        });
        tokio::task::yield_now().await;
        assert!(cache.is_signing());

        let second = assert_ok!(cache.prepare_and_sign(request(), c1).await);
        assert!(second.is_none());

        let first = assert_ok!(first.await.unwrap());
        assert!(first.is_some());
        assert_eq!(signer.prepare_calls(), 1);
        assert_eq!(signer.sign_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_attempt_is_awaited() {
        let (cache, signer) = cache(MockTransactionSigner::with_delay(Duration::from_millis(1200)));
        let c1 = swap_context(1000, 2000);

        let prepare = tokio::spawn({
            let cache = Arc::clone(&cache);
            let c1 = c1.clone();
            async move { cache.prepare_and_sign(request(), c1).await }
        });
        tokio::task::yield_now().await;

        let awaited = cache.get_valid_signed_transaction(&c1).await;
        assert!(awaited.is_some());
        assert_eq!(assert_ok!(prepare.await.unwrap()), awaited);
        assert_eq!(signer.sign_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_in_flight_attempt_is_not_awaited() {
        let (cache, _) = cache(MockTransactionSigner::with_delay(Duration::from_secs(3)));
        let c1 = swap_context(1000, 2000);
        let mut other_route = c1.clone();
        other_route.routing = Routing::Priority;

        let _prepare = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.prepare_and_sign(request(), c1).await }
        });
        tokio::task::yield_now().await;

        let started = Instant::now();
        assert_eq!(cache.get_valid_signed_transaction(&other_route).await, None);
        assert_eq!(Instant::now(), started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_latch_blocks_prepare() {
        let (cache, signer) = cache(MockTransactionSigner::with_delay(Duration::ZERO));
        cache.mark_execution_called();

        let result = assert_ok!(cache.prepare_and_sign(request(), swap_context(1, 1)).await);
        assert!(result.is_none());
        assert_eq!(signer.prepare_calls(), 0);
        assert_eq!(signer.sign_calls(), 0);

        cache.clear_signing_state();
        assert!(cache.execution_called());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_in_flight_attempt() {
        let (cache, signer) = cache(MockTransactionSigner::with_delay(Duration::from_secs(2)));
        let c1 = swap_context(1000, 2000);

        let prepare = tokio::spawn({
            let cache = Arc::clone(&cache);
            let c1 = c1.clone();
            async move { cache.prepare_and_sign(request(), c1).await }
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        cache.clear_signing_state();

        // cancellation is swallowed, not surfaced as an error
        assert_eq!(assert_ok!(prepare.await.unwrap()), None);
        assert!(!cache.is_signing());
        assert!(cache.last_signed().is_none());
        assert_eq!(cache.get_valid_signed_transaction(&c1).await, None);
        assert_eq!(signer.sign_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_cached_result() {
        let (cache, _) = cache(MockTransactionSigner::with_delay(Duration::ZERO));
        let c1 = swap_context(1000, 2000);

        assert_ok!(cache.prepare_and_sign(request(), c1.clone()).await);
        cache.clear_signing_state();
        assert_eq!(cache.get_valid_signed_transaction(&c1).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signer_failure_propagates_and_clears_attempt() {
        let (cache, _) = cache(MockTransactionSigner::failing("key unavailable"));
        let c1 = swap_context(1000, 2000);

        let err = cache.prepare_and_sign(request(), c1.clone()).await.unwrap_err();
        assert!(err.to_string().contains("key unavailable"));
        assert!(!cache.is_signing());
        assert_eq!(cache.get_valid_signed_transaction(&c1).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_signer_releases_attempt() {
        let (cache, signer) = cache(MockTransactionSigner::panicking());
        let c1 = swap_context(1000, 2000);

        let err = cache.prepare_and_sign(request(), c1.clone()).await.unwrap_err();
        assert!(err.to_string().contains("Signing task failed"));
        assert!(!cache.is_signing());

        // the next prepare reaches the signer instead of being dropped as in flight
        assert!(cache.prepare_and_sign(request(), c1).await.is_err());
        assert_eq!(signer.prepare_calls(), 2);
        assert!(!cache.is_signing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signer_cancellation_is_swallowed() {
        let (cache, _) = cache(MockTransactionSigner::cancelling());
        let result = assert_ok!(cache.prepare_and_sign(request(), swap_context(1, 1)).await);
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_prepare_replaces_cached_result() {
        let (cache, signer) = cache(MockTransactionSigner::with_delay(Duration::from_millis(10)));
        let c1 = swap_context(1000, 1000);
        // c2 prices better than c1, so its signature must not be reused once c1 is back
        let c2 = swap_context(1000, 2000);

        let first = assert_ok!(cache.prepare_and_sign(request(), c1.clone()).await).unwrap();
        let second = assert_ok!(
            cache
                .prepare_and_sign(request().with_value(U256::from(1)), c2.clone())
                .await
        )
        .unwrap();

        assert_ne!(first.hash, second.hash);
        assert_eq!(signer.sign_calls(), 2);
        assert_eq!(cache.get_valid_signed_transaction(&c2).await, Some(second));
        assert_eq!(cache.get_valid_signed_transaction(&c1).await, None);
    }
}
