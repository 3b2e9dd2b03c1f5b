//! Use-case layer
//!
//! `LoyaltyService` is the single entry point the HTTP handlers and the
//! reconciliation worker share. Every balance mutation in the system goes
//! through one of two shapes here: a plain transactional unit (register) or
//! an optimistic-retried transactional unit (withdraw, accrual credit).
//!
//! The optimistic loop and the storage retry are distinct: the storage
//! retry restarts a transaction the server aborted (deadlock, lost
//! connection), while the optimistic loop restarts the whole use case so
//! it re-reads the balance row a concurrent writer just bumped.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use rust_decimal::Decimal;

use crate::accrual::{AccrualApi, AccrualOrder, RemoteStatus};
use crate::auth::PasswordHasher;
use crate::db::balances::BalanceRepository;
use crate::db::orders::OrderRepository;
use crate::db::users::UserRepository;
use crate::db::withdrawals::WithdrawalRepository;
use crate::db::Transactor;
use crate::domain::{BalanceAccount, Clock, Order, OrderStatus, User, Withdrawal};
use crate::error::AppError;
use crate::luhn;

/// Knobs for the optimistic loops and the reconciliation pass.
#[derive(Debug, Clone, Copy)]
pub struct ServiceTuning {
    /// Extra attempts after an optimistic conflict (withdraw, accrual credit).
    pub optimistic_retries: u32,
    /// Upper bound on pending orders fetched per reconciliation pass.
    pub batch_size: i64,
    /// Concurrent accrual lookups within one pass.
    pub max_workers: usize,
}

impl Default for ServiceTuning {
    fn default() -> Self {
        Self {
            optimistic_retries: 3,
            batch_size: 100,
            max_workers: 5,
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug)]
pub struct PassOutcome {
    /// Orders whose state advanced this pass.
    pub processed: usize,
    /// Rate-limit or transport failure that ended the pass early.
    pub error: Option<AppError>,
}

pub struct LoyaltyService {
    transactor: Arc<Transactor>,
    users: UserRepository,
    orders: OrderRepository,
    balances: BalanceRepository,
    withdrawals: WithdrawalRepository,
    accrual: Arc<dyn AccrualApi>,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
    tuning: ServiceTuning,
}

impl LoyaltyService {
    pub fn new(
        transactor: Arc<Transactor>,
        accrual: Arc<dyn AccrualApi>,
        hasher: PasswordHasher,
        clock: Arc<dyn Clock>,
        tuning: ServiceTuning,
    ) -> Self {
        Self {
            users: UserRepository::new(transactor.clone()),
            orders: OrderRepository::new(transactor.clone()),
            balances: BalanceRepository::new(transactor.clone()),
            withdrawals: WithdrawalRepository::new(transactor.clone()),
            transactor,
            accrual,
            hasher,
            clock,
            tuning,
        }
    }

    /// Creates a user with a zero balance account in one transaction and
    /// returns the new user id. A taken login fails with
    /// [`AppError::AlreadyExists`].
    pub async fn register(&self, login: &str, password: &str) -> Result<i64, AppError> {
        match self.users.find_by_login(&self.transactor.handle(), login).await {
            Ok(_) => return Err(AppError::AlreadyExists),
            Err(AppError::NotFound) => {}
            Err(err) => return Err(err),
        }

        let hash = self.hasher.hash(password).await?;
        let now = self.clock.now();

        let hash = &hash;
        let user_id = self
            .transactor
            .run_in_transaction(move |db| async move {
                let mut user = User::new(login.to_string(), hash.clone(), now);
                self.users.create(&db, &mut user).await?;
                self.balances
                    .create(&db, &BalanceAccount::new(user.id, now))
                    .await?;
                Ok(user.id)
            })
            .await?;

        tracing::info!(user_id, "user registered");
        Ok(user_id)
    }

    /// Checks credentials and returns the user id, or
    /// [`AppError::InvalidCredentials`]. A missing login and a wrong
    /// password are indistinguishable to the caller.
    pub async fn login(&self, login: &str, password: &str) -> Result<i64, AppError> {
        let user = match self.users.find_by_login(&self.transactor.handle(), login).await {
            Ok(user) => user,
            Err(AppError::NotFound) => return Err(AppError::InvalidCredentials),
            Err(err) => return Err(err),
        };

        if !self.hasher.verify(password, &user.password_hash).await {
            return Err(AppError::InvalidCredentials);
        }

        Ok(user.id)
    }

    /// Accepts an order number for accrual calculation.
    ///
    /// Errors: [`AppError::InvalidOrderNumber`] on a failed Luhn check,
    /// [`AppError::AlreadyExists`] when this user already uploaded the
    /// number, [`AppError::Conflict`] when another user owns it.
    pub async fn upload_order(&self, user_id: i64, number: &str) -> Result<(), AppError> {
        if !luhn::valid(number) {
            return Err(AppError::InvalidOrderNumber);
        }

        let db = self.transactor.handle();
        match self.orders.find_by_number(&db, number).await {
            Ok(existing) if existing.user_id == user_id => Err(AppError::AlreadyExists),
            Ok(_) => Err(AppError::Conflict),
            Err(AppError::NotFound) => {
                let order = Order::new(number.to_string(), user_id, self.clock.now());
                self.orders.create(&db, &order).await
            }
            Err(err) => Err(err),
        }
    }

    pub async fn list_orders(&self, user_id: i64) -> Result<Vec<Order>, AppError> {
        self.orders
            .list_by_user_id(&self.transactor.handle(), user_id)
            .await
    }

    pub async fn get_balance(&self, user_id: i64) -> Result<BalanceAccount, AppError> {
        self.balances
            .find_by_user_id(&self.transactor.handle(), user_id)
            .await
    }

    pub async fn list_withdrawals(&self, user_id: i64) -> Result<Vec<Withdrawal>, AppError> {
        self.withdrawals
            .list_by_user_id(&self.transactor.handle(), user_id)
            .await
    }

    /// Spends `sum` points against `number`. The debit and the withdrawal
    /// record commit atomically; a version conflict on the balance row
    /// restarts the whole unit with a fresh read.
    ///
    /// Errors: [`AppError::InvalidOrderNumber`],
    /// [`AppError::InsufficientBalance`].
    pub async fn withdraw(&self, user_id: i64, number: &str, sum: Decimal) -> Result<(), AppError> {
        if !luhn::valid(number) {
            return Err(AppError::InvalidOrderNumber);
        }

        with_optimistic_retry(self.tuning.optimistic_retries, || {
            self.transactor.run_in_transaction(move |db| async move {
                let mut acc = self.balances.find_by_user_id(&db, user_id).await?;
                let now = self.clock.now();
                acc.withdraw(sum, now)?;

                let withdrawal = Withdrawal {
                    user_id,
                    order_number: number.to_string(),
                    amount: sum,
                    processed_at: now,
                };
                self.withdrawals.create(&db, &withdrawal).await?;

                self.balances.update(&db, &mut acc).await
            })
        })
        .await
    }

    /// Applies one accrual reply to its order, per the calculator's
    /// reported state. Only PROCESSED with a present amount touches the
    /// balance, and that credit commits atomically with the order update.
    ///
    /// The accrual lookup already happened; no external call is made while
    /// a transaction is open.
    pub async fn apply_accrual(&self, mut order: Order, reply: &AccrualOrder) -> Result<(), AppError> {
        let now = self.clock.now();

        match reply.status {
            RemoteStatus::Registered | RemoteStatus::Processing => {
                order.mark_processing();
                self.orders.update(&self.transactor.handle(), &order).await
            }
            RemoteStatus::Invalid => {
                order.mark_invalid(now);
                self.orders.update(&self.transactor.handle(), &order).await
            }
            RemoteStatus::Processed => {
                order.mark_processed(reply.accrual.unwrap_or(Decimal::ZERO), now);
                let order = &order;
                let credit = reply.accrual;

                with_optimistic_retry(self.tuning.optimistic_retries, || {
                    self.transactor.run_in_transaction(move |db| async move {
                        self.orders.update(&db, order).await?;

                        let Some(amount) = credit else {
                            return Ok(());
                        };
                        let mut acc = self.balances.find_by_user_id(&db, order.user_id).await?;
                        acc.credit(amount, now);
                        self.balances.update(&db, &mut acc).await
                    })
                })
                .await
            }
            RemoteStatus::Unknown => {
                tracing::warn!(order = %order.number, "unknown accrual status, leaving order untouched");
                Ok(())
            }
        }
    }

    /// One reconciliation pass: stream pending orders oldest first, look
    /// each up with bounded concurrency, apply the outcomes. A rate-limit
    /// reply or a stream failure ends the pass early; per-order failures
    /// are logged and skipped.
    pub async fn run_accrual_pass(&self) -> PassOutcome {
        let pending = [OrderStatus::New, OrderStatus::Processing];
        let mut outcomes = self
            .orders
            .stream_by_statuses(&pending, self.tuning.batch_size)
            .map(|next| async move {
                match next {
                    Ok(order) => self.process_order(order).await,
                    Err(err) => Err(err),
                }
            })
            .buffer_unordered(self.tuning.max_workers.max(1));

        let mut processed = 0usize;
        let mut error = None;

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(err) => {
                    error = Some(err);
                    break;
                }
            }
        }

        PassOutcome { processed, error }
    }

    /// Looks one order up and routes the outcome. `Ok(true)` when the
    /// order's state advanced; rate limits propagate to abort the pass,
    /// everything else is skipped until the next pass.
    async fn process_order(&self, order: Order) -> Result<bool, AppError> {
        let number = order.number.clone();
        match self.try_process(order).await {
            Ok(advanced) => Ok(advanced),
            Err(err @ AppError::RateLimited { .. }) => Err(err),
            Err(err) => {
                tracing::warn!(order = %number, error = %err, "order accrual sync failed, will retry next pass");
                Ok(false)
            }
        }
    }

    async fn try_process(&self, order: Order) -> Result<bool, AppError> {
        let Some(reply) = self.accrual.order_accrual(&order.number).await? else {
            // not registered with the calculator yet; stays pending
            return Ok(false);
        };

        if reply.status == RemoteStatus::Unknown {
            tracing::warn!(order = %order.number, "unknown accrual status, leaving order untouched");
            return Ok(false);
        }

        self.apply_accrual(order, &reply).await?;
        Ok(true)
    }
}

/// Re-runs `f` (including its reads) while it fails with an optimistic
/// lock conflict, up to `max_retries` extra attempts.
pub async fn with_optimistic_retry<T, F, Fut>(max_retries: u32, f: F) -> Result<T, AppError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Err(AppError::OptimisticLock) if attempt < max_retries => {
                attempt += 1;
                tracing::debug!(attempt, "optimistic conflict, re-reading");
            }
            other => return other,
        }
    }
}
