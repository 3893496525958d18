//! Batch planner: plans every customer in a run across a bounded worker pool.
//!
//! Customers are independent. Each worker classifies (through the shared
//! cache), evaluates the rule chain and selects channels. Results are merged
//! back into input order regardless of completion order.
//!
//! Per-customer failures become `Skipped` entries and the batch keeps going.
//! Configuration errors abort the whole run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::cache::ClassificationCache;
use crate::classify::classifier::{CachedClassifier, LetterClassifier};
use crate::config::{BatchConfig, PlannerConfig};
use crate::error::{ConfigError, Error, PlanError, Result};
use crate::model::{Channel, Customer, Letter};
use crate::planning::cost::{ChannelCost, CostScenario};
use crate::planning::rules::BusinessRuleSet;
use crate::planning::selector::ChannelSelector;
use crate::planning::types::{
    BatchEntry, BatchResult, BatchTotals, CustomerError, Savings, SkipReason,
};

/// Cooperative stop flag. Checked between customers; a customer already
/// being planned always finishes.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One customer paired with the letter they are to receive.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub customer: Customer,
    pub letter: Arc<Letter>,
}

/// Shared state handed to every worker in a run.
struct RunContext {
    rules: Arc<BusinessRuleSet>,
    selector: Arc<ChannelSelector>,
    classifier: Arc<CachedClassifier>,
    scenario: CostScenario,
}

pub struct BatchPlanner {
    rules: Arc<BusinessRuleSet>,
    selector: Arc<ChannelSelector>,
    classifier: Arc<CachedClassifier>,
    config: BatchConfig,
}

impl BatchPlanner {
    pub fn new(
        rules: BusinessRuleSet,
        selector: ChannelSelector,
        classifier: CachedClassifier,
        config: BatchConfig,
    ) -> Self {
        Self {
            rules: Arc::new(rules),
            selector: Arc::new(selector),
            classifier: Arc::new(classifier),
            config,
        }
    }

    /// Wire a planner from loaded configuration.
    pub fn from_config(
        config: &PlannerConfig,
        classifier: Arc<dyn LetterClassifier>,
        cache: Arc<ClassificationCache>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let rules = BusinessRuleSet::new(config.rules.clone())?;
        let selector = ChannelSelector::new(config.selector.clone());
        let classifier =
            CachedClassifier::new(classifier, cache, config.batch.classify_timeout());
        Ok(Self::new(rules, selector, classifier, config.batch.clone()))
    }

    pub fn classifier(&self) -> &CachedClassifier {
        &self.classifier
    }

    /// Plan one letter for every customer.
    pub async fn run(
        &self,
        customers: &[Customer],
        letter: &Letter,
        scenario: &CostScenario,
    ) -> Result<BatchResult> {
        self.run_with_stop(customers, letter, scenario, &StopSignal::new())
            .await
    }

    /// Plan one letter for every customer, honouring `stop`.
    ///
    /// The letter is classified once up front. If that fails every customer
    /// is reported as a classification failure without retrying per customer.
    pub async fn run_with_stop(
        &self,
        customers: &[Customer],
        letter: &Letter,
        scenario: &CostScenario,
        stop: &StopSignal,
    ) -> Result<BatchResult> {
        let classification = match self.classifier.classify(letter).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(
                    letter_id = %letter.id,
                    customers = customers.len(),
                    error = %e,
                    "Letter classification failed, skipping all customers"
                );
                let entries = customers
                    .iter()
                    .map(|customer| BatchEntry::Skipped {
                        error: CustomerError::from_classify_error(&customer.id, &e),
                    })
                    .collect();
                return finish(Uuid::new_v4(), scenario, entries, false, 0);
            }
        };

        let letter = Arc::new(Letter {
            classification: Some(classification),
            ..letter.clone()
        });
        let assignments = customers
            .iter()
            .map(|customer| Assignment {
                customer: customer.clone(),
                letter: Arc::clone(&letter),
            })
            .collect();
        self.run_assignments(assignments, scenario, stop).await
    }

    /// Plan a batch where each customer may receive a different letter.
    pub async fn run_assignments(
        &self,
        assignments: Vec<Assignment>,
        scenario: &CostScenario,
        stop: &StopSignal,
    ) -> Result<BatchResult> {
        let run_id = Uuid::new_v4();
        let total = assignments.len();
        let concurrency = self.config.concurrency.max(1);
        info!(
            %run_id,
            customers = total,
            scenario = scenario.name(),
            concurrency,
            "Starting batch run"
        );

        let ctx = Arc::new(RunContext {
            rules: Arc::clone(&self.rules),
            selector: Arc::clone(&self.selector),
            classifier: Arc::clone(&self.classifier),
            scenario: scenario.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        let mut dispatched = 0usize;
        let mut truncated = false;

        for (index, assignment) in assignments.into_iter().enumerate() {
            if stop.is_stopped() {
                truncated = true;
                break;
            }
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::Worker(format!("worker pool closed: {e}")))?;
            // The stop may have arrived while waiting for a free worker.
            if stop.is_stopped() {
                truncated = true;
                break;
            }

            let ctx = Arc::clone(&ctx);
            tasks.spawn(async move {
                let _permit = permit;
                (index, plan_customer(&ctx, assignment).await)
            });
            dispatched += 1;
        }

        let mut slots: Vec<Option<BatchEntry>> = (0..dispatched).map(|_| None).collect();
        let mut fatal: Option<PlanError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(entry))) => slots[index] = Some(entry),
                Ok((_, Err(e))) => {
                    warn!(%run_id, error = %e, "Fatal planning error, aborting batch");
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                    tasks.abort_all();
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    tasks.abort_all();
                    return Err(Error::Worker(format!("planning task failed: {e}")));
                }
            }
        }
        if let Some(e) = fatal {
            return Err(e.into());
        }

        let entries: Vec<BatchEntry> = slots.into_iter().flatten().collect();
        let unprocessed = total - dispatched;
        if truncated {
            warn!(
                %run_id,
                processed = entries.len(),
                unprocessed,
                "Batch stopped before completion"
            );
        }
        finish(run_id, scenario, entries, truncated, unprocessed)
    }
}

/// Plan one customer. `Err` is reserved for errors that must abort the run.
async fn plan_customer(
    ctx: &RunContext,
    assignment: Assignment,
) -> std::result::Result<BatchEntry, PlanError> {
    let Assignment { customer, letter } = assignment;

    let classification = match ctx.classifier.classify(&letter).await {
        Ok(classification) => classification,
        Err(e) => {
            warn!(customer_id = %customer.id, error = %e, "Classification failed");
            return Ok(BatchEntry::Skipped {
                error: CustomerError::from_classify_error(&customer.id, &e),
            });
        }
    };

    let outcome = ctx
        .rules
        .evaluate(&customer, classification.category)
        .and_then(|constraint| {
            ctx.selector.select(
                &customer,
                classification.category,
                constraint,
                &ctx.scenario,
            )
        });

    match outcome {
        Ok(plan) => {
            debug!(
                customer_id = %customer.id,
                channels = ?plan.channels,
                cost = %plan.total.monetary,
                "Customer planned"
            );
            Ok(BatchEntry::Planned {
                plan,
                classification,
            })
        }
        Err(e) => match CustomerError::from_plan_error(&customer.id, &e) {
            Some(error) => {
                warn!(customer_id = %customer.id, error = %e, "Customer skipped");
                Ok(BatchEntry::Skipped { error })
            }
            None => Err(e),
        },
    }
}

fn finish(
    run_id: Uuid,
    scenario: &CostScenario,
    entries: Vec<BatchEntry>,
    truncated: bool,
    unprocessed: usize,
) -> Result<BatchResult> {
    let totals = totals(&entries, scenario)?;
    info!(
        %run_id,
        planned = totals.planned,
        skipped_constraint = totals.skipped_constraint,
        skipped_classification = totals.skipped_classification,
        degraded = totals.degraded,
        actual = %totals.actual.monetary,
        baseline = %totals.baseline.monetary,
        savings_pct = %totals.savings.monetary_pct,
        "Batch run complete"
    );
    Ok(BatchResult {
        run_id,
        scenario: scenario.name().to_string(),
        generated_at: Utc::now(),
        entries,
        totals,
        truncated,
        unprocessed,
    })
}

/// Baseline is Letter-only for every processed customer, failed ones
/// included, so savings never count a skipped customer as free.
fn totals(entries: &[BatchEntry], scenario: &CostScenario) -> Result<BatchTotals> {
    let letter = scenario.cost(Channel::Letter)?;
    let baseline = letter.times(entries.len());

    let mut totals = BatchTotals {
        baseline,
        ..BatchTotals::default()
    };
    let mut actual = ChannelCost::ZERO;
    for entry in entries {
        match entry {
            BatchEntry::Planned { plan, .. } => {
                actual = actual + plan.total;
                totals.planned += 1;
                if plan.degraded {
                    totals.degraded += 1;
                }
            }
            BatchEntry::Skipped { error } => match error.reason {
                SkipReason::ConstraintConflict => totals.skipped_constraint += 1,
                SkipReason::ClassificationFailure => totals.skipped_classification += 1,
            },
        }
    }
    totals.actual = actual;
    totals.savings = Savings::between(baseline, actual);
    Ok(totals)
}
