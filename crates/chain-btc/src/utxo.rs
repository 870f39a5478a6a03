use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::{estimate_fee, AddressType};
use crate::error::BtcError;

/// Outputs at or below this value cost more to spend than they are worth.
pub const DUST_THRESHOLD: u64 = 546;

/// Default cap on branch-and-bound recursive calls.
pub const DEFAULT_MAX_BNB_ITERATIONS: usize = 100_000;

/// Output count the selector prices every candidate with (payment + change).
const SELECTION_OUTPUTS: usize = 2;

/// A single unspent transaction output (UTXO).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Transaction ID as a hex string (big-endian / display order).
    pub txid: String,
    /// Output index within the transaction.
    pub vout: u32,
    /// Value in satoshis.
    pub amount_sat: u64,
    /// The locking script (scriptPubKey) serialized bytes.
    pub script_pubkey: Vec<u8>,
    /// Number of confirmations when fetched.
    #[serde(default)]
    pub confirmations: u32,
}

/// Result of UTXO selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoSelection {
    /// The selected UTXOs.
    pub selected: Vec<Utxo>,
    /// Total value of the selected UTXOs in satoshis.
    pub total_sat: u64,
    /// Fee the selection was priced with.
    pub fee_sat: u64,
}

/// Coin selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Branch-and-bound search for the selection with the least waste.
    #[default]
    Optimal,
    LargestFirst,
    SmallestFirst,
    Random,
}

/// Chooses UTXOs for a spend from addresses of one script type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtxoSelector {
    address_type: AddressType,
    max_iterations: usize,
}

impl UtxoSelector {
    pub fn new(address_type: AddressType) -> Self {
        Self {
            address_type,
            max_iterations: DEFAULT_MAX_BNB_ITERATIONS,
        }
    }

    /// Override the branch-and-bound call budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    /// Fee for `num_inputs` inputs priced with two outputs.
    pub fn fee_for(&self, num_inputs: usize, fee_rate: u64) -> Result<u64, BtcError> {
        estimate_fee(num_inputs, SELECTION_OUTPUTS, self.address_type, fee_rate)
    }

    /// Select UTXOs covering `target_sat` plus the fee of the selection itself.
    ///
    /// The fee always assumes a change output, so a spend that would fit
    /// without change can still be reported as underfunded.
    pub fn select(
        &self,
        utxos: &[Utxo],
        target_sat: u64,
        fee_rate: u64,
        strategy: SelectionStrategy,
    ) -> Result<UtxoSelection, BtcError> {
        if utxos.is_empty() {
            return Err(BtcError::NoUtxosAvailable);
        }

        let mut pool: Vec<&Utxo> = utxos.iter().collect();
        match strategy {
            SelectionStrategy::Optimal => {
                pool.sort_by(|a, b| b.amount_sat.cmp(&a.amount_sat));
                if let Some(selection) = self.branch_and_bound(&pool, target_sat, fee_rate)? {
                    return Ok(selection);
                }
                debug!(
                    target_sat,
                    fee_rate, "branch-and-bound found no selection, falling back to largest-first"
                );
            }
            SelectionStrategy::LargestFirst => {
                pool.sort_by(|a, b| b.amount_sat.cmp(&a.amount_sat));
            }
            SelectionStrategy::SmallestFirst => {
                pool.sort_by_key(|utxo| utxo.amount_sat);
            }
            SelectionStrategy::Random => {
                pool.shuffle(&mut rand::thread_rng());
            }
        }

        self.accumulate(&pool, target_sat, fee_rate)
    }

    /// Greedily take UTXOs in pool order until the target plus fee is met.
    fn accumulate(
        &self,
        pool: &[&Utxo],
        target_sat: u64,
        fee_rate: u64,
    ) -> Result<UtxoSelection, BtcError> {
        let mut selected: Vec<Utxo> = Vec::new();
        let mut total_sat: u64 = 0;
        let mut fee_sat: u64 = 0;

        for utxo in pool {
            selected.push((*utxo).clone());
            total_sat = total_sat.checked_add(utxo.amount_sat).ok_or_else(|| {
                BtcError::TransactionBuildFailed("selected UTXO value overflows u64".into())
            })?;
            // A fee or requirement past u64::MAX can never be covered.
            let priced = self
                .fee_for(selected.len(), fee_rate)
                .ok()
                .and_then(|fee| Some((fee, target_sat.checked_add(fee)?)));
            let Some((fee, required)) = priced else {
                return Err(BtcError::InsufficientFunds {
                    available: total_sat,
                    required: u64::MAX,
                });
            };
            fee_sat = fee;
            if total_sat >= required {
                return Ok(UtxoSelection {
                    selected,
                    total_sat,
                    fee_sat,
                });
            }
        }

        Err(BtcError::InsufficientFunds {
            available: total_sat,
            required: target_sat.saturating_add(fee_sat),
        })
    }

    fn branch_and_bound(
        &self,
        sorted: &[&Utxo],
        target_sat: u64,
        fee_rate: u64,
    ) -> Result<Option<UtxoSelection>, BtcError> {
        let mut remaining = vec![0i128; sorted.len() + 1];
        for i in (0..sorted.len()).rev() {
            remaining[i] = remaining[i + 1] + i128::from(sorted[i].amount_sat);
        }

        let mut search = BranchAndBound {
            selector: self,
            sorted,
            remaining: &remaining,
            target: i128::from(target_sat),
            fee_rate,
            calls: 0,
            best: None,
            exact: false,
        };
        search.explore(0, &mut Vec::new(), 0);

        if search.calls >= self.max_iterations && !search.exact {
            warn!(
                calls = search.calls,
                utxos = sorted.len(),
                "branch-and-bound hit its iteration cap"
            );
        }

        let Some((indices, _waste)) = search.best else {
            return Ok(None);
        };
        let selected: Vec<Utxo> = indices.iter().map(|&i| sorted[i].clone()).collect();
        let total_sat = sum_amounts(&selected)?;
        Ok(Some(UtxoSelection {
            fee_sat: self.fee_for(selected.len(), fee_rate)?,
            selected,
            total_sat,
        }))
    }

    /// Spend every UTXO into a single output.
    pub fn consolidate(&self, utxos: &[Utxo], fee_rate: u64) -> Result<UtxoSelection, BtcError> {
        if utxos.is_empty() {
            return Err(BtcError::NoUtxosAvailable);
        }

        let total_sat = sum_amounts(utxos)?;
        let fee_sat = estimate_fee(utxos.len(), 1, self.address_type, fee_rate).map_err(|_| {
            BtcError::InsufficientFunds {
                available: total_sat,
                required: u64::MAX,
            }
        })?;
        if total_sat <= fee_sat {
            return Err(BtcError::InsufficientFunds {
                available: total_sat,
                required: fee_sat.saturating_add(1),
            });
        }

        Ok(UtxoSelection {
            selected: utxos.to_vec(),
            total_sat,
            fee_sat,
        })
    }
}

fn sum_amounts(utxos: &[Utxo]) -> Result<u64, BtcError> {
    utxos
        .iter()
        .try_fold(0u64, |total, utxo| total.checked_add(utxo.amount_sat))
        .ok_or_else(|| BtcError::TransactionBuildFailed("selected UTXO value overflows u64".into()))
}

/// Include/exclude search over UTXOs sorted by descending value.
struct BranchAndBound<'a> {
    selector: &'a UtxoSelector,
    sorted: &'a [&'a Utxo],
    /// `remaining[i]` is the value of `sorted[i..]`.
    remaining: &'a [i128],
    target: i128,
    fee_rate: u64,
    calls: usize,
    /// Indices of the least-waste selection so far, and its waste.
    best: Option<(Vec<usize>, i128)>,
    exact: bool,
}

impl BranchAndBound<'_> {
    fn explore(&mut self, index: usize, selected: &mut Vec<usize>, accumulated: i128) {
        if self.exact || self.calls >= self.selector.max_iterations {
            return;
        }
        self.calls += 1;

        if !selected.is_empty() {
            // Every larger selection also overflows.
            let Ok(fee) = self.selector.fee_for(selected.len(), self.fee_rate) else {
                return;
            };
            let effective = accumulated - i128::from(fee);

            if let Some((_, best_waste)) = &self.best {
                if effective > self.target + best_waste {
                    return;
                }
            }

            if effective >= self.target {
                let waste = effective - self.target;
                if self.best.as_ref().map_or(true, |(_, best)| waste < *best) {
                    self.best = Some((selected.clone(), waste));
                }
                if waste == 0 {
                    self.exact = true;
                }
                return;
            }
        }

        if index == self.sorted.len() || accumulated + self.remaining[index] < self.target {
            return;
        }

        selected.push(index);
        let with = accumulated + i128::from(self.sorted[index].amount_sat);
        self.explore(index + 1, selected, with);
        selected.pop();

        self.explore(index + 1, selected, accumulated);
    }
}

/// Summary of a UTXO set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UtxoStatistics {
    pub count: usize,
    /// Saturates at `u64::MAX`.
    pub total_sat: u64,
    /// Floor of the arithmetic mean.
    pub mean_sat: u64,
    /// Middle value; mean of the two middle values (floored) for even counts.
    pub median_sat: u64,
    /// Entries worth at most [`DUST_THRESHOLD`].
    pub dust_count: usize,
}

impl UtxoStatistics {
    pub fn from_utxos(utxos: &[Utxo]) -> Self {
        if utxos.is_empty() {
            return Self::default();
        }

        let mut values: Vec<u64> = utxos.iter().map(|u| u.amount_sat).collect();
        values.sort_unstable();

        let count = values.len();
        let total: u128 = values.iter().map(|&v| u128::from(v)).sum();
        let mid = count / 2;
        let median_sat = if count % 2 == 0 {
            let (a, b) = (values[mid - 1], values[mid]);
            a / 2 + b / 2 + (a % 2 + b % 2) / 2
        } else {
            values[mid]
        };

        Self {
            count,
            total_sat: u64::try_from(total).unwrap_or(u64::MAX),
            mean_sat: u64::try_from(total / count as u128).unwrap_or(u64::MAX),
            median_sat,
            dust_count: values.iter().filter(|&&v| v <= DUST_THRESHOLD).count(),
        }
    }
}
