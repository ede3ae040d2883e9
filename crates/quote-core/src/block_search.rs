//! Block-formation constraint search used to pick N mutually coherent price
//! sources from one shopping result set (spec.md §4.1.1).
//!
//! A "block" is a maximal run of price-sorted candidates within `1+epsilon`
//! of its cheapest member. The search ranks eligible blocks, probes every
//! untried candidate in the current best one, and escalates epsilon when no
//! block can reach the target count. All working state lives in
//! `BlockSearchScratch` and is threaded explicitly rather than captured in a
//! closure (spec.md §9 "explicit sets, not captured closures").

use quote_types::checkpoint::{BlockHistoryEntry, BlockSearchScratch};
use quote_types::ShoppingCandidate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cmp::Reverse;
use std::collections::HashSet;

/// Escalation increment applied each time no eligible block exists
/// (spec.md §4.1.1 "escalation").
pub const ESCALATION_STEP: Decimal = dec!(0.05);

/// Maximum number of escalations before the search gives up and settles for
/// its best-effort block (spec.md §4.1.1 "termination").
pub const MAX_ESCALATIONS: u8 = 5;

/// Defensive bound on probing rounds, in case a future change to the
/// selection rules ever produces a non-terminating cycle. Not part of the
/// spec; sized generously against any realistic candidate pool.
fn round_budget(candidate_count: usize) -> usize {
	candidate_count.saturating_mul(4) + 32
}

/// A maximal contiguous run of price-sorted candidates, identified by the
/// half-open... actually inclusive `[start, end]` index range into the
/// caller's candidate slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
	pub start: usize,
	pub end: usize,
	pub min_price: Decimal,
}

impl Block {
	pub fn size(&self) -> usize {
		self.end - self.start + 1
	}

	fn contains(&self, idx: usize) -> bool {
		idx >= self.start && idx <= self.end
	}
}

fn key_at(candidates: &[ShoppingCandidate], idx: usize) -> String {
	candidates[idx].key()
}

/// Forms every maximal block at the given epsilon. `candidates` must already
/// be sorted ascending by `extracted_price`; candidates with no price are
/// skipped (spec.md §4.1.1 "price field missing ... ignored before block
/// formation" — the caller, `quote_shopping::filter_candidates`, already
/// drops those).
pub fn form_blocks(candidates: &[ShoppingCandidate], epsilon: Decimal) -> Vec<Block> {
	let mut blocks = Vec::new();
	for i in 0..candidates.len() {
		let Some(price_i) = candidates[i].extracted_price else {
			continue;
		};
		let limit = price_i * (Decimal::ONE + epsilon);
		let mut j = i;
		while j + 1 < candidates.len() {
			match candidates[j + 1].extracted_price {
				Some(p) if p <= limit => j += 1,
				_ => break,
			}
		}
		blocks.push(Block {
			start: i,
			end: j,
			min_price: price_i,
		});
	}
	blocks
}

/// `(valid_in_block, untried_in_block, failed_in_block)`.
fn block_counts(block: &Block, candidates: &[ShoppingCandidate], scratch: &BlockSearchScratch) -> (usize, usize, usize) {
	let mut valid = 0;
	let mut untried = 0;
	let mut failed = 0;
	for idx in block.start..=block.end {
		let k = key_at(candidates, idx);
		if scratch.validated_keys.contains(&k) {
			valid += 1;
		} else if scratch.failed_keys.contains(&k) {
			failed += 1;
		} else {
			untried += 1;
		}
	}
	(valid, untried, failed)
}

fn potential(block: &Block, candidates: &[ShoppingCandidate], scratch: &BlockSearchScratch) -> usize {
	let (valid, untried, _) = block_counts(block, candidates, scratch);
	valid + untried
}

/// Filters blocks whose potential can't reach `n`, then ranks the rest.
/// Primary key: largest block, cheapest start (spec.md §4.1.1 "ranking").
/// Within a tie, prefers the block already holding the most validated and
/// untried candidates, folding in the finer re-ranking tie-break the
/// original applies after partial validation (spec.md §10).
pub fn rank_blocks(blocks: &[Block], candidates: &[ShoppingCandidate], scratch: &BlockSearchScratch, n: usize) -> Vec<Block> {
	let mut eligible: Vec<Block> = blocks.iter().filter(|b| potential(b, candidates, scratch) >= n).cloned().collect();
	eligible.sort_by_key(|b| {
		let (valid, untried, _) = block_counts(b, candidates, scratch);
		(Reverse(b.size()), Reverse(valid), Reverse(untried), b.min_price)
	});
	eligible
}

/// One probe's verdict for a single candidate, decoupled from the actual
/// network/browser call so the search loop stays independently testable.
pub enum ProbeOutcome {
	Accepted,
	Rejected,
}

#[async_trait::async_trait]
pub trait CandidateProber: Send + Sync {
	async fn probe(&self, candidate: &ShoppingCandidate) -> ProbeOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSearchOutcome {
	/// A block reached the target count.
	Success,
	/// The search exhausted its escalation budget with a partial block.
	BestEffort,
	/// Nothing validated at all.
	Empty,
	/// The caller's heartbeat reported the request was cancelled mid-search.
	Cancelled,
}

pub struct BlockSearchResult {
	pub accepted_indices: Vec<usize>,
	pub scratch: BlockSearchScratch,
	pub outcome: BlockSearchOutcome,
}

fn accepted_indices_in(block: &Block, candidates: &[ShoppingCandidate], validated: &HashSet<String>) -> Vec<usize> {
	(block.start..=block.end).filter(|&i| validated.contains(&key_at(candidates, i))).collect()
}

/// Drives the block search to completion: forms blocks, picks the best one,
/// probes its untried candidates one at a time until `n` are validated,
/// escalates epsilon on exhaustion, and applies the reserve/alternative
/// tie-break when the current best block
/// already holds every validated candidate but runs out of untried ones
/// without reaching `n` (spec.md §4.1.1 "tie-break subtlety").
///
/// `heartbeat` is awaited before every probe so the caller can refresh a
/// claim lease; it returns `false` the moment it observes the request was
/// cancelled, and the search bails out on that very candidate rather than
/// finishing the block (spec.md §5 "checks for cancellation at every
/// checkpoint and every candidate iteration").
pub async fn run<P, F, Fut>(
	candidates: &[ShoppingCandidate],
	n: usize,
	epsilon0: Decimal,
	prober: &P,
	mut scratch: BlockSearchScratch,
	mut heartbeat: F,
) -> BlockSearchResult
where
	P: CandidateProber,
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = bool>,
{
	if candidates.is_empty() || n == 0 {
		return BlockSearchResult {
			accepted_indices: vec![],
			scratch,
			outcome: BlockSearchOutcome::Empty,
		};
	}

	let mut epsilon = if scratch.current_epsilon > Decimal::ZERO {
		scratch.current_epsilon
	} else {
		scratch.current_epsilon = epsilon0;
		epsilon0
	};

	let mut best_block: Option<Block> = None;
	let mut best_valid_count = 0usize;
	let budget = round_budget(candidates.len());

	for _round in 0..budget {
		let blocks = form_blocks(candidates, epsilon);
		let ranked = rank_blocks(&blocks, candidates, &scratch, n);

		let Some(chosen) = ranked.into_iter().next() else {
			if scratch.tolerance_increases >= MAX_ESCALATIONS {
				break;
			}
			scratch.tolerance_increases += 1;
			epsilon += ESCALATION_STEP;
			scratch.current_epsilon = epsilon;
			continue;
		};

		for idx in chosen.start..=chosen.end {
			let k = key_at(candidates, idx);
			if scratch.validated_keys.contains(&k) || scratch.failed_keys.contains(&k) {
				continue;
			}
			if !heartbeat().await {
				return BlockSearchResult {
					accepted_indices: vec![],
					scratch,
					outcome: BlockSearchOutcome::Cancelled,
				};
			}
			match prober.probe(&candidates[idx]).await {
				ProbeOutcome::Accepted => {
					scratch.validated_keys.insert(k);
					let (valid_so_far, _, _) = block_counts(&chosen, candidates, &scratch);
					if valid_so_far >= n {
						break;
					}
				}
				ProbeOutcome::Rejected => {
					scratch.failed_keys.insert(k);
				}
			}
		}

		let (valid_now, _, _) = block_counts(&chosen, candidates, &scratch);
		scratch.block_history.push(BlockHistoryEntry {
			block_min_price: chosen.min_price,
			block_size: chosen.size(),
			valid_count: valid_now,
			epsilon,
		});

		if valid_now > best_valid_count {
			best_valid_count = valid_now;
			best_block = Some(chosen.clone());
		}

		if valid_now >= n {
			best_block = Some(chosen);
			best_valid_count = valid_now;
			break;
		}

		let contains_all_validated = !scratch.validated_keys.is_empty()
			&& scratch
				.validated_keys
				.iter()
				.all(|k| (chosen.start..=chosen.end).any(|i| key_at(candidates, i) == *k));

		if contains_all_validated && !scratch.reserve_attempted {
			scratch.reserve_attempted = true;
			scratch.reserve_validated_keys = Some(scratch.validated_keys.clone());
			let saved_validated = scratch.validated_keys.clone();
			scratch.validated_keys.clear();

			let alt_blocks: Vec<Block> = blocks.iter().filter(|b| !(b.start == chosen.start && b.end == chosen.end)).cloned().collect();
			let alt_ranked = rank_blocks(&alt_blocks, candidates, &scratch, n);

			let mut alternative_succeeded = false;
			if let Some(alt) = alt_ranked.into_iter().next() {
				let mut alt_failed = false;
				for idx in alt.start..=alt.end {
					let k = key_at(candidates, idx);
					if scratch.validated_keys.contains(&k) || scratch.failed_keys.contains(&k) {
						continue;
					}
					if !heartbeat().await {
						scratch.validated_keys.extend(saved_validated);
						return BlockSearchResult {
							accepted_indices: vec![],
							scratch,
							outcome: BlockSearchOutcome::Cancelled,
						};
					}
					match prober.probe(&candidates[idx]).await {
						ProbeOutcome::Accepted => {
							scratch.validated_keys.insert(k);
							let (alt_valid_so_far, _, _) = block_counts(&alt, candidates, &scratch);
							if alt_valid_so_far >= n {
								break;
							}
						}
						ProbeOutcome::Rejected => {
							scratch.failed_keys.insert(k);
							alt_failed = true;
						}
					}
				}
				let (alt_valid, _, _) = block_counts(&alt, candidates, &scratch);
				if !alt_failed && alt_valid >= n {
					best_block = Some(alt);
					best_valid_count = alt_valid;
					alternative_succeeded = true;
				}
			}

			if !alternative_succeeded {
				scratch.validated_keys = saved_validated;
			} else {
				break;
			}
		}

		let still_eligible = rank_blocks(&blocks, candidates, &scratch, n);
		if still_eligible.is_empty() {
			if scratch.tolerance_increases >= MAX_ESCALATIONS {
				break;
			}
			scratch.tolerance_increases += 1;
			epsilon += ESCALATION_STEP;
			scratch.current_epsilon = epsilon;
		}
	}

	match best_block {
		Some(block) if best_valid_count >= n => {
			let accepted_indices = accepted_indices_in(&block, candidates, &scratch.validated_keys);
			BlockSearchResult {
				accepted_indices,
				scratch,
				outcome: BlockSearchOutcome::Success,
			}
		}
		Some(block) if best_valid_count > 0 => {
			let accepted_indices = accepted_indices_in(&block, candidates, &scratch.validated_keys);
			BlockSearchResult {
				accepted_indices,
				scratch,
				outcome: BlockSearchOutcome::BestEffort,
			}
		}
		_ => BlockSearchResult {
			accepted_indices: vec![],
			scratch,
			outcome: BlockSearchOutcome::Empty,
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn candidate(title: &str, price: Decimal) -> ShoppingCandidate {
		ShoppingCandidate {
			title: title.to_string(),
			price_text: Some(format!("R$ {price}")),
			extracted_price: Some(price),
			source: Some("loja".to_string()),
			immersive_link: None,
			product_link: Some(format!("https://loja.example/{title}")),
			link: None,
		}
	}

	fn sorted_candidates(prices: &[(&str, i64)]) -> Vec<ShoppingCandidate> {
		prices.iter().map(|(title, p)| candidate(title, Decimal::from(*p))).collect()
	}

	struct TableProber {
		verdicts: HashMap<String, bool>,
	}

	#[async_trait::async_trait]
	impl CandidateProber for TableProber {
		async fn probe(&self, candidate: &ShoppingCandidate) -> ProbeOutcome {
			match self.verdicts.get(&candidate.title) {
				Some(true) | None => ProbeOutcome::Accepted,
				Some(false) => ProbeOutcome::Rejected,
			}
		}
	}

	fn accept_all() -> TableProber {
		TableProber { verdicts: HashMap::new() }
	}

	#[tokio::test]
	async fn s1_trivial_three_source_win() {
		// spec.md §8 S1: prices {100,102,104,110,125,130,140,150,160,170}, N=3, eps0=0.25
		let candidates = sorted_candidates(&[
			("a", 100),
			("b", 102),
			("c", 104),
			("d", 110),
			("e", 125),
			("f", 130),
			("g", 140),
			("h", 150),
			("i", 160),
			("j", 170),
		]);
		let prober = accept_all();
		let scratch = BlockSearchScratch::new(dec!(0.25));
		let result = run(&candidates, 3, dec!(0.25), &prober, scratch, || async { true }).await;

		assert_eq!(result.outcome, BlockSearchOutcome::Success);
		// first maximal block at eps=0.25 starting at 100 reaches up to 125 (100*1.25=125)
		let accepted_prices: Vec<Decimal> = result.accepted_indices.iter().map(|&i| candidates[i].extracted_price.unwrap()).collect();
		assert!(accepted_prices.iter().all(|p| *p <= dec!(125)));
		assert_eq!(result.accepted_indices.len(), 3);
	}

	#[tokio::test]
	async fn s2_escalation_required() {
		// spec.md §8 S2: prices {100,150,200,220,225}, N=3, eps0=0.25
		let candidates = sorted_candidates(&[("a", 100), ("b", 150), ("c", 200), ("d", 220), ("e", 225)]);
		let prober = accept_all();
		let scratch = BlockSearchScratch::new(dec!(0.25));
		let result = run(&candidates, 3, dec!(0.25), &prober, scratch, || async { true }).await;

		assert_eq!(result.outcome, BlockSearchOutcome::Success);
		assert!(result.scratch.tolerance_increases >= 1);
		let prices: Vec<Decimal> = result.accepted_indices.iter().map(|&i| candidates[i].extracted_price.unwrap()).collect();
		let min = *prices.iter().min().unwrap();
		let max = *prices.iter().max().unwrap();
		assert!((max / min - Decimal::ONE) <= dec!(0.25) + Decimal::from(5) * ESCALATION_STEP);
	}

	#[tokio::test]
	async fn s3_price_mismatch_discards_one_candidate() {
		// spec.md §8 S3: A/C/D accepted, B rejected (price mismatch upstream).
		let candidates = sorted_candidates(&[("a", 100), ("b", 102), ("c", 104), ("d", 110)]);
		let mut verdicts = HashMap::new();
		verdicts.insert("b".to_string(), false);
		let prober = TableProber { verdicts };
		let scratch = BlockSearchScratch::new(dec!(0.25));
		let result = run(&candidates, 3, dec!(0.25), &prober, scratch, || async { true }).await;

		assert_eq!(result.outcome, BlockSearchOutcome::Success);
		let titles: Vec<&str> = result.accepted_indices.iter().map(|&i| candidates[i].title.as_str()).collect();
		assert!(titles.contains(&"a"));
		assert!(titles.contains(&"c"));
		assert!(titles.contains(&"d"));
		assert!(!titles.contains(&"b"));
		assert!(result.scratch.failed_keys.contains(&candidates[1].key()));
	}

	#[tokio::test]
	async fn single_candidate_pool_with_n_one_succeeds() {
		let candidates = sorted_candidates(&[("only", 100)]);
		let prober = accept_all();
		let scratch = BlockSearchScratch::new(dec!(0.25));
		let result = run(&candidates, 1, dec!(0.25), &prober, scratch, || async { true }).await;
		assert_eq!(result.outcome, BlockSearchOutcome::Success);
		assert_eq!(result.accepted_indices.len(), 1);
	}

	#[tokio::test]
	async fn identical_prices_form_one_whole_pool_block() {
		let candidates = sorted_candidates(&[("a", 100), ("b", 100), ("c", 100)]);
		let prober = accept_all();
		let scratch = BlockSearchScratch::new(dec!(0.25));
		let result = run(&candidates, 3, dec!(0.25), &prober, scratch, || async { true }).await;
		assert_eq!(result.outcome, BlockSearchOutcome::Success);
		assert_eq!(result.accepted_indices.len(), 3);
	}

	#[tokio::test]
	async fn empty_pool_is_empty_outcome() {
		let candidates: Vec<ShoppingCandidate> = vec![];
		let prober = accept_all();
		let scratch = BlockSearchScratch::new(dec!(0.25));
		let result = run(&candidates, 3, dec!(0.25), &prober, scratch, || async { true }).await;
		assert_eq!(result.outcome, BlockSearchOutcome::Empty);
	}

	#[tokio::test]
	async fn exhausted_pool_below_target_is_best_effort() {
		// Every candidate rejected; only 0 survive, so outcome is Empty rather
		// than BestEffort (best_valid_count stays 0).
		let candidates = sorted_candidates(&[("a", 100), ("b", 102)]);
		let mut verdicts = HashMap::new();
		verdicts.insert("a".to_string(), false);
		verdicts.insert("b".to_string(), false);
		let prober = TableProber { verdicts };
		let scratch = BlockSearchScratch::new(dec!(0.25));
		let result = run(&candidates, 3, dec!(0.25), &prober, scratch, || async { true }).await;
		assert_eq!(result.outcome, BlockSearchOutcome::Empty);
	}

	/// S6: a cancellation observed mid-search stops probing on the very next
	/// candidate iteration rather than finishing the block.
	#[tokio::test]
	async fn heartbeat_reporting_cancelled_bails_out_immediately() {
		let candidates = sorted_candidates(&[("a", 100), ("b", 102), ("c", 104), ("d", 110), ("e", 125)]);
		let prober = accept_all();
		let scratch = BlockSearchScratch::new(dec!(0.25));
		let mut calls = 0;
		let result = run(&candidates, 3, dec!(0.25), &prober, scratch, move || {
			calls += 1;
			let still_live = calls < 2;
			async move { still_live }
		})
		.await;

		assert_eq!(result.outcome, BlockSearchOutcome::Cancelled);
		assert!(result.accepted_indices.is_empty());
		assert_eq!(result.scratch.validated_keys.len(), 1);
	}

	#[test]
	fn form_blocks_skips_missing_price() {
		let mut candidates = sorted_candidates(&[("a", 100), ("c", 104)]);
		candidates.insert(
			1,
			ShoppingCandidate {
				title: "no-price".to_string(),
				price_text: None,
				extracted_price: None,
				source: None,
				immersive_link: None,
				product_link: None,
				link: None,
			},
		);
		let blocks = form_blocks(&candidates, dec!(0.25));
		// the no-price candidate at index 1 never starts a block
		assert!(blocks.iter().all(|b| b.start != 1));
	}
}
