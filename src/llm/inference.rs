use std::cmp::Ordering;

use candle_core::Result as CandleResult;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;

use crate::llm::decoding::DecodingConfig;

/// Candidates kept per beam when sampling, mirroring the usual top-k of 50.
const SAMPLING_TOP_K: usize = 50;

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    log_prob: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    beam: usize,
    token: u32,
    score: f64,
}

#[derive(Debug)]
struct Finished {
    tokens: Vec<u32>,
    score: f64,
}

/// Beam search, or beam sampling when `config.do_sample` is set.
///
/// `step` receives the live prefixes (all of the same length, each starting with
/// `start_token`) and must return one row of next-token logits per prefix.
/// The returned sequences exclude the start token and the EOS token.
pub fn beam_search<R, F>(
    start_token: u32,
    eos_token: u32,
    config: &DecodingConfig,
    rng: &mut R,
    mut step: F,
) -> CandleResult<Vec<Vec<u32>>>
where
    R: Rng + ?Sized,
    F: FnMut(&[Vec<u32>]) -> CandleResult<Vec<Vec<f32>>>,
{
    let num_beams = config.num_beams.max(1);
    // Temperature only shapes the distribution that sampling draws from.
    let temperature = if config.do_sample {
        config.temperature
    } else {
        1.0
    };
    let pool_per_beam = if config.do_sample {
        SAMPLING_TOP_K.max(2 * num_beams)
    } else {
        2 * num_beams
    };

    let mut live = vec![Hypothesis {
        tokens: vec![start_token],
        log_prob: 0.0,
    }];
    let mut finished: Vec<Finished> = Vec::new();
    let mut done = false;

    for _ in 0..config.max_length {
        let prefixes: Vec<Vec<u32>> = live.iter().map(|h| h.tokens.clone()).collect();
        let logits = step(&prefixes)?;
        if logits.len() != live.len() {
            return Err(candle_core::Error::msg(format!(
                "expected {} logit rows, got {}",
                live.len(),
                logits.len()
            )));
        }

        let mut candidates = Vec::with_capacity(live.len() * pool_per_beam);
        for (beam, row) in logits.iter().enumerate() {
            let log_probs = log_softmax(row, temperature);
            for (token, log_prob) in top_k(&log_probs, pool_per_beam) {
                candidates.push(Candidate {
                    beam,
                    token,
                    score: live[beam].log_prob + log_prob,
                });
            }
        }

        let wanted = 2 * num_beams;
        let chosen = if config.do_sample {
            sample_without_replacement(candidates, wanted, rng)?
        } else {
            candidates.sort_by(|a, b| by_score_desc(a.score, b.score));
            candidates.truncate(wanted);
            candidates
        };

        let mut next = Vec::with_capacity(num_beams);
        for (rank, candidate) in chosen.into_iter().enumerate() {
            let parent = &live[candidate.beam];
            if candidate.token == eos_token {
                // An EOS ranked outside the beam width is not a real competitor.
                if rank < num_beams {
                    finished.push(Finished {
                        tokens: parent.tokens[1..].to_vec(),
                        score: candidate.score / parent.tokens.len() as f64,
                    });
                }
                continue;
            }
            if next.len() < num_beams {
                let mut tokens = parent.tokens.clone();
                tokens.push(candidate.token);
                next.push(Hypothesis {
                    tokens,
                    log_prob: candidate.score,
                });
            }
        }

        live = next;
        if live.is_empty() || (config.early_stopping && finished.len() >= num_beams) {
            done = true;
            break;
        }
    }

    // Out of length budget: unfinished beams compete with the finished ones.
    if !done {
        for hypothesis in live {
            let generated = hypothesis.tokens.len().saturating_sub(1).max(1);
            finished.push(Finished {
                tokens: hypothesis.tokens[1..].to_vec(),
                score: hypothesis.log_prob / generated as f64,
            });
        }
    }

    finished.sort_by(|a, b| by_score_desc(a.score, b.score));
    Ok(finished
        .into_iter()
        .take(config.num_return_sequences.max(1))
        .map(|f| f.tokens)
        .collect())
}

fn log_softmax(logits: &[f32], temperature: f64) -> Vec<f64> {
    let scaled: Vec<f64> = logits.iter().map(|&l| l as f64 / temperature).collect();
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let log_sum = scaled.iter().map(|&s| (s - max).exp()).sum::<f64>().ln() + max;
    scaled.into_iter().map(|s| s - log_sum).collect()
}

fn top_k(log_probs: &[f64], k: usize) -> Vec<(u32, f64)> {
    let mut indexed: Vec<(u32, f64)> = log_probs
        .iter()
        .enumerate()
        .filter(|(_, lp)| lp.is_finite())
        .map(|(idx, &lp)| (idx as u32, lp))
        .collect();
    indexed.sort_by(|a, b| by_score_desc(a.1, b.1));
    indexed.truncate(k);
    indexed
}

/// Draws up to `k` candidates proportionally to `exp(score)`, best score first.
fn sample_without_replacement<R: Rng + ?Sized>(
    mut pool: Vec<Candidate>,
    k: usize,
    rng: &mut R,
) -> CandleResult<Vec<Candidate>> {
    let mut picked = Vec::with_capacity(k);
    while picked.len() < k && !pool.is_empty() {
        let max = pool
            .iter()
            .map(|c| c.score)
            .fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = pool.iter().map(|c| (c.score - max).exp()).collect();
        if weights.iter().all(|&w| w <= 0.0) {
            break;
        }
        let dist = WeightedIndex::new(&weights).map_err(|e| candle_core::Error::msg(e.to_string()))?;
        picked.push(pool.swap_remove(dist.sample(rng)));
    }
    picked.sort_by(|a, b| by_score_desc(a.score, b.score));
    Ok(picked)
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::llm::decoding::Strength;

    const START: u32 = 0;
    const EOS: u32 = 1;
    const A: u32 = 2;
    const B: u32 = 3;

    /// Greedy picks `A`, but `B EOS` is the more likely complete sequence.
    fn lookahead_model(prefixes: &[Vec<u32>]) -> CandleResult<Vec<Vec<f32>>> {
        Ok(prefixes
            .iter()
            .map(|prefix| {
                let probs: [f32; 4] = match prefix.as_slice() {
                    [START] => [1e-9, 1e-9, 0.5998, 0.4],
                    [START, A] => [1e-9, 0.3, 0.35, 0.3499],
                    [START, B] => [1e-9, 0.99, 0.0049, 0.005],
                    _ => [1e-9, 0.97, 0.015, 0.0149],
                };
                probs.iter().map(|p| p.ln()).collect()
            })
            .collect())
    }

    fn never_ends(prefixes: &[Vec<u32>]) -> CandleResult<Vec<Vec<f32>>> {
        Ok(prefixes.iter().map(|_| vec![-10.0, -10.0, 5.0, 4.0]).collect())
    }

    #[test]
    fn beam_search_finds_better_complete_sequence() {
        let config = DecodingConfig::derive(Strength::from(0));
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);

        let out = beam_search(START, EOS, &config, &mut rng, lookahead_model).unwrap();

        assert_eq!(out, vec![vec![B]]);
    }

    #[test]
    fn respects_max_length() {
        let mut config = DecodingConfig::derive(Strength::from(10));
        config.max_length = 5;
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);

        let out = beam_search(START, EOS, &config, &mut rng, never_ends).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0], vec![A; 5]);
    }

    #[test]
    fn sampling_returns_one_sequence_without_special_tokens() {
        let config = DecodingConfig::derive(Strength::from(100));
        for seed in 0..20 {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let out = beam_search(START, EOS, &config, &mut rng, lookahead_model).unwrap();

            assert_eq!(out.len(), 1);
            assert!(out[0].iter().all(|&t| t == A || t == B), "seed {seed}: {:?}", out[0]);
        }
    }

    #[test]
    fn sampling_is_reproducible_with_a_seed() {
        let config = DecodingConfig::derive(Strength::from(80));
        let run = |seed| {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            beam_search(START, EOS, &config, &mut rng, lookahead_model).unwrap()
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn temperature_is_ignored_without_sampling() {
        let base = DecodingConfig::derive(Strength::from(10));
        let mut hot = base;
        hot.temperature = 50.0;
        let run = |config: &DecodingConfig| {
            let mut rng = rand::rngs::StdRng::seed_from_u64(3);
            beam_search(START, EOS, config, &mut rng, lookahead_model).unwrap()
        };

        assert_eq!(run(&base), run(&hot));
        assert_eq!(run(&hot), vec![vec![B]]);
    }

    #[test]
    fn step_errors_propagate() {
        let config = DecodingConfig::derive(Strength::default());
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);

        let result = beam_search(START, EOS, &config, &mut rng, |_| {
            Err(candle_core::Error::msg("decoder exploded"))
        });

        assert!(result.unwrap_err().to_string().contains("decoder exploded"));
    }

    #[test]
    fn mismatched_logit_rows_are_rejected() {
        let config = DecodingConfig::derive(Strength::default());
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);

        let result = beam_search(START, EOS, &config, &mut rng, |_| Ok(Vec::new()));

        assert!(result.is_err());
    }
}
