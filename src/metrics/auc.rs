//! Area under the ROC curve via average ranks (the Mann-Whitney statistic).
//!
//! Scores are ranked once, ties sharing the mean rank of their span; the
//! probability that a random positive outranks a random negative falls out
//! of the positive rank sum. No threshold sweep, no curve construction.

use thiserror::Error;

/// Why an AUC could not be computed for a group of observations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AucError {
    #[error("only one outcome class present")]
    SingleClass,
    #[error("{0} distinct outcome classes, expected exactly 2")]
    NotBinary(usize),
}

/// Probability that a randomly chosen positive observation outranks a
/// randomly chosen negative one, ties counted half. Outcomes must hold
/// exactly two distinct values; the greater value is the positive class.
pub fn roc_auc(scores: &[f64], outcomes: &[f64]) -> Result<f64, AucError> {
    debug_assert_eq!(scores.len(), outcomes.len());

    let mut classes: Vec<f64> = Vec::with_capacity(2);
    for &outcome in outcomes {
        if !classes.iter().any(|&c| c == outcome) {
            classes.push(outcome);
        }
    }
    let positive = match classes.len() {
        0 | 1 => return Err(AucError::SingleClass),
        2 => classes[0].max(classes[1]),
        n => return Err(AucError::NotBinary(n)),
    };

    let ranks = average_ranks(scores);

    let n_pos = outcomes.iter().filter(|&&o| o == positive).count();
    let n_neg = outcomes.len() - n_pos;
    let rank_sum: f64 = outcomes
        .iter()
        .zip(&ranks)
        .filter(|(&o, _)| o == positive)
        .map(|(_, &r)| r)
        .sum();

    let u = rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Ok(u / (n_pos as f64 * n_neg as f64))
}

/// One-based ranks of `values`, tied spans sharing their mean rank.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 2) as f64 / 2.0;
        for &idx in &order[start..=end] {
            ranks[idx] = rank;
        }
        start = end + 1;
    }
    ranks
}
