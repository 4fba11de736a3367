use crate::operators::{CompareOp, MatchType};

/// Reduces a window of values per `match_type` and compares the result
/// against `target`. Returns the value to report when the condition holds.
///
/// Non-finite values are ignored. An empty window never matches.
///
/// | match type    | holds when                        | reported value        |
/// |---------------|-----------------------------------|-----------------------|
/// | at least once | any value satisfies `op`          | first satisfying value|
/// | all the times | every value satisfies `op`        | latest value          |
/// | on average    | the mean satisfies `op`           | mean                  |
/// | in total      | the sum satisfies `op`            | sum                   |
/// | last          | the latest value satisfies `op`   | latest value          |
pub fn match_window(values: &[f64], match_type: MatchType, op: CompareOp, target: f64) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }

    match match_type {
        MatchType::None => None,
        MatchType::AtLeastOnce => finite.into_iter().find(|v| op.compare(*v, target)),
        MatchType::AllTheTimes => {
            let mut latest = None;
            let all = finite.iter().all(|v| {
                latest = Some(*v);
                op.compare(*v, target)
            });
            if all {
                latest
            } else {
                None
            }
        }
        MatchType::OnAverage => {
            let avg = finite.iter().sum::<f64>() / finite.len() as f64;
            op.compare(avg, target).then_some(avg)
        }
        MatchType::InTotal => {
            let total = finite.iter().sum::<f64>();
            op.compare(total, target).then_some(total)
        }
        MatchType::Last => {
            let last = *finite.last()?;
            op.compare(last, target).then_some(last)
        }
    }
}

/// Mean and population standard deviation of the finite values, or `None`
/// with fewer than two of them.
pub fn mean_and_stddev(values: &[f64]) -> Option<(f64, f64)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return None;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}
