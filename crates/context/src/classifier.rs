use crate::task::TaskType;
use once_cell::sync::Lazy;
use regex::Regex;

struct WeightedPattern {
    regex: Regex,
    weight: u32,
}

/// Case-insensitive patterns; one that fails to compile is logged and left out
fn patterns(table: &[(&str, u32)]) -> Vec<WeightedPattern> {
    table
        .iter()
        .filter_map(|(pattern, weight)| match Regex::new(&format!("(?i){pattern}")) {
            Ok(regex) => Some(WeightedPattern {
                regex,
                weight: *weight,
            }),
            Err(err) => {
                log::error!("Dropping task pattern {pattern:?}: {err}");
                None
            }
        })
        .collect()
}

static TASK_PATTERNS: Lazy<Vec<(TaskType, Vec<WeightedPattern>)>> = Lazy::new(|| {
    vec![
        (
            TaskType::Explain,
            patterns(&[
                (r"\b(explain|how\s+does|how\s+do|walk\s+through|step.by.step|describe|what\s+happens)\b", 10),
                (r"\b(flow|process|mechanism|works?|architecture)\b", 5),
                (r"\b(understand|overview|summary)\b", 3),
            ]),
        ),
        (
            TaskType::Debug,
            patterns(&[
                (r"\b(debug|bug|error|exception|fail|crash|broken|issue|problem)\b", 10),
                (r"\b(why\s+(is|does|did|are)|what'?s?\s+wrong|not\s+working|causes?)\b", 8),
                (r"\b(fix|resolve|troubleshoot|diagnose)\b", 6),
                (r"\b(stack\s*trace|traceback|assertion)\b", 5),
            ]),
        ),
        (
            TaskType::Extend,
            patterns(&[
                (r"\b(add|implement|create|build|extend|modify|change|update)\b", 8),
                (r"\b(how\s+(do\s+I|to|can\s+I|should\s+I))\b", 6),
                (r"\b(where\s+should|best\s+place|pattern|approach)\b", 5),
                (r"\b(new\s+(feature|endpoint|function|class|component))\b", 7),
            ]),
        ),
        (
            TaskType::Review,
            patterns(&[
                (r"\b(review|audit|check|analyze|assess)\b", 10),
                (r"\b(change[ds]?|diff|commit|what'?s?\s+new)\b", 6),
                (r"\b(test\s*coverage|quality|security|performance)\b", 5),
                (r"\b(since|between|compare|versus)\b", 3),
            ]),
        ),
        (
            TaskType::Locate,
            patterns(&[
                (r"\b(where\s+(is|are|can\s+I\s+find)|find|locate|search)\b", 10),
                (r"\b(defined|declared|implemented|used|called|referenced)\b", 6),
                (r"\b(file|path|location|line)\b", 4),
                (r"\b(show\s+me|list|get)\b", 3),
            ]),
        ),
    ]
});

/// Guess the task type of a natural-language query
///
/// Returns the type with the highest summed pattern weight and a confidence
/// in `[0, 1]` rounded to two decimals. No match, or a tie for first place,
/// yields `(General, 0.0)`.
pub fn classify_query(query: &str) -> (TaskType, f64) {
    let scores: Vec<(TaskType, u32, u32)> = TASK_PATTERNS
        .iter()
        .map(|(task, patterns)| {
            let possible: u32 = patterns.iter().map(|p| p.weight).sum();
            let matched: u32 = patterns
                .iter()
                .filter(|p| p.regex.is_match(query))
                .map(|p| p.weight)
                .sum();
            (*task, matched, possible)
        })
        .collect();

    let mut ranked: Vec<u32> = scores.iter().map(|(_, score, _)| *score).collect();
    ranked.sort_unstable_by(|a, b| b.cmp(a));
    let best = ranked.first().copied().unwrap_or(0);
    let second = ranked.get(1).copied();
    if best == 0 || second == Some(best) {
        return (TaskType::General, 0.0);
    }

    let Some(&(task, _, possible)) = scores.iter().find(|(_, score, _)| *score == best) else {
        return (TaskType::General, 0.0);
    };

    let best = f64::from(best);
    let mut confidence = (best / (f64::from(possible) * 0.5)).min(1.0);
    if let Some(second) = second {
        let gap_ratio = 1.0 - f64::from(second) / best;
        confidence = (confidence * gap_ratio.mul_add(0.3, 1.0)).min(1.0);
    }

    log::debug!("Classified '{query}' as {task} ({confidence:.2})");
    (task, (confidence * 100.0).round() / 100.0)
}
