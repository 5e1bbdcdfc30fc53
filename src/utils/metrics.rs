//! Metrics Module for Model Evaluation
//!
//! Plain functions over label/prediction slices. Length mismatches are
//! precondition violations and panic; they are never truncated.

/// Fraction of positions where `labels[i] == preds[i]`.
///
/// Panics if the slices differ in length. An empty input yields NaN.
pub fn compute_accuracy(labels: &[usize], preds: &[usize]) -> f64 {
    assert_eq!(
        labels.len(),
        preds.len(),
        "labels and predictions must have the same length"
    );

    let correct = labels.iter().zip(preds.iter()).filter(|(l, p)| l == p).count();
    correct as f64 / labels.len() as f64
}

/// Per-class accuracy for classes `0..=max(labels)`.
///
/// The class count is inferred from the largest observed label. A class that
/// never occurs in `labels` reports NaN.
pub fn compute_per_class_accuracy(labels: &[usize], preds: &[usize]) -> Vec<f64> {
    let class_count = labels.iter().max().map(|&m| m + 1).unwrap_or(0);
    compute_per_class_accuracy_with_count(labels, preds, class_count)
}

/// Per-class accuracy for classes `0..class_count`.
///
/// Entry `c` is the fraction of examples labelled `c` that were predicted as
/// `c`; classes without examples report NaN (0/0).
///
/// Panics if the slices differ in length or a label is `>= class_count`.
pub fn compute_per_class_accuracy_with_count(
    labels: &[usize],
    preds: &[usize],
    class_count: usize,
) -> Vec<f64> {
    assert_eq!(
        labels.len(),
        preds.len(),
        "labels and predictions must have the same length"
    );

    let mut correct = vec![0usize; class_count];
    let mut support = vec![0usize; class_count];

    for (&label, &pred) in labels.iter().zip(preds.iter()) {
        assert!(
            label < class_count,
            "label {} out of range for {} classes",
            label,
            class_count
        );
        support[label] += 1;
        if label == pred {
            correct[label] += 1;
        }
    }

    correct
        .iter()
        .zip(support.iter())
        .map(|(&c, &s)| c as f64 / s as f64)
        .collect()
}

/// Unweighted mean over per-class accuracies. NaN entries propagate.
pub fn mean_class_accuracy(per_class: &[f64]) -> f64 {
    per_class.iter().sum::<f64>() / per_class.len() as f64
}

/// Render per-class accuracies as `"0:0.5, 1:0.75"`.
pub fn format_per_class(per_class: &[f64]) -> String {
    per_class
        .iter()
        .enumerate()
        .map(|(class, acc)| format!("{}:{}", class, acc))
        .collect::<Vec<_>>()
        .join(", ")
}
