//! Tagging accuracy on held-out instances.

use std::fmt::Write as _;

use seqlearn_core::Dictionary;

/// Match counts for one label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelCounts {
    /// Positions where reference and prediction both carry the label.
    pub matched: usize,
    /// Positions predicted with the label.
    pub predicted: usize,
    /// Positions whose reference is the label.
    pub reference: usize,
}

impl LabelCounts {
    pub fn precision(&self) -> f64 {
        ratio(self.matched, self.predicted)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.matched, self.reference)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 }
    }

    fn is_present(&self) -> bool {
        self.predicted > 0 || self.reference > 0
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 { num as f64 / den as f64 } else { 0.0 }
}

/// Accumulated item, instance and per-label accuracy.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub per_label: Vec<LabelCounts>,
    pub items: usize,
    pub correct_items: usize,
    pub instances: usize,
    pub correct_instances: usize,
}

impl Evaluation {
    pub fn new(num_labels: usize) -> Self {
        Self {
            per_label: vec![LabelCounts::default(); num_labels],
            items: 0,
            correct_items: 0,
            instances: 0,
            correct_instances: 0,
        }
    }

    /// Record one instance.
    pub fn add(&mut self, reference: &[u32], predicted: &[u32]) {
        let mut all_correct = true;
        for (&gold, &pred) in reference.iter().zip(predicted) {
            self.per_label[gold as usize].reference += 1;
            self.per_label[pred as usize].predicted += 1;
            if gold == pred {
                self.per_label[gold as usize].matched += 1;
                self.correct_items += 1;
            } else {
                all_correct = false;
            }
            self.items += 1;
        }
        self.instances += 1;
        if all_correct {
            self.correct_instances += 1;
        }
    }

    pub fn item_accuracy(&self) -> f64 {
        ratio(self.correct_items, self.items)
    }

    pub fn instance_accuracy(&self) -> f64 {
        ratio(self.correct_instances, self.instances)
    }

    /// Macro-averaged (precision, recall, F1) over labels that occur in the
    /// reference or the prediction.
    pub fn macro_average(&self) -> (f64, f64, f64) {
        let present: Vec<_> = self.per_label.iter().filter(|c| c.is_present()).collect();
        if present.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        let n = present.len() as f64;
        let sum = present.iter().fold((0.0, 0.0, 0.0), |acc, c| {
            (acc.0 + c.precision(), acc.1 + c.recall(), acc.2 + c.f1())
        });
        (sum.0 / n, sum.1 / n, sum.2 / n)
    }

    /// Progress-stream report.
    pub fn report(&self, labels: &Dictionary) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Performance by label (#match, #model, #ref) (precision, recall, F1):"
        );
        for (id, counts) in self.per_label.iter().enumerate() {
            if !counts.is_present() {
                continue;
            }
            let _ = writeln!(
                out,
                "    {}: ({}, {}, {}) ({:.4}, {:.4}, {:.4})",
                labels.to_string(id as u32).unwrap_or("?"),
                counts.matched,
                counts.predicted,
                counts.reference,
                counts.precision(),
                counts.recall(),
                counts.f1()
            );
        }
        let (p, r, f) = self.macro_average();
        let _ = writeln!(out, "Macro-average precision, recall, F1: ({:.6}, {:.6}, {:.6})", p, r, f);
        let _ = writeln!(
            out,
            "Item accuracy: {} / {} ({:.4})",
            self.correct_items,
            self.items,
            self.item_accuracy()
        );
        let _ = writeln!(
            out,
            "Instance accuracy: {} / {} ({:.4})",
            self.correct_instances,
            self.instances,
            self.instance_accuracy()
        );
        out
    }
}
