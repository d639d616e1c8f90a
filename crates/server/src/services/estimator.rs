//! Spend estimation over a flat list of products.
//!
//! Products are grouped by normalized name. Money already spent seeds every
//! scenario; each name group with nothing purchased yet then adds its most
//! expensive, median or cheapest planned line to the expensive, average and
//! cheap scenario respectively.

use std::collections::HashMap;

use serde::Serialize;

use crate::db::models::{Product, ProductStatus};

/// A priced, quantified line item.
///
/// Callers guarantee `price >= 0` and `quantity >= 1`.
pub trait LineItem {
    fn name(&self) -> &str;
    fn price(&self) -> f64;
    fn quantity(&self) -> i64;
    fn status(&self) -> ProductStatus;

    fn line_value(&self) -> f64 {
        self.price() * self.quantity() as f64
    }
}

impl LineItem for Product {
    fn name(&self) -> &str {
        &self.name
    }

    fn price(&self) -> f64 {
        self.price
    }

    fn quantity(&self) -> i64 {
        self.quantity
    }

    fn status(&self) -> ProductStatus {
        self.status
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductGroup {
    /// First-seen spelling of the name.
    pub name: String,
    pub item_count: usize,
    pub purchased_count: usize,
    pub total_value: f64,
    pub total_quantity: i64,
    pub min_price: f64,
    pub max_price: f64,
    pub median_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scenarios {
    pub expensive: f64,
    pub average: f64,
    pub cheap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendEstimate {
    pub purchased_total: f64,
    pub planned_total: f64,
    pub scenarios: Scenarios,
    pub groups: Vec<ProductGroup>,
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Median of `values`; the mean of the two middle elements for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

struct Bucket<'a, T> {
    name: &'a str,
    items: Vec<&'a T>,
}

fn bucket_by_name<T: LineItem>(items: &[T]) -> Vec<Bucket<'_, T>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<Bucket<'_, T>> = Vec::new();

    for item in items {
        let key = normalize_name(item.name());
        match index.get(&key) {
            Some(&i) => buckets[i].items.push(item),
            None => {
                index.insert(key, buckets.len());
                buckets.push(Bucket {
                    name: item.name(),
                    items: vec![item],
                });
            }
        }
    }

    buckets
}

fn summarize<T: LineItem>(bucket: &Bucket<'_, T>) -> ProductGroup {
    let prices: Vec<f64> = bucket.items.iter().map(|i| i.price()).collect();

    ProductGroup {
        name: bucket.name.to_string(),
        item_count: bucket.items.len(),
        purchased_count: bucket
            .items
            .iter()
            .filter(|i| i.status() == ProductStatus::Purchased)
            .count(),
        total_value: bucket.items.iter().map(|i| i.line_value()).sum(),
        total_quantity: bucket.items.iter().map(|i| i.quantity()).sum(),
        min_price: prices.iter().copied().fold(f64::INFINITY, f64::min),
        max_price: prices.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        median_price: median(&prices).unwrap_or_default(),
    }
}

/// Groups sorted by total value, highest first; ties keep encounter order.
pub fn group_products<T: LineItem>(items: &[T]) -> Vec<ProductGroup> {
    let mut groups: Vec<ProductGroup> = bucket_by_name(items).iter().map(summarize).collect();
    groups.sort_by(|a, b| b.total_value.total_cmp(&a.total_value));
    groups
}

pub fn estimate<T: LineItem>(items: &[T]) -> SpendEstimate {
    let purchased_total: f64 = items
        .iter()
        .filter(|i| i.status() == ProductStatus::Purchased)
        .map(LineItem::line_value)
        .sum();
    let planned_total: f64 = items
        .iter()
        .filter(|i| i.status() == ProductStatus::Planned)
        .map(LineItem::line_value)
        .sum();

    let mut scenarios = Scenarios {
        expensive: purchased_total,
        average: purchased_total,
        cheap: purchased_total,
    };

    for bucket in bucket_by_name(items) {
        // A group with any purchase is settled by what was actually paid.
        if bucket
            .items
            .iter()
            .any(|i| i.status() == ProductStatus::Purchased)
        {
            continue;
        }

        let mut lines: Vec<f64> = bucket
            .items
            .iter()
            .filter(|i| i.status() == ProductStatus::Planned)
            .map(|i| i.line_value())
            .collect();
        if lines.is_empty() {
            continue;
        }
        lines.sort_by(f64::total_cmp);

        scenarios.cheap += lines[0];
        scenarios.expensive += lines[lines.len() - 1];
        scenarios.average += median(&lines).unwrap_or_default();
    }

    SpendEstimate {
        purchased_total,
        planned_total,
        scenarios,
        groups: group_products(items),
    }
}
