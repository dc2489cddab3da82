//! Dashboard figures rolled up from invoices, customers and stock.

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::config::DashboardConfig;
use crate::db::{InventoryItem, Invoice, InvoiceStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub name: &'static str,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyRevenue {
    pub month: String,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_revenue: Decimal,
    pub total_customers: i64,
    pub total_invoices: usize,
    pub pending_invoices: usize,
    pub low_stock_items: usize,
    pub recent_invoices: Vec<Invoice>,
    pub monthly_revenue: Vec<MonthlyRevenue>,
    pub invoice_status: Vec<StatusCount>,
}

impl DashboardStats {
    /// `invoices` must be newest first, as the store lists them.
    pub fn compute(
        total_customers: i64,
        invoices: &[Invoice],
        inventory: &[InventoryItem],
        options: &DashboardConfig,
        today: NaiveDate,
    ) -> Self {
        let count = |status: InvoiceStatus| invoices.iter().filter(|i| i.status == status).count();

        let total_revenue = invoices
            .iter()
            .filter(|i| i.status == InvoiceStatus::Paid)
            .map(|i| i.total_amount)
            .sum();

        let invoice_status = [
            ("Paid", InvoiceStatus::Paid),
            ("Sent", InvoiceStatus::Sent),
            ("Overdue", InvoiceStatus::Overdue),
            ("Draft", InvoiceStatus::Draft),
        ]
        .into_iter()
        .map(|(name, status)| StatusCount {
            name,
            value: count(status),
        })
        .filter(|s| s.value > 0)
        .collect();

        Self {
            total_revenue,
            total_customers,
            total_invoices: invoices.len(),
            pending_invoices: count(InvoiceStatus::Sent) + count(InvoiceStatus::Overdue),
            low_stock_items: inventory
                .iter()
                .filter(|item| item.quantity < options.low_stock_below)
                .count(),
            recent_invoices: invoices.iter().take(options.recent_invoices).cloned().collect(),
            monthly_revenue: monthly_revenue(invoices, today, options.revenue_months),
            invoice_status,
        }
    }
}

/// Paid revenue per calendar month by issue date, oldest month first,
/// ending with the month containing `today`.
pub fn monthly_revenue(invoices: &[Invoice], today: NaiveDate, months: u32) -> Vec<MonthlyRevenue> {
    let current = today.year() * 12 + today.month0() as i32;

    (0..months as i32)
        .rev()
        .map(|back| {
            let index = current - back;
            let (year, month0) = (index.div_euclid(12), index.rem_euclid(12) as u32);
            let revenue = invoices
                .iter()
                .filter(|i| i.status == InvoiceStatus::Paid)
                .filter(|i| i.issue_date.year() == year && i.issue_date.month0() == month0)
                .map(|i| i.total_amount)
                .sum();
            let label = NaiveDate::from_ymd_opt(year, month0 + 1, 1)
                .map(|d| d.format("%b").to_string())
                .unwrap_or_default();
            MonthlyRevenue {
                month: label,
                revenue,
            }
        })
        .collect()
}

/// Rupee amount with Indian digit grouping and no fraction, e.g. `₹12,34,567`.
pub fn format_inr(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();

    let grouped = if digits.len() <= 3 {
        digits
    } else {
        let (head, last_three) = digits.split_at(digits.len() - 3);
        let mut groups: Vec<&str> = Vec::new();
        let mut end = head.len();
        while end > 0 {
            let start = end.saturating_sub(2);
            groups.push(&head[start..end]);
            end = start;
        }
        groups.reverse();
        format!("{},{}", groups.join(","), last_three)
    };

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-₹{}", grouped)
    } else {
        format!("₹{}", grouped)
    }
}
