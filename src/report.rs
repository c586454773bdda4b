//! Report
//!
//! Terminal tables for priced carts and quota states.

use std::io;

use decimal_percentage::Percentage;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use rusty_money::{Money, MoneyError, iso::Currency};
use tabled::{
    builder::Builder,
    settings::{
        Alignment, Color, Style,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::{
    catalog::{Catalog, ItemRef},
    discounts::{LinePrice, fraction, rule::DiscountKey},
    positions::LineItem,
    pricing::{TotalPriceError, sum_in},
    quotas::{QuotaAvailability, QuotaSet},
};

/// Errors that can occur when building a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Error summing line prices.
    #[error(transparent)]
    TotalPrice(#[from] TotalPriceError),

    /// Wrapper for money errors.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Cart lines and prices do not line up.
    #[error("{lines} cart lines but {prices} prices")]
    LineCountMismatch {
        /// Number of cart lines
        lines: usize,
        /// Number of prices
        prices: usize,
    },

    /// Product missing from the catalog.
    #[error("Missing product")]
    MissingProduct(ItemRef),

    /// IO error
    #[error("IO error")]
    IO,
}

/// One printed cart line.
#[derive(Debug, Clone)]
struct CartRow<'a> {
    product: String,
    date: String,
    base_price: Money<'a, Currency>,
    final_price: Money<'a, Currency>,
    discount: Option<String>,
    flags: &'static str,
}

/// A priced cart ready for printing.
#[derive(Debug, Clone)]
pub struct CartReport<'a> {
    rows: Vec<CartRow<'a>>,
    subtotal: Money<'a, Currency>,
    total: Money<'a, Currency>,
}

impl<'a> CartReport<'a> {
    /// Build the report for a priced cart.
    ///
    /// `discount_name` resolves rule keys to display names.
    ///
    /// # Errors
    ///
    /// Returns a [`ReportError`] if `prices` does not match `lines`, if a
    /// product is not in the catalog or if the totals cannot be summed.
    pub fn new<'n>(
        currency: &'static Currency,
        lines: &[LineItem<'a>],
        prices: &[LinePrice<'a>],
        catalog: &Catalog<'_>,
        discount_name: impl Fn(DiscountKey) -> Option<&'n str>,
    ) -> Result<Self, ReportError> {
        if lines.len() != prices.len() {
            return Err(ReportError::LineCountMismatch {
                lines: lines.len(),
                prices: prices.len(),
            });
        }

        let rows = lines
            .iter()
            .zip(prices)
            .map(|(line, price)| {
                let product = catalog
                    .label(line.target())
                    .ok_or(ReportError::MissingProduct(line.target()))?;

                let date = line
                    .subevent()
                    .and_then(|subevent| catalog.subevent(subevent))
                    .map(|subevent| subevent.name.clone())
                    .unwrap_or_default();

                Ok(CartRow {
                    product,
                    date,
                    base_price: *line.price(),
                    final_price: price.price,
                    discount: price
                        .discount
                        .map(|key| discount_name(key).unwrap_or("<unknown>").to_string()),
                    flags: line_flags(line),
                })
            })
            .collect::<Result<Vec<_>, ReportError>>()?;

        let subtotal = sum_in(currency, lines.iter().map(LineItem::price))?;
        let total = sum_in(currency, prices.iter().map(|price| &price.price))?;

        Ok(Self {
            rows,
            subtotal,
            total,
        })
    }

    /// Total before discounts
    pub fn subtotal(&self) -> Money<'a, Currency> {
        self.subtotal
    }

    /// Total after discounts
    pub fn total(&self) -> Money<'a, Currency> {
        self.total
    }

    /// Amount saved by discounts.
    ///
    /// # Errors
    ///
    /// Returns a [`MoneyError`] if the subtraction fails.
    pub fn savings(&self) -> Result<Money<'a, Currency>, MoneyError> {
        self.subtotal.sub(self.total)
    }

    /// Savings relative to the subtotal.
    ///
    /// # Errors
    ///
    /// Returns a [`MoneyError`] if the subtraction fails.
    pub fn savings_percent(&self) -> Result<Percentage, MoneyError> {
        let subtotal_minor = self.subtotal.to_minor_units();

        if subtotal_minor == 0 {
            return Ok(Percentage::from(Decimal::ZERO));
        }

        let savings = Decimal::from_i64(self.savings()?.to_minor_units()).unwrap_or(Decimal::ZERO);
        let subtotal = Decimal::from_i64(subtotal_minor).unwrap_or(Decimal::ONE);

        Ok(Percentage::from(savings / subtotal))
    }

    /// Prints the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be written.
    pub fn write_to(&self, mut out: impl io::Write) -> Result<(), ReportError> {
        let mut builder = Builder::default();

        builder.push_record(["#", "Product", "Date", "Price", "Final", "Discount", ""]);

        for (idx, row) in self.rows.iter().enumerate() {
            let final_price = if row.final_price == row.base_price {
                String::new()
            } else {
                row.final_price.to_string()
            };

            builder.push_record([
                (idx + 1).to_string(),
                row.product.clone(),
                row.date.clone(),
                row.base_price.to_string(),
                final_price,
                row.discount.clone().unwrap_or_default(),
                row.flags.to_string(),
            ]);
        }

        let mut table = builder.build();

        table.with(Style::modern_rounded());
        table.modify(Rows::first(), Color::BOLD);
        table.modify(Columns::new(3..5), Alignment::right());

        writeln!(out, "\n{table}").map_err(|_err| ReportError::IO)?;

        let savings_points = fraction(&self.savings_percent()?) * Decimal::ONE_HUNDRED;

        writeln!(out, "  Subtotal: {}", self.subtotal).map_err(|_err| ReportError::IO)?;
        writeln!(out, "  Total:    {}", self.total).map_err(|_err| ReportError::IO)?;
        writeln!(
            out,
            "  Savings:  {} ({:.2}%)\n",
            self.savings()?,
            savings_points.round_dp(2)
        )
        .map_err(|_err| ReportError::IO)
    }
}

fn line_flags(line: &LineItem<'_>) -> &'static str {
    match (line.is_bundled(), line.is_addon()) {
        (true, _) => "bundled",
        (false, true) => "add-on",
        (false, false) => "",
    }
}

/// Prints the state of every computed quota.
///
/// Quotas that have sold out and should be closed are marked.
///
/// # Errors
///
/// Returns an error if the output cannot be written.
pub fn write_quota_table(
    mut out: impl io::Write,
    quotas: &QuotaSet,
    availability: &QuotaAvailability<'_>,
) -> Result<(), ReportError> {
    let mut builder = Builder::default();

    builder.push_record([
        "Quota", "Size", "Paid", "Pending", "Vouchers", "Carts", "Waiting", "Left", "Status", "",
    ]);

    let to_close = availability.quotas_to_close();

    for (key, quota) in quotas.iter() {
        let (Some(result), Some(counts)) = (availability.result(key), availability.counts(key))
        else {
            continue;
        };

        let size = quota
            .size
            .map_or_else(|| "∞".to_string(), |size| size.to_string());

        let left = result
            .remaining
            .map_or_else(|| "∞".to_string(), |remaining| remaining.to_string());

        let note = if quota.closed {
            "closed"
        } else if to_close.contains(&key) {
            "close"
        } else {
            ""
        };

        builder.push_record([
            quota.name.clone(),
            size,
            counts.paid.to_string(),
            counts.pending.to_string(),
            counts.vouchers.to_string(),
            counts.carts.to_string(),
            counts.waiting_list.to_string(),
            left,
            result.status.to_string(),
            note.to_string(),
        ]);
    }

    let mut table = builder.build();

    table.with(Style::modern_rounded());
    table.modify(Rows::first(), Color::BOLD);
    table.modify(Columns::new(1..8), Alignment::right());

    writeln!(out, "\n{table}\n").map_err(|_err| ReportError::IO)
}
