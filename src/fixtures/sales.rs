//! Sales Fixtures

use jiff::Timestamp;
use serde::Deserialize;

use crate::quotas::sales::OrderStatus;

/// Wrapper for a sales snapshot in YAML
#[derive(Debug, Default, Deserialize)]
pub struct SalesFixture {
    /// Orders
    #[serde(default)]
    pub orders: Vec<OrderFixture>,

    /// Cart holds
    #[serde(default)]
    pub carts: Vec<CartPositionFixture>,

    /// Vouchers
    #[serde(default)]
    pub vouchers: Vec<VoucherFixture>,

    /// Waiting list
    #[serde(default)]
    pub waiting_list: Vec<WaitingListFixture>,
}

/// Order Fixture
#[derive(Debug, Deserialize)]
pub struct OrderFixture {
    /// Order status
    pub status: OrderStatus,

    /// Payment deadline
    #[serde(default)]
    pub expires: Option<Timestamp>,

    /// Positions
    pub positions: Vec<OrderPositionFixture>,
}

/// Order Position Fixture
#[derive(Debug, Deserialize)]
pub struct OrderPositionFixture {
    /// Item or variation key
    pub product: String,

    /// Subevent key
    #[serde(default)]
    pub subevent: Option<String>,

    /// Number of identical positions
    #[serde(default = "one")]
    pub count: u32,

    /// Whether the position was canceled
    #[serde(default)]
    pub canceled: bool,
}

/// Cart Position Fixture
#[derive(Debug, Deserialize)]
pub struct CartPositionFixture {
    /// Item or variation key
    pub product: String,

    /// Subevent key
    #[serde(default)]
    pub subevent: Option<String>,

    /// End of the hold
    pub expires: Timestamp,

    /// Voucher key
    #[serde(default)]
    pub voucher: Option<String>,
}

/// Voucher Fixture
///
/// Exactly one of `quota` or `product` must be set.
#[derive(Debug, Deserialize)]
pub struct VoucherFixture {
    /// Reference used by cart positions
    pub key: String,

    /// Quota key the voucher is valid for
    #[serde(default)]
    pub quota: Option<String>,

    /// Item or variation key the voucher is valid for
    #[serde(default)]
    pub product: Option<String>,

    /// Subevent key
    #[serde(default)]
    pub subevent: Option<String>,

    /// Whether the voucher reserves quota
    #[serde(default)]
    pub block_quota: bool,

    /// End of validity
    #[serde(default)]
    pub valid_until: Option<Timestamp>,

    /// Number of times the voucher can be redeemed
    #[serde(default = "one")]
    pub max_usages: u32,

    /// Number of times the voucher has been redeemed
    #[serde(default)]
    pub redeemed: u32,
}

/// Waiting List Fixture
#[derive(Debug, Deserialize)]
pub struct WaitingListFixture {
    /// Item or variation key
    pub product: String,

    /// Subevent key
    #[serde(default)]
    pub subevent: Option<String>,

    /// Whether a voucher was sent to the customer
    #[serde(default)]
    pub voucher_sent: bool,
}

fn one() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn counts_and_usages_default_to_one() -> TestResult {
        let yaml = r"
orders:
  - status: pending
    expires: 2026-06-01T12:00:00Z
    positions:
      - product: day-pass
vouchers:
  - key: press
    product: day-pass
    block_quota: true
";

        let fixture: SalesFixture = serde_norway::from_str(yaml)?;

        let order = fixture.orders.first().ok_or("missing order")?;
        let position = order.positions.first().ok_or("missing position")?;
        let voucher = fixture.vouchers.first().ok_or("missing voucher")?;

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(position.count, 1);
        assert_eq!(voucher.max_usages, 1);
        assert_eq!(voucher.redeemed, 0);
        assert!(fixture.carts.is_empty());

        Ok(())
    }
}
