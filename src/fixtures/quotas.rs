//! Quota Fixtures

use serde::Deserialize;

/// Wrapper for quotas in YAML
#[derive(Debug, Deserialize)]
pub struct QuotasFixture {
    /// Quotas
    pub quotas: Vec<QuotaFixture>,
}

/// Quota Fixture
#[derive(Debug, Deserialize)]
pub struct QuotaFixture {
    /// Reference used by other fixtures
    pub key: String,

    /// Quota name
    pub name: String,

    /// Capacity; omitted for unlimited quotas
    #[serde(default)]
    pub size: Option<u32>,

    /// Covered item or variation keys
    pub products: Vec<String>,

    /// Subevent key
    #[serde(default)]
    pub subevent: Option<String>,

    /// Whether the quota is closed
    #[serde(default)]
    pub closed: bool,

    /// Close the quota once it sells out
    #[serde(default)]
    pub close_when_sold_out: bool,
}
