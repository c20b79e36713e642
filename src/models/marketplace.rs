use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ParseEnumError;

/// Sales channels whose orders are handled by the back office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marketplace {
    Walmart,
    Ripley,
    Falabella,
    MercadoLibre,
    Paris,
    #[serde(rename = "woocommerce")]
    WooCommerce,
}

impl Marketplace {
    pub const ALL: [Marketplace; 6] = [
        Marketplace::Walmart,
        Marketplace::Ripley,
        Marketplace::Falabella,
        Marketplace::MercadoLibre,
        Marketplace::Paris,
        Marketplace::WooCommerce,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Marketplace::Walmart => "walmart",
            Marketplace::Ripley => "ripley",
            Marketplace::Falabella => "falabella",
            Marketplace::MercadoLibre => "mercado_libre",
            Marketplace::Paris => "paris",
            Marketplace::WooCommerce => "woocommerce",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Marketplace::Walmart => "Walmart",
            Marketplace::Ripley => "Ripley",
            Marketplace::Falabella => "Falabella",
            Marketplace::MercadoLibre => "Mercado Libre",
            Marketplace::Paris => "Paris",
            Marketplace::WooCommerce => "WooCommerce",
        }
    }

    /// Prefixes operators or label printers put in front of the channel's
    /// order number (`ML-2000004567`, `#1043`). Upper-case.
    pub fn suborder_prefixes(&self) -> &'static [&'static str] {
        match self {
            Marketplace::Walmart => &["WM-", "WAL-"],
            Marketplace::Ripley => &["RP-", "RIP-"],
            Marketplace::Falabella => &["FA-", "FAL-"],
            Marketplace::MercadoLibre => &["ML-", "MELI-"],
            Marketplace::Paris => &["PA-", "PAR-"],
            Marketplace::WooCommerce => &["WC-", "WOO-"],
        }
    }
}

impl std::fmt::Display for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl std::str::FromStr for Marketplace {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        match key.as_str() {
            "walmart" | "lider" => Ok(Marketplace::Walmart),
            "ripley" => Ok(Marketplace::Ripley),
            "falabella" => Ok(Marketplace::Falabella),
            "mercadolibre" | "meli" | "ml" => Ok(Marketplace::MercadoLibre),
            "paris" => Ok(Marketplace::Paris),
            "woocommerce" | "woo" => Ok(Marketplace::WooCommerce),
            _ => Err(ParseEnumError::new("marketplace", s)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MarketplaceSummary {
    pub marketplace: Marketplace,
    pub display_name: &'static str,
    pub total_orders: i64,
    pub total_amount: Decimal,
    pub orders_by_status: BTreeMap<String, i64>,
}

impl MarketplaceSummary {
    pub fn empty(marketplace: Marketplace) -> Self {
        Self {
            marketplace,
            display_name: marketplace.display_name(),
            total_orders: 0,
            total_amount: Decimal::ZERO,
            orders_by_status: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("Mercado Libre".parse::<Marketplace>().unwrap(), Marketplace::MercadoLibre);
        assert_eq!("mercado_libre".parse::<Marketplace>().unwrap(), Marketplace::MercadoLibre);
        assert_eq!("MELI".parse::<Marketplace>().unwrap(), Marketplace::MercadoLibre);
        assert_eq!("WooCommerce".parse::<Marketplace>().unwrap(), Marketplace::WooCommerce);
        assert!("amazon".parse::<Marketplace>().is_err());
    }

    #[test]
    fn test_slug_round_trips_through_serde() {
        for marketplace in Marketplace::ALL {
            let json = serde_json::to_string(&marketplace).unwrap();
            assert_eq!(json, format!("\"{}\"", marketplace.slug()));
            assert_eq!(marketplace.slug().parse::<Marketplace>().unwrap(), marketplace);
        }
    }
}
