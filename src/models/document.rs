use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::Carrier;
use super::ParseEnumError;

pub const MAX_DOCUMENT_ORDERS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Labels,
    PackingList,
    PickingList,
    Invoice,
    Manifest,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Labels => "labels",
            DocumentKind::PackingList => "packing-list",
            DocumentKind::PickingList => "picking-list",
            DocumentKind::Invoice => "invoice",
            DocumentKind::Manifest => "manifest",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            DocumentKind::Labels => "Shipping labels",
            DocumentKind::PackingList => "Packing list",
            DocumentKind::PickingList => "Picking list",
            DocumentKind::Invoice => "Invoice",
            DocumentKind::Manifest => "Dispatch manifest",
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "labels" | "label" => Ok(DocumentKind::Labels),
            "packing-list" => Ok(DocumentKind::PackingList),
            "picking-list" => Ok(DocumentKind::PickingList),
            "invoice" | "invoices" => Ok(DocumentKind::Invoice),
            "manifest" => Ok(DocumentKind::Manifest),
            _ => Err(ParseEnumError::new("document kind", s)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub order_ids: Vec<Uuid>,
    /// Manifests only: restrict to this carrier.
    pub carrier: Option<Carrier>,
}

#[derive(Debug, Deserialize)]
pub struct BarcodeQuery {
    pub value: String,
    #[serde(default)]
    pub format: BarcodeFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarcodeFormat {
    #[default]
    Code128,
    Qr,
}

/// Rendered PDF plus the filename it is served under.
#[derive(Debug)]
pub struct RenderedDocument {
    pub kind: DocumentKind,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub pages: usize,
}
