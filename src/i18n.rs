//! Translation lookup for the invoice template.
//!
//! A [`Catalog`] maps locale codes to per-key strings; a [`Translator`] pairs
//! a catalog with the active locale and is passed explicitly into template
//! rendering. Lookups fall back from the active locale to
//! [`DEFAULT_LOCALE`] and finally to the key's built-in English text, so a
//! lookup never yields an empty string or a raw identifier.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

/// Locale used when the active one lacks a key.
pub const DEFAULT_LOCALE: &str = "en";

/// Every translatable label on the invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TranslationKey {
    DocumentTitle,
    OriginalForRecipient,
    SoldBy,
    BillingAddress,
    ShippingAddress,
    OrderNumber,
    OrderDate,
    InvoiceDetails,
    InvoiceDate,
    Total,
    PlaceOfSupply,
    ReverseCharge,
    PlaceOfDelivery,
    AuthorizedSignatory,
}

impl TranslationKey {
    pub const ALL: [TranslationKey; 14] = [
        TranslationKey::DocumentTitle,
        TranslationKey::OriginalForRecipient,
        TranslationKey::SoldBy,
        TranslationKey::BillingAddress,
        TranslationKey::ShippingAddress,
        TranslationKey::OrderNumber,
        TranslationKey::OrderDate,
        TranslationKey::InvoiceDetails,
        TranslationKey::InvoiceDate,
        TranslationKey::Total,
        TranslationKey::PlaceOfSupply,
        TranslationKey::ReverseCharge,
        TranslationKey::PlaceOfDelivery,
        TranslationKey::AuthorizedSignatory,
    ];

    /// English source text; also the key's name in JSON catalogs.
    pub fn default_text(&self) -> &'static str {
        match self {
            TranslationKey::DocumentTitle => "Tax Invoice/Bill of Supply/Cash Memo",
            TranslationKey::OriginalForRecipient => "Original for Recipient",
            TranslationKey::SoldBy => "Sold By",
            TranslationKey::BillingAddress => "Billing Address",
            TranslationKey::ShippingAddress => "Shipping Address",
            TranslationKey::OrderNumber => "Order Number",
            TranslationKey::OrderDate => "Order Date",
            TranslationKey::InvoiceDetails => "Invoice Details",
            TranslationKey::InvoiceDate => "Invoice Date",
            TranslationKey::Total => "TOTAL",
            TranslationKey::PlaceOfSupply => "Place of Supply",
            TranslationKey::ReverseCharge => "Whether tax is payable under reverse charge",
            TranslationKey::PlaceOfDelivery => "Place of Delivery",
            TranslationKey::AuthorizedSignatory => "Authorized Signatory",
        }
    }

    /// Look a key up by its English source text.
    pub fn from_source(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.default_text() == text)
    }
}

const SPANISH: [(TranslationKey, &str); 14] = [
    (TranslationKey::DocumentTitle, "Factura Fiscal/Memo de Suministro/Nota de Efectivo"),
    (TranslationKey::OriginalForRecipient, "Original para el destinatario"),
    (TranslationKey::SoldBy, "Vendido por"),
    (TranslationKey::BillingAddress, "Dirección de facturación"),
    (TranslationKey::ShippingAddress, "Dirección de envío"),
    (TranslationKey::OrderNumber, "Número de orden"),
    (TranslationKey::OrderDate, "Fecha de la orden"),
    (TranslationKey::InvoiceDetails, "Detalles de la factura"),
    (TranslationKey::InvoiceDate, "Fecha de la factura"),
    (TranslationKey::Total, "TOTAL"),
    (TranslationKey::PlaceOfSupply, "Lugar de suministro"),
    (TranslationKey::ReverseCharge, "Si el impuesto se paga bajo cargo inverso"),
    (TranslationKey::PlaceOfDelivery, "Lugar de entrega"),
    (TranslationKey::AuthorizedSignatory, "Firmante autorizado"),
];

/// JSON catalog layout: `{ "<locale>": { "<English text>": "<translation>" } }`.
#[derive(Deserialize)]
#[serde(transparent)]
struct CatalogFile(HashMap<String, HashMap<String, String>>);

/// Translation strings for every known locale.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    locales: HashMap<String, HashMap<TranslationKey, String>>,
}

impl Catalog {
    /// Empty catalog; every lookup falls back to the built-in English text.
    pub fn empty() -> Self {
        Self::default()
    }

    /// English and Spanish.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.insert_locale(
            DEFAULT_LOCALE,
            TranslationKey::ALL
                .into_iter()
                .map(|k| (k, k.default_text().to_string())),
        );
        catalog.insert_locale("es", SPANISH.into_iter().map(|(k, v)| (k, v.to_string())));
        catalog
    }

    /// Add or extend a locale. Existing entries for the same key are replaced.
    pub fn insert_locale(
        &mut self,
        code: &str,
        entries: impl IntoIterator<Item = (TranslationKey, String)>,
    ) {
        self.locales.entry(code.to_string()).or_default().extend(entries);
    }

    /// Merge locales from a JSON catalog keyed by English source text.
    /// Unknown source strings are skipped.
    pub fn merge_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let CatalogFile(file) = serde_json::from_str(json)?;
        for (code, strings) in file {
            let entries = strings.into_iter().filter_map(|(source, text)| {
                let key = TranslationKey::from_source(&source);
                if key.is_none() {
                    log::warn!("catalog `{code}`: unknown translation key {source:?}");
                }
                key.map(|k| (k, text))
            });
            self.insert_locale(&code, entries.collect::<Vec<_>>());
        }
        Ok(())
    }

    /// Built-in catalog extended with a JSON catalog.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut catalog = Self::builtin();
        catalog.merge_json(json)?;
        Ok(catalog)
    }

    pub fn has_locale(&self, code: &str) -> bool {
        self.locales.contains_key(code)
    }

    /// Locale codes in sorted order.
    pub fn locales(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.locales.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    fn lookup(&self, code: &str, key: TranslationKey) -> Option<&str> {
        self.locales
            .get(code)
            .and_then(|strings| strings.get(&key))
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// A catalog bound to one active locale.
#[derive(Debug, Clone)]
pub struct Translator {
    catalog: Arc<Catalog>,
    locale: String,
}

impl Translator {
    pub fn new(catalog: Arc<Catalog>, locale: impl Into<String>) -> Self {
        let locale = locale.into();
        if !catalog.has_locale(&locale) {
            log::warn!("locale `{locale}` not in catalog; falling back to `{DEFAULT_LOCALE}`");
        }
        Self { catalog, locale }
    }

    /// Built-in catalog in `locale`.
    pub fn builtin(locale: &str) -> Self {
        Self::new(Arc::new(Catalog::builtin()), locale)
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// The same catalog in another locale.
    pub fn with_locale(&self, locale: impl Into<String>) -> Self {
        Self::new(Arc::clone(&self.catalog), locale)
    }

    /// Localised text for `key`.
    pub fn t(&self, key: TranslationKey) -> &str {
        self.catalog
            .lookup(&self.locale, key)
            .or_else(|| self.catalog.lookup(DEFAULT_LOCALE, key))
            .unwrap_or_else(|| key.default_text())
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::builtin(DEFAULT_LOCALE)
    }
}
