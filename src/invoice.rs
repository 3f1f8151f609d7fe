//! Invoice record – the data rendered by the invoice template.
//!
//! Records are deserialised from camelCase JSON and never validated: scalar
//! fields accept strings or numbers, and anything missing is defaulted to
//! empty so a partial record still renders.

use std::fmt;

use serde::{Deserialize, Deserializer};

/// A displayable field that may arrive as a JSON string, number or bool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawScalar")]
pub struct Scalar(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Null(()),
}

impl From<RawScalar> for Scalar {
    fn from(raw: RawScalar) -> Self {
        Scalar(match raw {
            RawScalar::Text(s) => s,
            RawScalar::Number(n) => n.to_string(),
            RawScalar::Bool(b) => b.to_string(),
            RawScalar::Null(()) => String::new(),
        })
    }
}

impl Scalar {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar(s.to_string())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// JS-style truthiness: `true`, non-zero numbers and non-empty strings other
/// than `"false"`/`"no"`/`"0"`.
fn truthy<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Option::<RawScalar>::deserialize(d)? {
        None | Some(RawScalar::Null(())) => false,
        Some(RawScalar::Bool(b)) => b,
        Some(RawScalar::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(RawScalar::Text(s)) => {
            let s = s.trim().to_ascii_lowercase();
            !(s.is_empty() || s == "false" || s == "no" || s == "0")
        }
    })
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SellerDetails {
    pub name: Scalar,
    pub address: Scalar,
    pub city: Scalar,
    pub state: Scalar,
    pub pincode: Scalar,
    pub pan_no: Scalar,
    pub gst_no: Scalar,
}

/// Billing or shipping party.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddressDetails {
    pub name: Scalar,
    pub address: Scalar,
    pub city: Scalar,
    pub state: Scalar,
    pub pincode: Scalar,
    pub state_code: Scalar,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderDetails {
    pub order_no: Scalar,
    pub order_date: Scalar,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InvoiceDetails {
    #[serde(alias = "invoiceDetails")]
    pub invoice_no: Scalar,
    pub invoice_date: Scalar,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "UPPERCASE")]
pub struct TaxAmount {
    pub cgst: Scalar,
    pub sgst: Scalar,
    pub igst: Scalar,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LineItem {
    pub description: Scalar,
    pub unit_price: Scalar,
    pub quantity: Scalar,
    pub net_amount: Scalar,
    pub tax_amount: TaxAmount,
    pub total_amount: Scalar,
}

/// Everything shown on one invoice.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InvoiceRecord {
    pub seller_details: SellerDetails,
    pub billing_details: AddressDetails,
    pub shipping_details: AddressDetails,
    pub order_details: OrderDetails,
    pub invoice_details: InvoiceDetails,
    pub items: Vec<LineItem>,
    pub total_amount: Scalar,
    pub place_of_supply: Scalar,
    #[serde(deserialize_with = "truthy")]
    pub reverse_charge: bool,
    pub place_of_delivery: Scalar,
}

impl InvoiceRecord {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// A filled-in record for demos and smoke tests.
    pub fn sample() -> Self {
        let item = |description: &str, unit: &str, qty: &str, net: &str, tax: &str, total: &str| {
            LineItem {
                description: description.into(),
                unit_price: unit.into(),
                quantity: qty.into(),
                net_amount: net.into(),
                tax_amount: TaxAmount {
                    cgst: tax.into(),
                    sgst: tax.into(),
                    igst: "0".into(),
                },
                total_amount: total.into(),
            }
        };
        let buyer = AddressDetails {
            name: "Asha Verma".into(),
            address: "14 Lake View Road".into(),
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            pincode: "560001".into(),
            state_code: "29".into(),
        };
        InvoiceRecord {
            seller_details: SellerDetails {
                name: "Varasiddhi Silk Exports".into(),
                address: "75, 3rd Cross, Lalbagh Road".into(),
                city: "Bengaluru".into(),
                state: "Karnataka".into(),
                pincode: "560027".into(),
                pan_no: "AACFV3325K".into(),
                gst_no: "29AACFV3325K1ZY".into(),
            },
            billing_details: buyer.clone(),
            shipping_details: buyer,
            order_details: OrderDetails {
                order_no: "403-3225714-7676307".into(),
                order_date: "28.10.2019".into(),
            },
            invoice_details: InvoiceDetails {
                invoice_no: "KA-310565025-1920".into(),
                invoice_date: "28.10.2019".into(),
            },
            items: vec![
                item("Varasiddhi Silks Men's Formal Shirt", "338.10", "2", "676.20", "16.91", "710.02"),
                item("Cotton Pocket Square (Pack of 3)", "190.48", "1", "190.48", "4.76", "200.00"),
            ],
            total_amount: "910.02".into(),
            place_of_supply: "Karnataka".into(),
            reverse_charge: false,
            place_of_delivery: "Karnataka".into(),
        }
    }
}
