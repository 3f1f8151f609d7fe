//! Invoice template – renders an [`InvoiceRecord`] to markup.
//!
//! The markup uses the class names of [`Stylesheet::invoice`] and wraps the
//! whole document in an element with id [`INVOICE_ELEMENT_ID`], the lookup
//! key the exporter captures. Labels come from the [`Translator`] passed in;
//! record values are escaped.
//!
//! [`Stylesheet::invoice`]: crate::style::Stylesheet::invoice

use std::fmt::Write as _;

use crate::i18n::{TranslationKey as K, Translator};
use crate::invoice::{AddressDetails, InvoiceRecord, LineItem};

/// Lookup key of the invoice root element.
pub const INVOICE_ELEMENT_ID: &str = "invoice";

/// Tax rate printed in every line item row.
pub const LINE_TAX_RATE: &str = "2.5%";

const CURRENCY: &str = "₹";

const TABLE_HEADERS: [&str; 10] = [
    "Sl. No",
    "Description",
    "Unit Price",
    "Qty",
    "Net Amount",
    "Tax Rate",
    "CGST",
    "SGST",
    "IGST",
    "Total Amount",
];

/// Escape text for use in element content or a quoted attribute.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn address_block(out: &mut String, class: &str, label: &str, party: &AddressDetails) {
    let _ = write!(
        out,
        r#"<div class="{class}"><h3>{label}:</h3><div>{}</div><div>{}</div><div>{}, {}, {}</div><div>{}</div></div>"#,
        escape_html(party.name.as_str()),
        escape_html(party.address.as_str()),
        escape_html(party.city.as_str()),
        escape_html(party.state.as_str()),
        escape_html(party.pincode.as_str()),
        escape_html(party.state_code.as_str()),
    );
}

fn item_row(out: &mut String, index: usize, item: &LineItem) {
    let cells = [
        (index + 1).to_string(),
        escape_html(item.description.as_str()),
        escape_html(item.unit_price.as_str()),
        escape_html(item.quantity.as_str()),
        escape_html(item.net_amount.as_str()),
        LINE_TAX_RATE.to_string(),
        escape_html(item.tax_amount.cgst.as_str()),
        escape_html(item.tax_amount.sgst.as_str()),
        escape_html(item.tax_amount.igst.as_str()),
        escape_html(item.total_amount.as_str()),
    ];
    out.push_str("<tr>");
    for cell in cells {
        let _ = write!(out, "<td>{cell}</td>");
    }
    out.push_str("</tr>");
}

/// Render the full invoice. `logo_src` is any image source the capturer
/// understands (data URI, file path, or a pre-fetched URL); without one the
/// logo slot stays empty.
pub fn render_invoice_html(invoice: &InvoiceRecord, t: &Translator, logo_src: Option<&str>) -> String {
    let seller = &invoice.seller_details;
    let label = |key| escape_html(t.t(key));
    let mut out = String::with_capacity(4096);

    let _ = write!(out, r#"<div id="{INVOICE_ELEMENT_ID}" class="invoice-container">"#);

    // Header
    out.push_str(r#"<div class="header">"#);
    match logo_src {
        Some(src) => {
            let _ = write!(out, r#"<img src="{}" alt="Company Logo" class="logo" />"#, escape_html(src));
        }
        None => out.push_str(r#"<div class="logo"></div>"#),
    }
    let _ = write!(
        out,
        r#"<div class="invoice-title"><h3>{}</h3><p>{}</p></div></div>"#,
        label(K::DocumentTitle),
        label(K::OriginalForRecipient),
    );

    // Seller and addresses
    let _ = write!(
        out,
        r#"<div class="details"><div class="sold-by"><h3>{}:</h3><div>{}</div><div>{}</div><div>{}, {}, {}</div><div><b>PAN No:</b> {}</div><div><b>GST Registration No:</b> {}</div></div>"#,
        label(K::SoldBy),
        escape_html(seller.name.as_str()),
        escape_html(seller.address.as_str()),
        escape_html(seller.city.as_str()),
        escape_html(seller.state.as_str()),
        escape_html(seller.pincode.as_str()),
        escape_html(seller.pan_no.as_str()),
        escape_html(seller.gst_no.as_str()),
    );
    out.push_str(r#"<div class="address-section">"#);
    address_block(&mut out, "billing-address", &label(K::BillingAddress), &invoice.billing_details);
    address_block(&mut out, "shipping-address", &label(K::ShippingAddress), &invoice.shipping_details);
    out.push_str("</div></div>");

    // Order and invoice meta
    let _ = write!(
        out,
        r#"<div class="invoice-meta"><div>{}: {}</div><div>{}: {}</div><div>{}: {}</div><div>{}: {}</div></div>"#,
        label(K::OrderNumber),
        escape_html(invoice.order_details.order_no.as_str()),
        label(K::OrderDate),
        escape_html(invoice.order_details.order_date.as_str()),
        label(K::InvoiceDetails),
        escape_html(invoice.invoice_details.invoice_no.as_str()),
        label(K::InvoiceDate),
        escape_html(invoice.invoice_details.invoice_date.as_str()),
    );

    // Line items
    out.push_str(r#"<div class="line-items"><table><thead><tr>"#);
    for header in TABLE_HEADERS {
        let _ = write!(out, "<th>{header}</th>");
    }
    out.push_str("</tr></thead><tbody>");
    for (index, item) in invoice.items.iter().enumerate() {
        item_row(&mut out, index, item);
    }
    out.push_str("</tbody></table></div>");

    let _ = write!(
        out,
        r#"<div class="totals"><div>{}: {CURRENCY}{}</div></div>"#,
        label(K::Total),
        escape_html(invoice.total_amount.as_str()),
    );

    // Footer
    let _ = write!(
        out,
        r#"<div class="footer"><div>{}: {}</div><div>{}: {}</div></div>"#,
        label(K::PlaceOfSupply),
        escape_html(invoice.place_of_supply.as_str()),
        label(K::ReverseCharge),
        if invoice.reverse_charge { "Yes" } else { "No" },
    );
    let _ = write!(
        out,
        r#"<div class="footer"><div>{}: {}</div><div class="signature">For {} <br />{}</div></div>"#,
        label(K::PlaceOfDelivery),
        escape_html(invoice.place_of_delivery.as_str()),
        escape_html(seller.name.as_str()),
        label(K::AuthorizedSignatory),
    );

    out.push_str("</div>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{find_by_id, parse_html, DomNode, ElementNode, Tag};

    fn text_of(el: &ElementNode) -> String {
        let mut s = String::new();
        for child in &el.children {
            match child {
                DomNode::Text(t) => s.push_str(t),
                DomNode::Element(e) => s.push_str(&text_of(e)),
            }
        }
        s
    }

    fn count_tags(nodes: &[DomNode], tag: &Tag) -> usize {
        nodes
            .iter()
            .map(|n| match n {
                DomNode::Element(e) => usize::from(&e.tag == tag) + count_tags(&e.children, tag),
                DomNode::Text(_) => 0,
            })
            .sum()
    }

    #[test]
    fn markup_has_invoice_root_and_all_rows() {
        let html = render_invoice_html(&InvoiceRecord::sample(), &Translator::default(), None);
        let dom = parse_html(&html);
        let root = find_by_id(&dom, INVOICE_ELEMENT_ID).unwrap();
        assert_eq!(root.classes().collect::<Vec<_>>(), vec!["invoice-container"]);
        assert_eq!(count_tags(&dom, &Tag::Th), 10);
        assert_eq!(count_tags(&dom, &Tag::Tr), 3);
        let text = text_of(root);
        assert!(text.contains("TOTAL: ₹910.02"));
        assert!(text.contains(LINE_TAX_RATE));
        assert!(text.contains("Whether tax is payable under reverse charge: No"));
    }

    #[test]
    fn labels_follow_the_translator() {
        let html = render_invoice_html(&InvoiceRecord::sample(), &Translator::builtin("es"), None);
        assert!(html.contains("Vendido por:"));
        assert!(html.contains("Firmante autorizado"));
        assert!(!html.contains("Sold By"));
    }

    #[test]
    fn record_values_are_escaped() {
        let mut inv = InvoiceRecord::default();
        inv.seller_details.name = "Smith & <Sons>".into();
        let html = render_invoice_html(&inv, &Translator::default(), Some("logo.png"));
        assert!(html.contains("Smith &amp; &lt;Sons&gt;"));
        let dom = parse_html(&html);
        let root = find_by_id(&dom, INVOICE_ELEMENT_ID).unwrap();
        assert!(text_of(root).contains("For Smith & <Sons>"));
        assert_eq!(count_tags(&dom, &Tag::Img), 1);
    }

    #[test]
    fn empty_record_still_renders() {
        let html = render_invoice_html(&InvoiceRecord::default(), &Translator::default(), None);
        let dom = parse_html(&html);
        assert_eq!(count_tags(&dom, &Tag::Tr), 1);
    }
}
