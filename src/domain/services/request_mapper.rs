//! Converts a sale snapshot into the Authority's single-record invoice request.
//!
//! Everything that can be checked without the network happens in [`RequestMapper::prepare`];
//! the invoice number is attached afterwards with [`PreparedInvoice::with_number`].

use crate::domain::model::{
    Concept, Counterparty, DocumentType, InvoiceClass, InvoiceType, SaleSnapshot, VatRate,
};
use crate::domain::services::document_validator::{
    parse_tax_id, sum_cents, validate_amounts, within_tolerance,
};
use crate::domain::wire::{
    AlicIva, CbteAsoc, CbtesAsoc, FeCabReq, FeCaeDetRequest, InvoiceRequest, IvaBlock, Tributo,
    Tributos,
};
use crate::utils::error::{InvoicingError, Result};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

/// Receiver VAT condition for final consumers.
const FINAL_CONSUMER_VAT_CONDITION: u8 = 5;

fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

fn wire_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Aggregated base and tax for one VAT rate, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VatGroup {
    pub base_cents: i64,
    pub tax_cents: i64,
}

/// A validated request still missing its invoice number.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedInvoice {
    pub invoice_type: InvoiceType,
    pub sale_point: u32,
    template: InvoiceRequest,
}

impl PreparedInvoice {
    pub fn with_number(&self, number: u64) -> InvoiceRequest {
        let mut request = self.template.clone();
        request.detail.number_from = number;
        request.detail.number_to = number;
        request
    }

    pub fn document(&self) -> (u16, u64) {
        (
            self.template.detail.document_type,
            self.template.detail.document_number,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequestMapper {
    issuer_cuit: u64,
    default_sale_point: u32,
}

impl RequestMapper {
    pub fn new(issuer_cuit: u64, default_sale_point: u32) -> Self {
        Self {
            issuer_cuit,
            default_sale_point,
        }
    }

    pub fn prepare(&self, sale: &SaleSnapshot, today: NaiveDate) -> Result<PreparedInvoice> {
        let sale_point = sale.sale_point.unwrap_or(self.default_sale_point);
        if !(1..=99_999).contains(&sale_point) {
            return Err(InvoicingError::validation(
                "sale_point",
                format!("{} is outside 1..=99999", sale_point),
            ));
        }

        let other_taxes_cents = sum_cents(sale.other_taxes.iter().map(|t| t.amount_cents))
            .ok_or_else(|| overflow("other_taxes"))?;
        let total_before_other_taxes = sale
            .total_cents
            .checked_sub(other_taxes_cents)
            .ok_or_else(|| overflow("total_cents"))?;
        if !validate_amounts(
            sale.subtotal_cents,
            sale.tax_cents,
            sale.exempt_cents,
            sale.untaxed_cents,
            total_before_other_taxes,
        ) {
            return Err(InvoicingError::validation(
                "total_cents",
                format!(
                    "net {} + tax {} + exempt {} + untaxed {} + other taxes {} does not add up to {}",
                    sale.subtotal_cents,
                    sale.tax_cents,
                    sale.exempt_cents,
                    sale.untaxed_cents,
                    other_taxes_cents,
                    sale.total_cents
                ),
            ));
        }

        let (document_type, document_number) =
            resolve_counterparty(sale.invoice_type, &sale.customer)?;
        let invoice_date = sale.invoice_date.unwrap_or(today);

        let (net_cents, vat_cents, vat_breakdown) = match sale.invoice_type.class() {
            InvoiceClass::C => {
                if sale.tax_cents != 0 {
                    return Err(InvoicingError::validation(
                        "tax_cents",
                        "class C invoices do not discriminate VAT",
                    ));
                }
                (sale.subtotal_cents, 0, None)
            }
            InvoiceClass::A | InvoiceClass::B => {
                let groups = group_vat(sale)?;
                let base = sum_cents(groups.values().map(|g| g.base_cents))
                    .ok_or_else(|| overflow("items"))?;
                let tax = sum_cents(groups.values().map(|g| g.tax_cents))
                    .ok_or_else(|| overflow("items"))?;
                if !within_tolerance(tax, sale.tax_cents) {
                    return Err(InvoicingError::validation(
                        "tax_cents",
                        format!("line VAT adds up to {} but the sale declares {}", tax, sale.tax_cents),
                    ));
                }
                let items = groups
                    .iter()
                    .map(|(rate, group)| AlicIva {
                        code: rate.code(),
                        base: cents(group.base_cents),
                        amount: cents(group.tax_cents),
                    })
                    .collect();
                (base, tax, Some(IvaBlock { items }))
            }
        };

        // The wire total must equal the component sum exactly.
        let wire_total = sum_cents([
            net_cents,
            vat_cents,
            sale.exempt_cents,
            sale.untaxed_cents,
            other_taxes_cents,
        ])
        .ok_or_else(|| overflow("total_cents"))?;
        if !within_tolerance(wire_total, sale.total_cents) {
            return Err(InvoicingError::validation(
                "total_cents",
                format!("components add up to {} but the sale total is {}", wire_total, sale.total_cents),
            ));
        }

        if sale.exchange_rate <= Decimal::ZERO {
            return Err(InvoicingError::validation("exchange_rate", "must be positive"));
        }
        if sale.currency.trim().len() != 3 {
            return Err(InvoicingError::validation(
                "currency",
                format!("'{}' is not a 3-letter Authority currency id", sale.currency),
            ));
        }

        let (service_from, service_to, payment_due) = match sale.concept {
            Concept::Goods => (None, None, None),
            Concept::Services | Concept::GoodsAndServices => {
                let period = sale.service_period.as_ref();
                let from = period.and_then(|p| p.from).unwrap_or(invoice_date);
                let to = period.and_then(|p| p.to).unwrap_or(invoice_date);
                let due = period.and_then(|p| p.payment_due).unwrap_or(invoice_date);
                if from > to {
                    return Err(InvoicingError::validation(
                        "service_period",
                        format!("service period starts {} after it ends {}", from, to),
                    ));
                }
                (Some(wire_date(from)), Some(wire_date(to)), Some(wire_date(due)))
            }
        };

        let associated = if sale.invoice_type.is_note() {
            if sale.associated_invoices.is_empty() {
                return Err(InvoicingError::validation(
                    "associated_invoices",
                    "credit and debit notes must reference the invoice they adjust",
                ));
            }
            Some(CbtesAsoc {
                items: sale
                    .associated_invoices
                    .iter()
                    .map(|a| CbteAsoc {
                        invoice_type: a.invoice_type.code(),
                        sale_point: a.sale_point,
                        number: a.number,
                        cuit: Some(a.issuer_cuit.unwrap_or(self.issuer_cuit)),
                        date: a.date.map(wire_date),
                    })
                    .collect(),
            })
        } else {
            None
        };

        let taxes = if sale.other_taxes.is_empty() {
            None
        } else {
            Some(Tributos {
                items: sale
                    .other_taxes
                    .iter()
                    .map(|t| Tributo {
                        id: t.id,
                        description: t.description.clone(),
                        base: cents(t.base_cents),
                        rate: t.rate,
                        amount: cents(t.amount_cents),
                    })
                    .collect(),
            })
        };

        let receiver_vat_condition = sale.customer.vat_condition.or(
            (document_type == DocumentType::FinalConsumer).then_some(FINAL_CONSUMER_VAT_CONDITION),
        );

        let detail = FeCaeDetRequest {
            concept: sale.concept.code(),
            document_type: document_type.code(),
            document_number,
            number_from: 0,
            number_to: 0,
            invoice_date: wire_date(invoice_date),
            total: cents(wire_total),
            untaxed: cents(sale.untaxed_cents),
            net: cents(net_cents),
            exempt: cents(sale.exempt_cents),
            other_taxes: cents(other_taxes_cents),
            vat: cents(vat_cents),
            service_from,
            service_to,
            payment_due,
            currency: sale.currency.trim().to_ascii_uppercase(),
            exchange_rate: sale.exchange_rate,
            receiver_vat_condition,
            associated,
            taxes,
            vat_breakdown,
        };

        Ok(PreparedInvoice {
            invoice_type: sale.invoice_type,
            sale_point,
            template: InvoiceRequest {
                header: FeCabReq {
                    record_count: 1,
                    sale_point,
                    invoice_type: sale.invoice_type.code(),
                },
                detail,
                invoice_date,
            },
        })
    }
}

/// Class A needs a valid CUIT; B and C fall back to a document or the final consumer.
pub fn resolve_counterparty(
    invoice_type: InvoiceType,
    customer: &Counterparty,
) -> Result<(DocumentType, u64)> {
    let tax_id = customer
        .tax_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if invoice_type.class() == InvoiceClass::A {
        let value = tax_id.ok_or_else(|| {
            InvoicingError::validation("customer.tax_id", "class A invoices require the customer's CUIT")
        })?;
        return Ok((DocumentType::Cuit, parse_tax_id("customer.tax_id", value)?));
    }

    if let Some(value) = tax_id {
        return Ok((DocumentType::Cuit, parse_tax_id("customer.tax_id", value)?));
    }

    match (customer.document_type, customer.document_number.as_deref()) {
        (Some(DocumentType::FinalConsumer), _) => Ok((DocumentType::FinalConsumer, 0)),
        (Some(kind @ (DocumentType::Cuit | DocumentType::Cuil)), Some(number)) => {
            Ok((kind, parse_tax_id("customer.document_number", number)?))
        }
        (Some(kind), Some(number)) => {
            let digits: String = number.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
            let parsed = digits
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    InvoicingError::validation(
                        "customer.document_number",
                        format!("'{}' is not a valid document number", number),
                    )
                })?;
            Ok((kind, parsed))
        }
        (Some(_), None) => Err(InvoicingError::validation(
            "customer.document_number",
            "a document type was given without its number",
        )),
        (None, _) => Ok((DocumentType::FinalConsumer, 0)),
    }
}

/// Sums base and VAT per rate; lines without a VAT amount get `round(net * rate)`.
pub fn group_vat(sale: &SaleSnapshot) -> Result<BTreeMap<VatRate, VatGroup>> {
    if sale.items.is_empty() {
        return Err(InvoicingError::validation("items", "a sale needs at least one line item"));
    }

    let mut groups: BTreeMap<VatRate, VatGroup> = BTreeMap::new();
    for (index, item) in sale.items.iter().enumerate() {
        let rate = VatRate::from_percentage(item.vat_rate).ok_or_else(|| {
            InvoicingError::validation(
                format!("items[{}].vat_rate", index),
                format!("{}% is not a VAT rate the Authority accepts", item.vat_rate),
            )
        })?;
        let tax = match item.vat_cents {
            Some(value) => value,
            None => line_vat(item.net_cents, rate).ok_or_else(|| {
                InvoicingError::validation(format!("items[{}].net_cents", index), "VAT overflow")
            })?,
        };
        let group = groups.entry(rate).or_default();
        let field = format!("items[{}]", index);
        group.base_cents = group
            .base_cents
            .checked_add(item.net_cents)
            .ok_or_else(|| overflow(&field))?;
        group.tax_cents = group
            .tax_cents
            .checked_add(tax)
            .ok_or_else(|| overflow(&field))?;
    }

    let base = sum_cents(groups.values().map(|g| g.base_cents)).ok_or_else(|| overflow("items"))?;
    if !within_tolerance(base, sale.subtotal_cents) {
        return Err(InvoicingError::validation(
            "subtotal_cents",
            format!("line items add up to {} but the subtotal is {}", base, sale.subtotal_cents),
        ));
    }
    Ok(groups)
}

fn overflow(field: &str) -> InvoicingError {
    InvoicingError::validation(field, "amounts overflow the representable range")
}

fn line_vat(net_cents: i64, rate: VatRate) -> Option<i64> {
    (Decimal::from(net_cents) * rate.percentage() / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{AssociatedInvoice, LineItem, OtherTax, ServicePeriod};

    fn item(net_cents: i64, rate: Decimal) -> LineItem {
        LineItem {
            description: "item".to_string(),
            net_cents,
            vat_rate: rate,
            vat_cents: None,
        }
    }

    fn sale(invoice_type: InvoiceType) -> SaleSnapshot {
        SaleSnapshot {
            sale_id: "S-1".to_string(),
            invoice_type,
            concept: Concept::Goods,
            sale_point: None,
            invoice_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            customer: Counterparty::default(),
            items: vec![item(100_000, Decimal::new(21, 0))],
            subtotal_cents: 100_000,
            tax_cents: 21_000,
            exempt_cents: 0,
            untaxed_cents: 0,
            total_cents: 121_000,
            currency: "PES".to_string(),
            exchange_rate: Decimal::ONE,
            service_period: None,
            associated_invoices: vec![],
            other_taxes: vec![],
            existing_outcome: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn mapper() -> RequestMapper {
        RequestMapper::new(20409378472, 1)
    }

    #[test]
    fn test_invoice_b_without_tax_id_goes_to_final_consumer() {
        let prepared = mapper().prepare(&sale(InvoiceType::InvoiceB), today()).unwrap();
        let request = prepared.with_number(101);

        assert_eq!(request.detail.document_type, 99);
        assert_eq!(request.detail.document_number, 0);
        assert_eq!(request.detail.receiver_vat_condition, Some(5));
        assert_eq!(request.number(), 101);
        assert_eq!(request.detail.number_to, 101);
        assert_eq!(request.sale_point(), 1);
        assert_eq!(request.invoice_type(), 6);
        let iva = request.detail.vat_breakdown.unwrap();
        assert_eq!(
            iva.items,
            vec![AlicIva {
                code: 5,
                base: Decimal::new(100000, 2),
                amount: Decimal::new(21000, 2)
            }]
        );
        assert_eq!(request.detail.total, Decimal::new(121000, 2));
        assert_eq!(request.detail.invoice_date, "20240301");
    }

    #[test]
    fn test_invoice_a_requires_valid_tax_id() {
        let mut a = sale(InvoiceType::InvoiceA);
        let err = mapper().prepare(&a, today()).unwrap_err();
        assert!(matches!(err, InvoicingError::ValidationError { ref field, .. } if field == "customer.tax_id"));

        a.customer.tax_id = Some("20409378473".to_string());
        assert!(mapper().prepare(&a, today()).is_err());

        a.customer.tax_id = Some("20-40937847-2".to_string());
        let request = mapper().prepare(&a, today()).unwrap().with_number(1);
        assert_eq!(request.detail.document_type, 80);
        assert_eq!(request.detail.document_number, 20409378472);
    }

    #[test]
    fn test_invoice_b_accepts_personal_document() {
        let mut b = sale(InvoiceType::InvoiceB);
        b.customer.document_type = Some(DocumentType::Dni);
        b.customer.document_number = Some("40.937.847".to_string());
        let prepared = mapper().prepare(&b, today()).unwrap();
        assert_eq!(prepared.document(), (96, 40937847));
    }

    #[test]
    fn test_vat_grouping_aggregates_lines_by_rate() {
        let mut b = sale(InvoiceType::InvoiceB);
        b.items = vec![
            item(50_000, Decimal::new(21, 0)),
            item(20_000, Decimal::new(105, 1)),
            item(30_000, Decimal::new(21, 0)),
        ];
        b.tax_cents = 10_500 + 2_100 + 6_300;
        b.total_cents = 100_000 + b.tax_cents;

        let groups = group_vat(&b).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[&VatRate::TwentyOne],
            VatGroup { base_cents: 80_000, tax_cents: 16_800 }
        );
        assert_eq!(
            groups[&VatRate::TenAndHalf],
            VatGroup { base_cents: 20_000, tax_cents: 2_100 }
        );

        let request = mapper().prepare(&b, today()).unwrap().with_number(5);
        let codes: Vec<u8> = request
            .detail
            .vat_breakdown
            .unwrap()
            .items
            .iter()
            .map(|a| a.code)
            .collect();
        assert_eq!(codes, vec![4, 5]);
        assert_eq!(request.detail.vat, Decimal::new(18_900, 2));
    }

    #[test]
    fn test_unknown_vat_rate_is_rejected() {
        let mut b = sale(InvoiceType::InvoiceB);
        b.items = vec![item(100_000, Decimal::new(19, 0))];
        let err = mapper().prepare(&b, today()).unwrap_err();
        assert!(err.to_string().contains("items[0].vat_rate"));
    }

    #[test]
    fn test_amount_mismatch_is_rejected_before_mapping() {
        let mut b = sale(InvoiceType::InvoiceB);
        b.total_cents = 121_002;
        assert!(mapper().prepare(&b, today()).is_err());

        b.total_cents = 121_001;
        let request = mapper().prepare(&b, today()).unwrap().with_number(1);
        assert_eq!(request.detail.total, Decimal::new(121_000, 2));
    }

    #[test]
    fn test_services_default_period_to_invoice_date() {
        let mut b = sale(InvoiceType::InvoiceB);
        b.concept = Concept::Services;
        let request = mapper().prepare(&b, today()).unwrap().with_number(1);
        assert_eq!(request.detail.service_from.as_deref(), Some("20240301"));
        assert_eq!(request.detail.service_to.as_deref(), Some("20240301"));
        assert_eq!(request.detail.payment_due.as_deref(), Some("20240301"));

        b.service_period = Some(ServicePeriod {
            from: NaiveDate::from_ymd_opt(2024, 2, 1),
            to: NaiveDate::from_ymd_opt(2024, 2, 29),
            payment_due: None,
        });
        let request = mapper().prepare(&b, today()).unwrap().with_number(1);
        assert_eq!(request.detail.service_from.as_deref(), Some("20240201"));
        assert_eq!(request.detail.service_to.as_deref(), Some("20240229"));

        let goods = mapper().prepare(&sale(InvoiceType::InvoiceB), today()).unwrap().with_number(1);
        assert!(goods.detail.service_from.is_none());
    }

    #[test]
    fn test_credit_note_needs_associated_invoice() {
        let mut note = sale(InvoiceType::CreditNoteB);
        assert!(mapper().prepare(&note, today()).is_err());

        note.associated_invoices = vec![AssociatedInvoice {
            invoice_type: InvoiceType::InvoiceB,
            sale_point: 1,
            number: 100,
            issuer_cuit: None,
            date: NaiveDate::from_ymd_opt(2024, 2, 20),
        }];
        let request = mapper().prepare(&note, today()).unwrap().with_number(7);
        let asoc = request.detail.associated.unwrap();
        assert_eq!(asoc.items[0].invoice_type, 6);
        assert_eq!(asoc.items[0].number, 100);
        assert_eq!(asoc.items[0].cuit, Some(20409378472));
        assert_eq!(asoc.items[0].date.as_deref(), Some("20240220"));
    }

    #[test]
    fn test_class_c_has_no_vat_block() {
        let mut c = sale(InvoiceType::InvoiceC);
        c.items = vec![item(121_000, Decimal::ZERO)];
        c.subtotal_cents = 121_000;
        c.tax_cents = 0;
        let request = mapper().prepare(&c, today()).unwrap().with_number(1);
        assert!(request.detail.vat_breakdown.is_none());
        assert_eq!(request.detail.net, Decimal::new(121_000, 2));
        assert_eq!(request.detail.vat, Decimal::new(0, 2));

        let with_vat = sale(InvoiceType::InvoiceC);
        assert!(mapper().prepare(&with_vat, today()).is_err());
    }

    #[test]
    fn test_other_taxes_are_added_to_total() {
        let mut b = sale(InvoiceType::InvoiceB);
        b.other_taxes = vec![OtherTax {
            id: 2,
            description: "Percepcion IIBB".to_string(),
            base_cents: 100_000,
            rate: Decimal::new(3, 0),
            amount_cents: 3_000,
        }];
        b.total_cents = 124_000;
        let request = mapper().prepare(&b, today()).unwrap().with_number(1);
        assert_eq!(request.detail.other_taxes, Decimal::new(3_000, 2));
        assert_eq!(request.detail.total, Decimal::new(124_000, 2));
        assert_eq!(request.detail.taxes.unwrap().items.len(), 1);
    }

    #[test]
    fn test_overflowing_amounts_are_a_validation_error() {
        let mut huge = sale(InvoiceType::InvoiceB);
        let mut line = item(i64::MAX, Decimal::ZERO);
        line.vat_cents = Some(0);
        huge.items = vec![line.clone(), line];
        huge.subtotal_cents = i64::MAX;
        huge.tax_cents = 0;
        huge.total_cents = i64::MAX;
        match mapper().prepare(&huge, today()).unwrap_err() {
            InvoicingError::ValidationError { field, .. } => assert_eq!(field, "items[1]"),
            other => panic!("expected ValidationError, got {:?}", other),
        }

        let mut negative_tax = sale(InvoiceType::InvoiceB);
        negative_tax.other_taxes = vec![OtherTax {
            id: 99,
            description: "Percepcion".to_string(),
            base_cents: 0,
            rate: Decimal::ZERO,
            amount_cents: i64::MIN,
        }];
        match mapper().prepare(&negative_tax, today()).unwrap_err() {
            InvoicingError::ValidationError { field, .. } => assert_eq!(field, "total_cents"),
            other => panic!("expected ValidationError, got {:?}", other),
        }
    }
}
