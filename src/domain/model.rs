use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Argentina does not observe DST; all Authority dates are in UTC-3.
pub fn authority_offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| Utc.fix())
}

pub fn authority_today() -> NaiveDate {
    Utc::now().with_timezone(&authority_offset()).date_naive()
}

/// Issuer identity and signing material for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantProfile {
    pub tenant_id: String,
    pub issuer_cuit: u64,
    pub default_sale_point: u32,
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
}

/// Signed access ticket issued by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTicket {
    pub tenant_id: String,
    pub service: String,
    pub token: String,
    pub sign: String,
    pub expires_at: DateTime<FixedOffset>,
}

impl AuthTicket {
    pub fn time_to_live(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at.with_timezone(&Utc) - now
    }

    /// Usable only while more than `margin` of its lifetime remains.
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.time_to_live(now) > margin
    }
}

impl std::fmt::Display for AuthTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ticket[{}/{} expires {}]",
            self.tenant_id, self.service, self.expires_at
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceClass {
    A,
    B,
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    InvoiceA,
    DebitNoteA,
    CreditNoteA,
    InvoiceB,
    DebitNoteB,
    CreditNoteB,
    InvoiceC,
    DebitNoteC,
    CreditNoteC,
}

impl InvoiceType {
    pub fn code(self) -> u16 {
        match self {
            Self::InvoiceA => 1,
            Self::DebitNoteA => 2,
            Self::CreditNoteA => 3,
            Self::InvoiceB => 6,
            Self::DebitNoteB => 7,
            Self::CreditNoteB => 8,
            Self::InvoiceC => 11,
            Self::DebitNoteC => 12,
            Self::CreditNoteC => 13,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => Self::InvoiceA,
            2 => Self::DebitNoteA,
            3 => Self::CreditNoteA,
            6 => Self::InvoiceB,
            7 => Self::DebitNoteB,
            8 => Self::CreditNoteB,
            11 => Self::InvoiceC,
            12 => Self::DebitNoteC,
            13 => Self::CreditNoteC,
            _ => return None,
        })
    }

    pub fn class(self) -> InvoiceClass {
        match self {
            Self::InvoiceA | Self::DebitNoteA | Self::CreditNoteA => InvoiceClass::A,
            Self::InvoiceB | Self::DebitNoteB | Self::CreditNoteB => InvoiceClass::B,
            Self::InvoiceC | Self::DebitNoteC | Self::CreditNoteC => InvoiceClass::C,
        }
    }

    pub fn is_note(self) -> bool {
        !matches!(self, Self::InvoiceA | Self::InvoiceB | Self::InvoiceC)
    }
}

impl std::str::FromStr for InvoiceType {
    type Err = String;

    /// Accepts the numeric code or a short name such as `A`, `NC-B`, `ND-C`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u16>() {
            return Self::from_code(code).ok_or_else(|| format!("unknown invoice type code {}", code));
        }
        match s.trim().to_ascii_uppercase().as_str() {
            "A" | "FA" => Ok(Self::InvoiceA),
            "B" | "FB" => Ok(Self::InvoiceB),
            "C" | "FC" => Ok(Self::InvoiceC),
            "ND-A" | "NDA" => Ok(Self::DebitNoteA),
            "ND-B" | "NDB" => Ok(Self::DebitNoteB),
            "ND-C" | "NDC" => Ok(Self::DebitNoteC),
            "NC-A" | "NCA" => Ok(Self::CreditNoteA),
            "NC-B" | "NCB" => Ok(Self::CreditNoteB),
            "NC-C" | "NCC" => Ok(Self::CreditNoteC),
            other => Err(format!("unknown invoice type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    #[default]
    Goods,
    Services,
    GoodsAndServices,
}

impl Concept {
    pub fn code(self) -> u8 {
        match self {
            Self::Goods => 1,
            Self::Services => 2,
            Self::GoodsAndServices => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Cuit,
    Cuil,
    Cdi,
    Passport,
    Dni,
    FinalConsumer,
}

impl DocumentType {
    pub fn code(self) -> u16 {
        match self {
            Self::Cuit => 80,
            Self::Cuil => 86,
            Self::Cdi => 87,
            Self::Passport => 94,
            Self::Dni => 96,
            Self::FinalConsumer => 99,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            80 => Self::Cuit,
            86 => Self::Cuil,
            87 => Self::Cdi,
            94 => Self::Passport,
            96 => Self::Dni,
            99 => Self::FinalConsumer,
            _ => return None,
        })
    }
}

/// VAT rates accepted by the Authority, each reported under a fixed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VatRate {
    Zero,
    TwoAndHalf,
    Five,
    TenAndHalf,
    TwentyOne,
    TwentySeven,
}

impl VatRate {
    pub const ALL: [VatRate; 6] = [
        VatRate::Zero,
        VatRate::TwoAndHalf,
        VatRate::Five,
        VatRate::TenAndHalf,
        VatRate::TwentyOne,
        VatRate::TwentySeven,
    ];

    pub fn code(self) -> u8 {
        match self {
            Self::Zero => 3,
            Self::TenAndHalf => 4,
            Self::TwentyOne => 5,
            Self::TwentySeven => 6,
            Self::Five => 8,
            Self::TwoAndHalf => 9,
        }
    }

    /// Rate as a percentage, e.g. `21` or `10.5`.
    pub fn percentage(self) -> Decimal {
        match self {
            Self::Zero => Decimal::ZERO,
            Self::TwoAndHalf => Decimal::new(25, 1),
            Self::Five => Decimal::new(5, 0),
            Self::TenAndHalf => Decimal::new(105, 1),
            Self::TwentyOne => Decimal::new(21, 0),
            Self::TwentySeven => Decimal::new(27, 0),
        }
    }

    pub fn from_percentage(rate: Decimal) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.percentage() == rate.normalize())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    /// Taxable base of the line, in cents.
    pub net_cents: i64,
    /// VAT percentage, e.g. `21` or `10.5`.
    pub vat_rate: Decimal,
    /// VAT amount in cents; derived from the rate when absent.
    #[serde(default)]
    pub vat_cents: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counterparty {
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub document_type: Option<DocumentType>,
    #[serde(default)]
    pub document_number: Option<String>,
    /// Receiver VAT condition code, when known.
    #[serde(default)]
    pub vat_condition: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePeriod {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub payment_due: Option<NaiveDate>,
}

/// Reference to the invoice a credit or debit note adjusts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociatedInvoice {
    pub invoice_type: InvoiceType,
    pub sale_point: u32,
    pub number: u64,
    #[serde(default)]
    pub issuer_cuit: Option<u64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherTax {
    pub id: u16,
    pub description: String,
    pub base_cents: i64,
    pub rate: Decimal,
    pub amount_cents: i64,
}

/// Everything the caller knows about a sale; owned by the caller's persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleSnapshot {
    pub sale_id: String,
    pub invoice_type: InvoiceType,
    #[serde(default)]
    pub concept: Concept,
    #[serde(default)]
    pub sale_point: Option<u32>,
    #[serde(default)]
    pub invoice_date: Option<NaiveDate>,
    #[serde(default)]
    pub customer: Counterparty,
    pub items: Vec<LineItem>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    #[serde(default)]
    pub exempt_cents: i64,
    #[serde(default)]
    pub untaxed_cents: i64,
    pub total_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_exchange_rate")]
    pub exchange_rate: Decimal,
    #[serde(default)]
    pub service_period: Option<ServicePeriod>,
    #[serde(default)]
    pub associated_invoices: Vec<AssociatedInvoice>,
    #[serde(default)]
    pub other_taxes: Vec<OtherTax>,
    #[serde(default)]
    pub existing_outcome: Option<InvoiceOutcome>,
}

fn default_currency() -> String {
    "PES".to_string()
}

fn default_exchange_rate() -> Decimal {
    Decimal::ONE
}

/// A (numeric code, message) pair from one of the Authority's message lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityMessage {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl std::fmt::Display for AuthorityMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.label {
            Some(label) => write!(f, "[{}] {} ({})", self.code, self.message, label),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// Terminal result recorded against a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvoiceOutcome {
    Authorized {
        invoice_number: String,
        cae: String,
        cae_expiration: NaiveDate,
        #[serde(default)]
        observations: Vec<AuthorityMessage>,
    },
    Rejected {
        errors: Vec<AuthorityMessage>,
        #[serde(default)]
        observations: Vec<AuthorityMessage>,
        rejected_at: DateTime<Utc>,
    },
}

impl InvoiceOutcome {
    pub fn cae(&self) -> Option<&str> {
        match self {
            Self::Authorized { cae, .. } => Some(cae),
            Self::Rejected { .. } => None,
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized { .. })
    }
}

/// Stages a single authorization passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStage {
    Requested,
    Authenticated,
    Numbered,
    Built,
    Submitted,
    Approved,
    PartiallyApproved,
    Rejected,
    Persisted,
}

/// What `authorize_invoice` hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub success: bool,
    /// Decision reached before persistence: approved, partially approved or rejected.
    pub decision: AuthorizationStage,
    pub cae: Option<String>,
    pub cae_expiration: Option<NaiveDate>,
    pub formatted_invoice_number: Option<String>,
    pub errors: Vec<AuthorityMessage>,
    pub observations: Vec<AuthorityMessage>,
    pub events: Vec<AuthorityMessage>,
    pub qr_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_invoice_type_codes_round_trip_and_classes() {
        for code in [1u16, 2, 3, 6, 7, 8, 11, 12, 13] {
            let kind = InvoiceType::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert_eq!(InvoiceType::from_code(4), None);
        assert_eq!(InvoiceType::CreditNoteB.class(), InvoiceClass::B);
        assert!(InvoiceType::CreditNoteB.is_note());
        assert!(!InvoiceType::InvoiceC.is_note());
        assert_eq!("b".parse::<InvoiceType>().unwrap(), InvoiceType::InvoiceB);
        assert_eq!("NC-A".parse::<InvoiceType>().unwrap(), InvoiceType::CreditNoteA);
        assert_eq!("11".parse::<InvoiceType>().unwrap(), InvoiceType::InvoiceC);
    }

    #[test]
    fn test_vat_rate_codes() {
        assert_eq!(VatRate::from_percentage(Decimal::new(21, 0)), Some(VatRate::TwentyOne));
        assert_eq!(VatRate::from_percentage(Decimal::new(2100, 2)), Some(VatRate::TwentyOne));
        assert_eq!(VatRate::from_percentage(Decimal::new(105, 1)), Some(VatRate::TenAndHalf));
        assert_eq!(VatRate::from_percentage(Decimal::new(19, 0)), None);
        let codes: Vec<u8> = VatRate::ALL.iter().map(|r| r.code()).collect();
        assert_eq!(codes, vec![3, 9, 8, 4, 5, 6]);
    }

    #[test]
    fn test_ticket_validity_margin() {
        let now = Utc::now();
        let ticket = AuthTicket {
            tenant_id: "t1".to_string(),
            service: "wsfe".to_string(),
            token: "tok".to_string(),
            sign: "sig".to_string(),
            expires_at: (now + Duration::minutes(4)).with_timezone(&authority_offset()),
        };
        assert!(!ticket.is_valid_at(now, Duration::minutes(5)));
        assert!(ticket.is_valid_at(now - Duration::minutes(2), Duration::minutes(5)));
    }

    #[test]
    fn test_sale_snapshot_defaults_from_json() {
        let sale: SaleSnapshot = serde_json::from_value(serde_json::json!({
            "sale_id": "S-1",
            "invoice_type": "invoice_b",
            "items": [{"description": "Widget", "net_cents": 100000, "vat_rate": "21"}],
            "subtotal_cents": 100000,
            "tax_cents": 21000,
            "total_cents": 121000
        }))
        .unwrap();

        assert_eq!(sale.currency, "PES");
        assert_eq!(sale.exchange_rate, Decimal::ONE);
        assert_eq!(sale.concept, Concept::Goods);
        assert!(sale.customer.tax_id.is_none());
        assert!(sale.existing_outcome.is_none());
    }
}
