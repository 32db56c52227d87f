pub mod document_validator;
pub mod qr_builder;
pub mod request_mapper;

pub use document_validator::{
    format_invoice_number, parse_invoice_number, validate_amounts, validate_tax_id,
};
pub use qr_builder::QrPayload;
pub use request_mapper::{PreparedInvoice, RequestMapper};
