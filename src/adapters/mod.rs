// Adapters layer: concrete implementations for external systems (xml, soap/http, signing)

pub mod signer;
pub mod soap;
pub mod xml;

pub use signer::OpensslCmsSigner;
pub use soap::{SoapError, SoapTransport};
pub use xml::XmlNode;
