// Domain layer: sale and invoice models, wire documents, ports and pure services.

pub mod model;
pub mod ports;
pub mod services;
pub mod wire;
