pub mod credentials;
pub mod numbering;
pub mod orchestrator;
pub mod response_interpreter;
pub mod wsfe_client;

pub use credentials::CredentialBroker;
pub use numbering::{NumberReservation, NumberingCoordinator};
pub use orchestrator::{tenant_from_config, Orchestrator};
pub use wsfe_client::WsfeClient;
